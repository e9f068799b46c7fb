use ethers::prelude::abigen;

// LB pair view functions use the exact Solidity widths (uint16 binStep,
// uint24 activeId, uint128 reserves). Widening any of them breaks output
// decoding silently, so keep the signatures byte-accurate.

abigen!(
    LBPair,
    r#"[
        function getTokenX() external view returns (address)
        function getTokenY() external view returns (address)
        function getBinStep() external view returns (uint16)
        function getActiveId() external view returns (uint24)
        function getReserves() external view returns (uint128 reserveX, uint128 reserveY)
        function getBin(uint24 id) external view returns (uint128 binReserveX, uint128 binReserveY)
        function getNextNonEmptyBin(bool swapForY, uint24 id) external view returns (uint24 nextId)
        function getProtocolFees() external view returns (uint128 protocolFeeX, uint128 protocolFeeY)
        function getStaticFeeParameters() external view returns (uint16 baseFactor, uint16 filterPeriod, uint16 decayPeriod, uint16 reductionFactor, uint24 variableFeeControl, uint16 protocolShare, uint24 maxVolatilityAccumulator)
        function getVariableFeeParameters() external view returns (uint24 volatilityAccumulator, uint24 volatilityReference, uint24 idReference, uint40 timeOfLastUpdate)
        function balanceOf(address account, uint256 id) external view returns (uint256)
        function balanceOfBatch(address[] accounts, uint256[] ids) external view returns (uint256[])
        event Swap(address indexed sender, address indexed to, uint24 indexed id, bytes32 amountsIn, bytes32 amountsOut, uint24 volatilityAccumulator, bytes32 totalFees, bytes32 protocolFees)
        event DepositedToBins(address indexed sender, address indexed to, uint256[] ids, bytes32[] amounts)
        event WithdrawnFromBins(address indexed sender, address indexed to, uint256[] ids, bytes32[] amounts)
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values)
    ]"#
);
