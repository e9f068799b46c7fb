use ethers::prelude::abigen;

abigen!(
    LBFactory,
    r#"[
        function getNumberOfLBPairs() external view returns (uint256)
        function getLBPairAtIndex(uint256 index) external view returns (address)
        function getLBPairInformation(address tokenA, address tokenB, uint256 binStep) external view returns (address lbPair, uint256 binStep)
        function getAllBinSteps() external view returns (uint256[])
    ]"#
);
