// Contracts Module - Public ABIs Only

pub mod erc20;
pub mod lb_factory;
pub mod lb_pair;
pub mod lb_router;

// Public exports
pub use erc20::Erc20;
pub use lb_factory::LBFactory;
pub use lb_pair::{
    DepositedToBinsFilter, LBPair, SwapFilter, TransferBatchFilter, WithdrawnFromBinsFilter,
};
pub use lb_router::LBRouter;
