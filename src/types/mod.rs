pub mod ledger;
pub mod price;
pub mod rebalance;
pub mod strategy;

pub use ledger::*;
pub use price::*;
pub use rebalance::*;
pub use strategy::*;
