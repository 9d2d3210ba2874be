pub mod drift;
pub mod ledger;
pub mod market;
pub mod planner;
pub mod recommendation;
pub mod risk;
pub mod scheduler;
pub mod store;
pub mod strategy;

pub use drift::analyze_drift;
pub use ledger::{Ledger, LedgerConfig, LedgerError, LedgerResult, RevalueOutcome};
pub use market::MarketData;
pub use planner::build_plan;
pub use recommendation::{RecommendationError, RecommendationSelector};
pub use risk::assess_risk;
pub use scheduler::{RevaluationScheduler, TickReport};
pub use store::{LedgerStore, MemoryLedgerStore, SqliteLedgerStore, StoreError};
pub use strategy::{compute_target_weights, list_strategies, normalize_weights};
