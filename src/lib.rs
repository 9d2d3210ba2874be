//! SignalStack - simulated crypto rebalancing engine with a virtual
//! portfolio ledger

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use std::sync::Arc;

use config::Config;
use services::Ledger;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<Ledger>,
}

// Re-export commonly used types
pub use types::*;
