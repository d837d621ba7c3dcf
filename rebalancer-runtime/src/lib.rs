pub mod error;
pub mod types;
pub mod retry;
pub mod config;
pub mod chain;
pub mod risk_client;
pub mod reconciler;
pub mod executor;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::RebalancerError;
pub use types::*;
pub use config::RebalancerConfig;
pub use executor::PayloadExecutor;
pub use reconciler::PortfolioReconciler;
pub use risk_client::RiskClient;
