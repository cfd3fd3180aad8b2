pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod pipeline;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use pipeline::{LedgerConfig, ProvidersConfig, ReconcilerConfig};
