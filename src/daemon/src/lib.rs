pub mod config;
pub mod http;
pub mod metrics_sink;
pub mod orchestrator;

pub use config::{Config, ConfigError, ConfigLoader};
pub use metrics_sink::PrometheusMetricsSink;
pub use orchestrator::Orchestrator;
