pub mod errors;
pub mod failover;
pub mod health_checker;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod selector;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use errors::ManagerError;
pub use failover::FailoverController;
pub use health_checker::{HealthChecker, ProbeReport};
pub use manager::RpcEndpointManager;
pub use metrics::{EndpointMetrics, LatencyMetric, MetricsRecorder, MetricsSummary, SampleSource};
pub use pool::{ConnectionPool, PoolKey, PoolStats, PooledClient};
pub use registry::{Endpoint, EndpointRegistry, HealthTransition};
pub use selector::{score, select_best, EndpointSelector, Selection};
pub use stats::{EndpointStats, ManagerStats};
