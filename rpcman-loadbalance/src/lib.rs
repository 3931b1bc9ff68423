//! rpcman Load Balance Library
//!
//! This library selects and manages JSON-RPC endpoints for a single chain:
//! - Endpoint registry with per-endpoint health state
//! - Periodic health probing (`eth_blockNumber`)
//! - Deterministic scoring and selection
//! - Client connection pool with idle eviction
//! - Manual failover and call outcome reporting
//! - Latency and success metrics

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    Endpoint, EndpointRegistry, EndpointSelector, EndpointStats, HealthChecker, HealthTransition,
    LatencyMetric, ManagerError, ManagerStats, MetricsRecorder, MetricsSummary, PoolStats,
    PooledClient, ProbeReport, RpcEndpointManager, SampleSource,
};
