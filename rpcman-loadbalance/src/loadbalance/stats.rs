use super::metrics::MetricsSummary;
use super::pool::PoolStats;
use serde::Serialize;

/// 单个端点的状态快照
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub id: String,
    pub url: String,
    pub ws_url: Option<String>,
    pub priority: u32,
    pub weight: f64,
    pub is_healthy: bool,
    pub response_time_ms: u64,
    pub consecutive_failures: u32,
    pub score: f64,
    /// 距上次健康检查的秒数，从未检查过为None
    pub seconds_since_last_check: Option<u64>,
    pub samples: usize,
    pub success_rate: Option<f64>,
}

/// 管理器状态快照，仅用于监控，不参与选择
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub timestamp: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub running: bool,
    pub current_endpoint: Option<String>,
    pub pinned_endpoint: Option<String>,
    pub total_endpoints: usize,
    pub healthy_endpoints: usize,
    pub average_latency_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub endpoints: Vec<EndpointStats>,
    pub pool: PoolStats,
    pub metrics: MetricsSummary,
}

impl ManagerStats {
    /// 至少有一个健康端点
    pub fn is_healthy(&self) -> bool {
        self.healthy_endpoints > 0
    }

    pub fn endpoint(&self, id: &str) -> Option<&EndpointStats> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}
