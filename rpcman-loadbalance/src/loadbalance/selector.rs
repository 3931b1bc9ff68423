use super::registry::{Endpoint, EndpointRegistry};
use super::ManagerError;
use rpcman_core::Purpose;
use std::cmp::Ordering;
use std::sync::Arc;

/// 延迟惩罚上限，避免主端点因短暂变慢被立即放弃
pub const MAX_LATENCY_PENALTY: f64 = 50.0;
/// 每次连续失败的惩罚（不设上限）
pub const FAILURE_PENALTY: f64 = 10.0;

/// 计算端点得分
///
/// `score = weight - min(response_time_ms / 10, 50) - consecutive_failures * 10`，下限为0
pub fn score(endpoint: &Endpoint) -> f64 {
    let latency_penalty = (endpoint.response_time_ms as f64 / 10.0).min(MAX_LATENCY_PENALTY);
    let failure_penalty = endpoint.consecutive_failures as f64 * FAILURE_PENALTY;
    (endpoint.weight() - latency_penalty - failure_penalty).max(0.0)
}

/// 一次选择的结果
#[derive(Debug, Clone)]
pub struct Selection {
    pub endpoint: Endpoint,
    pub score: f64,
    /// 所有端点都不健康时为true
    pub fallback: bool,
}

/// 从快照中挑选最佳端点
///
/// 得分高者优先；同分时优先级数值小者优先；再按注册顺序
pub fn select_best(endpoints: &[Endpoint]) -> Option<Selection> {
    let healthy = endpoints
        .iter()
        .filter(|e| e.is_healthy)
        .map(|e| (e, score(e)))
        .min_by(|(a, score_a), (b, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| rank_order(a, b))
        });

    if let Some((endpoint, score)) = healthy {
        return Some(Selection {
            endpoint: endpoint.clone(),
            score,
            fallback: false,
        });
    }

    // 没有健康端点：退回到优先级最高的端点，而不是拒绝服务
    endpoints
        .iter()
        .min_by(|a, b| rank_order(a, b))
        .map(|endpoint| Selection {
            endpoint: endpoint.clone(),
            score: score(endpoint),
            fallback: true,
        })
}

/// 按(优先级, 注册顺序)排序
pub fn rank_order(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.priority()
        .cmp(&b.priority())
        .then_with(|| a.index.cmp(&b.index))
}

/// 端点选择器
pub struct EndpointSelector {
    registry: Arc<EndpointRegistry>,
}

impl EndpointSelector {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    /// 为指定用途选择端点
    pub fn select(&self, purpose: Purpose) -> Result<Selection, ManagerError> {
        let endpoints = self.registry.list_endpoints();
        let selection = select_best(&endpoints).ok_or(ManagerError::NoEndpoints)?;

        if selection.fallback {
            tracing::warn!(
                "All {} endpoints are unhealthy, falling back to highest-priority endpoint {} for {} call",
                endpoints.len(),
                selection.endpoint.id(),
                purpose
            );
        } else {
            tracing::debug!(
                "Selected endpoint {} for {} call (score={:.1})",
                selection.endpoint.id(),
                purpose,
                selection.score
            );
        }

        Ok(selection)
    }

    /// 获取当前各端点得分（用于监控）
    pub fn current_scores(&self) -> Vec<(String, f64)> {
        self.registry
            .list_endpoints()
            .iter()
            .map(|e| (e.id().to_string(), score(e)))
            .collect()
    }
}
