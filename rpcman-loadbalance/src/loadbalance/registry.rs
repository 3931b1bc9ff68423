use super::ManagerError;
use parking_lot::RwLock;
use rpcman_core::config::model::{EndpointConfig, GlobalSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 候选RPC端点的快照
///
/// 静态字段来自配置，健康字段由健康检查和真实调用结果持续更新
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub config: Arc<EndpointConfig>,
    /// 注册顺序，用于最终的平局裁决
    pub index: usize,
    pub is_healthy: bool,
    pub response_time_ms: u64,
    pub consecutive_failures: u32,
    pub last_health_check_at: Option<Instant>,
}

impl Endpoint {
    fn new(config: EndpointConfig, index: usize) -> Self {
        Self {
            config: Arc::new(config),
            index,
            is_healthy: true,
            response_time_ms: 0,
            consecutive_failures: 0,
            last_health_check_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.name
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn ws_url(&self) -> Option<&str> {
        self.config.ws_url.as_deref()
    }

    pub fn priority(&self) -> u32 {
        self.config.priority
    }

    pub fn weight(&self) -> f64 {
        self.config.weight
    }
}

/// 健康状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    BecameHealthy,
    BecameUnhealthy,
}

/// 端点注册表
///
/// 保存全部端点及其可变健康字段。一次更新在同一把锁内完成，
/// 读取方拿到的是一致的拷贝。注册表本身不做任何I/O
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<Endpoint>>,
    unhealthy_threshold: u32,
    failure_latency_ms: u64,
}

impl EndpointRegistry {
    /// 从配置创建注册表，跳过禁用的端点
    pub fn new(configs: &[EndpointConfig], settings: &GlobalSettings) -> Result<Self, ManagerError> {
        let endpoints: Vec<Endpoint> = configs
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .enumerate()
            .map(|(index, config)| Endpoint::new(config, index))
            .collect();

        if endpoints.is_empty() {
            return Err(ManagerError::NoEndpoints);
        }

        Ok(Self {
            endpoints: RwLock::new(endpoints),
            unhealthy_threshold: settings.unhealthy_threshold,
            failure_latency_ms: settings.failure_latency_ms,
        })
    }

    /// 获取所有端点的快照
    pub fn list_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.read().iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints.read().iter().filter(|e| e.is_healthy).count()
    }

    pub fn failure_latency_ms(&self) -> u64 {
        self.failure_latency_ms
    }

    /// 应用一次健康检查结果，检查时间记为现在
    pub fn update_health(
        &self,
        id: &str,
        success: bool,
        latency_ms: u64,
    ) -> Option<HealthTransition> {
        self.update_health_at(id, success, latency_ms, Instant::now())
    }

    /// 应用一次健康检查结果，检查时间记为检查开始的时刻
    ///
    /// 调度按开始时间计算间隔，检查本身的耗时不会推迟下一次检查
    pub fn update_health_at(
        &self,
        id: &str,
        success: bool,
        latency_ms: u64,
        checked_at: Instant,
    ) -> Option<HealthTransition> {
        self.apply(id, success, latency_ms, Some(checked_at))
    }

    /// 应用一次真实调用结果，不影响健康检查调度
    pub fn apply_call_outcome(
        &self,
        id: &str,
        success: bool,
        latency_ms: u64,
    ) -> Option<HealthTransition> {
        self.apply(id, success, latency_ms, None)
    }

    fn apply(
        &self,
        id: &str,
        success: bool,
        latency_ms: u64,
        checked_at: Option<Instant>,
    ) -> Option<HealthTransition> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints.iter_mut().find(|e| e.id() == id)?;
        let was_healthy = endpoint.is_healthy;

        if success {
            endpoint.consecutive_failures = 0;
            endpoint.is_healthy = true;
            endpoint.response_time_ms = latency_ms;
        } else {
            endpoint.consecutive_failures = endpoint.consecutive_failures.saturating_add(1);
            // 失败的端点永远不会因为延迟而被偏好
            endpoint.response_time_ms = latency_ms.max(self.failure_latency_ms);
            if endpoint.consecutive_failures >= self.unhealthy_threshold {
                endpoint.is_healthy = false;
            }
        }

        if checked_at.is_some() {
            endpoint.last_health_check_at = checked_at;
        }

        debug!(
            "Endpoint {} updated: success={}, healthy={}, failures={}, response_time={}ms",
            id,
            success,
            endpoint.is_healthy,
            endpoint.consecutive_failures,
            endpoint.response_time_ms
        );

        Some(match (was_healthy, endpoint.is_healthy) {
            (false, true) => HealthTransition::BecameHealthy,
            (true, false) => HealthTransition::BecameUnhealthy,
            _ => HealthTransition::Unchanged,
        })
    }

    /// 获取需要检查的端点：从未检查过，或距上次检查已超过间隔
    pub fn due_for_check(&self, interval: Duration, now: Instant) -> Vec<Endpoint> {
        self.endpoints
            .read()
            .iter()
            .filter(|e| match e.last_health_check_at {
                Some(last) => now.saturating_duration_since(last) >= interval,
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_registry() -> EndpointRegistry {
        let configs = vec![
            EndpointConfig::new("a", "https://a.example.com", 1, 100.0),
            EndpointConfig::new("b", "https://b.example.com", 2, 80.0),
        ];
        EndpointRegistry::new(&configs, &GlobalSettings::default()).unwrap()
    }

    #[test]
    fn test_registry_requires_endpoints() {
        let result = EndpointRegistry::new(&[], &GlobalSettings::default());
        assert!(matches!(result, Err(ManagerError::NoEndpoints)));

        let mut disabled = EndpointConfig::new("a", "https://a.example.com", 1, 100.0);
        disabled.enabled = false;
        let result = EndpointRegistry::new(&[disabled], &GlobalSettings::default());
        assert!(matches!(result, Err(ManagerError::NoEndpoints)));
    }

    #[test]
    fn test_initial_state() {
        let registry = create_test_registry();
        let endpoints = registry.list_endpoints();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].id(), "a");
        assert_eq!(endpoints[1].index, 1);
        assert!(endpoints.iter().all(|e| e.is_healthy));
        assert!(endpoints.iter().all(|e| e.consecutive_failures == 0));
        assert!(endpoints.iter().all(|e| e.last_health_check_at.is_none()));
    }

    #[test]
    fn test_unhealthy_after_threshold_and_recovery() {
        let registry = create_test_registry();

        assert_eq!(registry.update_health("a", false, 9999), Some(HealthTransition::Unchanged));
        assert_eq!(registry.update_health("a", false, 9999), Some(HealthTransition::Unchanged));
        assert!(registry.get("a").unwrap().is_healthy);

        assert_eq!(
            registry.update_health("a", false, 9999),
            Some(HealthTransition::BecameUnhealthy)
        );
        let endpoint = registry.get("a").unwrap();
        assert!(!endpoint.is_healthy);
        assert_eq!(endpoint.consecutive_failures, 3);

        assert_eq!(registry.update_health("a", true, 42), Some(HealthTransition::BecameHealthy));
        let endpoint = registry.get("a").unwrap();
        assert!(endpoint.is_healthy);
        assert_eq!(endpoint.consecutive_failures, 0);
        assert_eq!(endpoint.response_time_ms, 42);
    }

    #[test]
    fn test_failure_uses_sentinel_latency() {
        let registry = create_test_registry();
        registry.update_health("b", true, 15);
        registry.update_health("b", false, 120);

        assert_eq!(registry.get("b").unwrap().response_time_ms, 9999);
    }

    #[test]
    fn test_unknown_endpoint() {
        let registry = create_test_registry();
        assert_eq!(registry.update_health("missing", true, 1), None);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_for_check() {
        let registry = create_test_registry();
        let interval = Duration::from_secs(15);

        assert_eq!(registry.due_for_check(interval, Instant::now()).len(), 2);

        registry.update_health("a", true, 10);
        let due = registry.due_for_check(interval, Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), "b");

        // 真实调用结果不刷新检查时间
        registry.apply_call_outcome("b", true, 10);
        assert_eq!(registry.due_for_check(interval, Instant::now()).len(), 1);

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(registry.due_for_check(interval, Instant::now()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_time_is_start_instant() {
        let registry = create_test_registry();
        let interval = Duration::from_secs(15);

        let started = Instant::now();
        tokio::time::advance(Duration::from_millis(400)).await;
        registry.update_health_at("a", true, 400, started);
        registry.update_health_at("b", true, 400, started);

        let endpoint = registry.get("a").unwrap();
        assert_eq!(endpoint.last_health_check_at, Some(started));

        // 从开始时刻算起满一个间隔即到期
        tokio::time::advance(Duration::from_millis(14_600)).await;
        assert_eq!(registry.due_for_check(interval, Instant::now()).len(), 2);
    }
}
