use super::registry::{Endpoint, EndpointRegistry};
use super::selector::rank_order;
use super::ManagerError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 故障转移后固定使用的端点
#[derive(Debug, Clone)]
struct Pin {
    endpoint_id: String,
    until: Instant,
}

/// 故障转移控制器
///
/// 调用方在真实调用失败、健康检查尚未发现问题时，强制轮换到下一个端点。
/// 轮换是同步的，不会触发或等待健康检查
pub struct FailoverController {
    registry: Arc<EndpointRegistry>,
    pinned: Mutex<Option<Pin>>,
    hold: Duration,
}

impl FailoverController {
    pub fn new(registry: Arc<EndpointRegistry>, hold: Duration) -> Self {
        Self {
            registry,
            pinned: Mutex::new(None),
            hold,
        }
    }

    /// 轮换到(优先级, 注册顺序)中当前端点之后的下一个健康端点，末尾回绕到第一个
    ///
    /// 当前端点未知时从第一个端点开始。没有其他健康端点时退回严格的下一个。
    /// 返回的端点在保持窗口内被固定
    pub fn failover(&self, current_id: Option<&str>) -> Result<Endpoint, ManagerError> {
        let mut ordered = self.registry.list_endpoints();
        ordered.sort_by(rank_order);

        let len = ordered.len();
        let position = current_id.and_then(|id| ordered.iter().position(|e| e.id() == id));
        // 候选顺序：当前端点之后依次回绕，不包括当前端点本身
        let candidates: Vec<usize> = match position {
            Some(i) if len > 1 => (1..len).map(|step| (i + step) % len).collect(),
            Some(i) => vec![i],
            None => (0..len).collect(),
        };

        let index = candidates
            .iter()
            .copied()
            .find(|&i| ordered[i].is_healthy)
            .or_else(|| {
                warn!("No healthy endpoint to fail over to, rotating to the next one anyway");
                candidates.first().copied()
            })
            .ok_or(ManagerError::NoEndpoints)?;
        let next = ordered.swap_remove(index);

        info!(
            "Failover: {} -> {} (pinned for {:?})",
            current_id.unwrap_or("<none>"),
            next.id(),
            self.hold
        );

        *self.pinned.lock() = Some(Pin {
            endpoint_id: next.id().to_string(),
            until: Instant::now() + self.hold,
        });

        Ok(next)
    }

    /// 获取仍然有效的固定端点
    ///
    /// 保持窗口已过或端点变为不健康时解除固定，恢复按得分选择
    pub fn active_pin(&self) -> Option<Endpoint> {
        let mut pinned = self.pinned.lock();
        let pin = pinned.as_ref()?;

        if Instant::now() >= pin.until {
            debug!("Failover pin on {} expired", pin.endpoint_id);
            *pinned = None;
            return None;
        }

        match self.registry.get(&pin.endpoint_id) {
            Some(endpoint) if endpoint.is_healthy => Some(endpoint),
            _ => {
                debug!(
                    "Failover pin on {} released, endpoint is unhealthy",
                    pin.endpoint_id
                );
                *pinned = None;
                None
            }
        }
    }

    /// 清除固定
    pub fn clear(&self) {
        *self.pinned.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcman_core::config::model::{EndpointConfig, GlobalSettings};

    fn create_test_controller() -> (FailoverController, Arc<EndpointRegistry>) {
        // 注册顺序与优先级顺序不同
        let configs = vec![
            EndpointConfig::new("p3", "https://p3.example.com", 3, 50.0),
            EndpointConfig::new("p1", "https://p1.example.com", 1, 50.0),
            EndpointConfig::new("p2", "https://p2.example.com", 2, 50.0),
        ];
        let registry = Arc::new(EndpointRegistry::new(&configs, &GlobalSettings::default()).unwrap());
        (
            FailoverController::new(registry.clone(), Duration::from_secs(60)),
            registry,
        )
    }

    #[tokio::test]
    async fn test_rotation_follows_priority_and_wraps() {
        let (controller, _registry) = create_test_controller();

        assert_eq!(controller.failover(Some("p1")).unwrap().id(), "p2");
        assert_eq!(controller.failover(Some("p2")).unwrap().id(), "p3");
        assert_eq!(controller.failover(Some("p3")).unwrap().id(), "p1");
    }

    #[tokio::test]
    async fn test_unknown_current_starts_at_first() {
        let (controller, _registry) = create_test_controller();

        assert_eq!(controller.failover(None).unwrap().id(), "p1");
        assert_eq!(controller.failover(Some("missing")).unwrap().id(), "p1");
    }

    #[tokio::test]
    async fn test_failover_skips_unhealthy() {
        let (controller, registry) = create_test_controller();
        for _ in 0..3 {
            registry.update_health("p2", false, 9999);
        }

        assert_eq!(controller.failover(Some("p1")).unwrap().id(), "p3");
        assert_eq!(controller.active_pin().unwrap().id(), "p3");
        // p3之后回绕，同样跳过p2
        assert_eq!(controller.failover(Some("p3")).unwrap().id(), "p1");
        assert_eq!(controller.failover(None).unwrap().id(), "p1");
    }

    #[tokio::test]
    async fn test_failover_all_unhealthy_rotates_strictly() {
        let (controller, registry) = create_test_controller();
        for id in ["p1", "p2", "p3"] {
            for _ in 0..3 {
                registry.update_health(id, false, 9999);
            }
        }

        assert_eq!(controller.failover(Some("p1")).unwrap().id(), "p2");
        assert_eq!(controller.failover(Some("p3")).unwrap().id(), "p1");
        // 固定的端点不健康，立即解除
        assert!(controller.active_pin().is_none());
    }

    #[tokio::test]
    async fn test_failover_single_endpoint_stays() {
        let configs = vec![EndpointConfig::new("only", "https://only.example.com", 1, 50.0)];
        let registry = Arc::new(EndpointRegistry::new(&configs, &GlobalSettings::default()).unwrap());
        let controller = FailoverController::new(registry, Duration::from_secs(60));

        assert_eq!(controller.failover(Some("only")).unwrap().id(), "only");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_expires_after_hold() {
        let (controller, _registry) = create_test_controller();

        controller.failover(Some("p1")).unwrap();
        assert_eq!(controller.active_pin().unwrap().id(), "p2");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(controller.active_pin().unwrap().id(), "p2");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(controller.active_pin().is_none());
    }

    #[tokio::test]
    async fn test_clear_pin() {
        let (controller, _registry) = create_test_controller();
        controller.failover(Some("p1")).unwrap();
        controller.clear();
        assert!(controller.active_pin().is_none());
    }
}
