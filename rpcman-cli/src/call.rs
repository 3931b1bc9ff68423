use anyhow::{anyhow, Result};
use rpcman_core::Purpose;
use rpcman_loadbalance::RpcEndpointManager;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

/// 一次成功调用的结果
#[derive(Debug)]
pub struct CallOutcome {
    pub endpoint_id: String,
    pub attempts: u32,
    pub latency_ms: u64,
    pub result: Value,
}

/// 通过管理器发起JSON-RPC调用
///
/// 每次调用后上报结果；失败时强制故障转移并重试，最多 `max_attempts` 次
pub async fn call_with_failover(
    manager: &RpcEndpointManager,
    method: &str,
    params: Value,
    purpose: Purpose,
    max_attempts: u32,
) -> Result<CallOutcome> {
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let client = manager.get_client(purpose)?;
        let endpoint_id = client.endpoint_id().to_string();

        let started = Instant::now();
        let result = client.request(method, params.clone()).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        drop(client);

        match result {
            Ok(result) => {
                manager.record_call_outcome(&endpoint_id, latency_ms, true);
                info!(
                    "{} succeeded on endpoint {} in {}ms (attempt {})",
                    method, endpoint_id, latency_ms, attempt
                );
                return Ok(CallOutcome {
                    endpoint_id,
                    attempts: attempt,
                    latency_ms,
                    result,
                });
            }
            Err(e) => {
                manager.record_call_outcome(&endpoint_id, latency_ms, false);
                warn!(
                    "{} failed on endpoint {} (attempt {}/{}): {}",
                    method, endpoint_id, attempt, max_attempts, e
                );
                if attempt < max_attempts {
                    // 从本次失败的端点轮换，不受其他调用方影响
                    let next = manager.force_failover_from(&endpoint_id)?;
                    info!("Retrying {} on endpoint {}", method, next.id());
                }
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(anyhow!("{} failed after {} attempts: {}", method, max_attempts, e)),
        None => Err(anyhow!("{} was not attempted (max_call_attempts is 0)", method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_manager, create_test_manager_with, FakeFactory};
    use serde_json::json;

    #[tokio::test]
    async fn test_call_succeeds_on_first_endpoint() {
        let factory = FakeFactory::new(&[]);
        let manager = create_test_manager(factory);

        let outcome = call_with_failover(&manager, "eth_chainId", json!([]), Purpose::Read, 3)
            .await
            .unwrap();

        assert_eq!(outcome.endpoint_id, "primary");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result, json!("0x1"));
        assert_eq!(manager.get_stats().metrics.call_samples, 1);
    }

    #[tokio::test]
    async fn test_call_fails_over_to_next_endpoint() {
        let factory = FakeFactory::new(&["primary"]);
        let manager = create_test_manager(factory);

        let outcome = call_with_failover(&manager, "eth_chainId", json!([]), Purpose::Write, 3)
            .await
            .unwrap();

        assert_eq!(outcome.endpoint_id, "backup");
        assert_eq!(outcome.attempts, 2);

        let stats = manager.get_stats();
        assert_eq!(stats.endpoint("primary").unwrap().consecutive_failures, 1);
        assert_eq!(stats.pinned_endpoint.as_deref(), Some("backup"));
    }

    #[tokio::test]
    async fn test_call_gives_up_after_max_attempts() {
        let factory = FakeFactory::new(&["primary", "backup"]);
        let manager = create_test_manager(factory);

        let error = call_with_failover(&manager, "eth_chainId", json!([]), Purpose::Read, 3)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("failed after 3 attempts"));
        assert_eq!(manager.get_stats().metrics.call_samples, 3);
    }

    #[tokio::test]
    async fn test_call_skips_unhealthy_endpoint_on_retry() {
        let factory = FakeFactory::new(&["primary", "middle"]);
        let manager = create_test_manager_with(
            factory,
            &[("primary", 1, 100.0), ("middle", 2, 90.0), ("last", 3, 10.0)],
        );
        for _ in 0..3 {
            manager.record_call_outcome("middle", 100, false);
        }

        let outcome = call_with_failover(&manager, "eth_chainId", json!([]), Purpose::Read, 3)
            .await
            .unwrap();

        assert_eq!(outcome.endpoint_id, "last");
        assert_eq!(outcome.attempts, 2);
        let stats = manager.get_stats();
        assert_eq!(stats.endpoint("primary").unwrap().consecutive_failures, 1);
        assert_eq!(stats.endpoint("middle").unwrap().consecutive_failures, 3);
    }
}
