use super::metrics::{LatencyMetric, MetricsRecorder, SampleSource};
use super::registry::{EndpointRegistry, HealthTransition};
use super::ManagerError;
use futures::future::join_all;
use parking_lot::Mutex;
use rpcman_core::config::model::{ChainConfig, GlobalSettings};
use rpcman_core::{ClientError, ClientFactory, RpcTransport};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 单次探测的结果
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub endpoint_id: String,
    pub success: bool,
    pub latency_ms: u64,
    pub block_number: Option<u64>,
    pub error: Option<String>,
}

/// 健康检查器
///
/// 定期对每个端点发送 `eth_blockNumber` 探测。每个探测在独立任务中运行并有独立超时，
/// 调度循环从不等待探测完成，卡住的端点不会拖慢其他端点
pub struct HealthChecker {
    registry: Arc<EndpointRegistry>,
    metrics: Arc<MetricsRecorder>,
    /// 每个端点专用的探测客户端，不与连接池共享
    probes: HashMap<String, Arc<dyn RpcTransport>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    check_interval: Duration,
    probe_timeout: Duration,
}

/// 探测结束（包括任务被取消）时移出在途集合
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    endpoint_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.endpoint_id);
    }
}

impl HealthChecker {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        metrics: Arc<MetricsRecorder>,
        factory: &dyn ClientFactory,
        chain: &ChainConfig,
        settings: &GlobalSettings,
    ) -> Result<Self, ManagerError> {
        let probe_timeout = settings.health_check_timeout();

        let mut probes = HashMap::new();
        for endpoint in registry.list_endpoints() {
            let client = factory.create_client(&endpoint.config, chain, probe_timeout)?;
            probes.insert(endpoint.id().to_string(), client);
        }

        Ok(Self {
            registry,
            metrics,
            probes,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            check_interval: settings.health_check_interval(),
            probe_timeout,
        })
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// 当前仍在进行中的探测数量
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// 为端点启动一次探测；已有探测在途时返回None
    fn spawn_probe(self: &Arc<Self>, endpoint_id: &str) -> Option<JoinHandle<ProbeReport>> {
        let client = self.probes.get(endpoint_id)?.clone();

        if !self.in_flight.lock().insert(endpoint_id.to_string()) {
            debug!("Probe for endpoint {} still in flight, skipping", endpoint_id);
            return None;
        }

        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            endpoint_id: endpoint_id.to_string(),
        };
        let checker = self.clone();

        Some(tokio::spawn(async move {
            let report = checker.probe(&guard.endpoint_id, client.as_ref()).await;
            drop(guard);
            report
        }))
    }

    async fn probe(&self, endpoint_id: &str, client: &dyn RpcTransport) -> ProbeReport {
        let started = Instant::now();
        debug!("Probing endpoint {} ({})", endpoint_id, client.url());

        let outcome = match timeout(self.probe_timeout, client.block_number()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(block_number) => ProbeReport {
                endpoint_id: endpoint_id.to_string(),
                success: true,
                latency_ms: elapsed_ms,
                block_number: Some(block_number),
                error: None,
            },
            Err(e) => {
                warn!("Health probe failed for endpoint {}: {}", endpoint_id, e);
                ProbeReport {
                    endpoint_id: endpoint_id.to_string(),
                    success: false,
                    latency_ms: self.registry.failure_latency_ms(),
                    block_number: None,
                    error: Some(e.to_string()),
                }
            }
        };

        self.metrics.record(LatencyMetric::new(
            endpoint_id,
            report.latency_ms,
            report.success,
            SampleSource::Probe,
        ));

        match self
            .registry
            .update_health_at(endpoint_id, report.success, report.latency_ms, started)
        {
            Some(HealthTransition::BecameUnhealthy) => {
                warn!("Endpoint {} marked unhealthy", endpoint_id)
            }
            Some(HealthTransition::BecameHealthy) => {
                info!("Endpoint {} recovered and is healthy again", endpoint_id)
            }
            Some(HealthTransition::Unchanged) => {}
            None => error!("Probed endpoint {} is not registered", endpoint_id),
        }

        report
    }

    /// 探测所有端点并等待结果（启动时和命令行一次性检查使用）
    pub async fn probe_all(self: &Arc<Self>) -> Vec<ProbeReport> {
        let endpoints = self.registry.list_endpoints();
        info!("Probing {} endpoints", endpoints.len());

        let handles: Vec<_> = endpoints
            .iter()
            .filter_map(|endpoint| self.spawn_probe(endpoint.id()))
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Health probe task failed: {}", e),
            }
        }

        let healthy = reports.iter().filter(|r| r.success).count();
        info!("Probe round completed: {}/{} endpoints healthy", healthy, reports.len());
        reports
    }

    /// 为所有到期的端点启动探测，不等待结果，返回启动的探测数量
    pub fn spawn_due_probes(self: &Arc<Self>) -> usize {
        let due = self.registry.due_for_check(self.check_interval, Instant::now());
        let spawned = due
            .iter()
            .filter_map(|endpoint| self.spawn_probe(endpoint.id()))
            .count();

        if spawned > 0 {
            debug!("Spawned {} health probes", spawned);
        }
        spawned
    }

    /// 启动健康检查循环
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!("Starting health checker with interval: {:?}", self.check_interval);

        tokio::spawn(async move {
            let mut ticker = interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.spawn_due_probes();
            }
        })
    }
}
