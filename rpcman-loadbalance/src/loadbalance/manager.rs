use super::failover::FailoverController;
use super::health_checker::{HealthChecker, ProbeReport};
use super::metrics::{LatencyMetric, MetricsRecorder, SampleSource};
use super::pool::{ConnectionPool, PooledClient};
use super::registry::{Endpoint, EndpointRegistry, HealthTransition};
use super::selector::{score, EndpointSelector};
use super::stats::{EndpointStats, ManagerStats};
use super::ManagerError;
use parking_lot::{Mutex, RwLock};
use rpcman_core::config::model::{ChainConfig, Config, GlobalSettings};
use rpcman_core::{ClientFactory, HttpClientFactory, Purpose};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// RPC端点管理器
///
/// 组合端点注册表、健康检查、选择器、连接池、故障转移和指标记录，
/// 对外提供获取客户端、上报调用结果、强制故障转移和统计信息
pub struct RpcEndpointManager {
    config: Arc<Config>,
    registry: Arc<EndpointRegistry>,
    selector: EndpointSelector,
    pool: Arc<ConnectionPool>,
    failover: FailoverController,
    metrics: Arc<MetricsRecorder>,
    health_checker: Arc<HealthChecker>,
    current: RwLock<Option<String>>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RpcEndpointManager {
    /// 创建管理器，客户端由注入的工厂构建
    pub fn new(config: Config, factory: Arc<dyn ClientFactory>) -> Result<Self, ManagerError> {
        if config.enabled_endpoints().is_empty() {
            return Err(ManagerError::NoEndpoints);
        }
        config
            .validate()
            .map_err(|e| ManagerError::InvalidConfig(e.to_string()))?;

        let config = Arc::new(config);
        let registry = Arc::new(EndpointRegistry::new(&config.endpoints, &config.settings)?);
        let metrics = Arc::new(MetricsRecorder::new(config.settings.metrics_window));
        let health_checker = Arc::new(HealthChecker::new(
            registry.clone(),
            metrics.clone(),
            factory.as_ref(),
            &config.chain,
            &config.settings,
        )?);
        let pool = Arc::new(ConnectionPool::new(
            factory,
            config.chain.clone(),
            &config.settings,
        ));

        info!(
            "Initialized RPC endpoint manager for chain {} ({}) with {} endpoints",
            config.chain.name,
            config.chain.chain_id,
            registry.len()
        );

        Ok(Self {
            selector: EndpointSelector::new(registry.clone()),
            failover: FailoverController::new(registry.clone(), config.settings.failover_hold()),
            config,
            registry,
            pool,
            metrics,
            health_checker,
            current: RwLock::new(None),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 使用HTTP传输创建管理器
    pub fn with_http(config: Config) -> Result<Self, ManagerError> {
        Self::new(config, Arc::new(HttpClientFactory::default()))
    }

    /// 启动：先完成一轮探测，再启动健康检查和连接池清理后台任务
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("RPC endpoint manager already running");
            return;
        }

        info!("Starting RPC endpoint manager");
        let reports = self.health_checker.probe_all().await;
        let healthy = reports.iter().filter(|r| r.success).count();
        if healthy == 0 {
            warn!("No endpoint passed the initial health check");
        }

        let health_task = self.health_checker.clone().start();
        let sweep_task = self
            .pool
            .clone()
            .start_sweeper(self.config.settings.pool_sweep_interval());
        self.tasks.lock().extend([health_task, sweep_task]);

        info!(
            "RPC endpoint manager started, {}/{} endpoints healthy",
            healthy,
            reports.len()
        );
    }

    /// 停止后台任务，可重复调用
    pub fn stop(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("RPC endpoint manager stopped ({} background tasks)", tasks.len());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 立即探测所有端点并返回结果
    pub async fn check_now(&self) -> Vec<ProbeReport> {
        self.health_checker.probe_all().await
    }

    pub fn get_read_client(&self) -> Result<PooledClient, ManagerError> {
        self.get_client(Purpose::Read)
    }

    pub fn get_write_client(&self) -> Result<PooledClient, ManagerError> {
        self.get_client(Purpose::Write)
    }

    /// 选择端点并从连接池获取客户端
    ///
    /// 只读取内存中的状态，从不等待网络。
    /// 故障转移固定的端点在保持窗口内优先于得分选择
    pub fn get_client(&self, purpose: Purpose) -> Result<PooledClient, ManagerError> {
        let endpoint = match self.failover.active_pin() {
            Some(endpoint) => {
                debug!("Using failover endpoint {} for {} call", endpoint.id(), purpose);
                endpoint
            }
            None => self.selector.select(purpose)?.endpoint,
        };

        let client = self.pool.get_client(&endpoint, purpose)?;
        *self.current.write() = Some(endpoint.id().to_string());
        Ok(client)
    }

    /// 上报一次真实调用的结果
    pub fn record_call_outcome(&self, endpoint_id: &str, latency_ms: u64, success: bool) {
        if self.registry.get(endpoint_id).is_none() {
            debug!("Ignoring call outcome for unknown endpoint {}", endpoint_id);
            return;
        }

        let latency_ms = if success {
            latency_ms
        } else {
            latency_ms.max(self.registry.failure_latency_ms())
        };
        self.metrics.record(LatencyMetric::new(
            endpoint_id,
            latency_ms,
            success,
            SampleSource::Call,
        ));

        match self.registry.apply_call_outcome(endpoint_id, success, latency_ms) {
            Some(HealthTransition::BecameUnhealthy) => {
                warn!("Endpoint {} marked unhealthy after failed calls", endpoint_id)
            }
            Some(HealthTransition::BecameHealthy) => {
                info!("Endpoint {} is healthy again after a successful call", endpoint_id)
            }
            _ => {}
        }
    }

    /// 从最近一次交给调用方的端点强制轮换到下一个端点
    ///
    /// 尚未选择过端点时，从得分最高的端点开始轮换。
    /// 并发调用方应使用 [`force_failover_from`](Self::force_failover_from)
    pub fn force_failover(&self) -> Result<Endpoint, ManagerError> {
        let current = self.current.read().clone();
        let origin = match current {
            Some(id) => id,
            None => self.selector.select(Purpose::Read)?.endpoint.id().to_string(),
        };
        self.force_failover_from(&origin)
    }

    /// 从指定端点（通常是刚失败的客户端所属端点）强制轮换
    ///
    /// 不依赖共享的当前端点，其他调用方在此期间拿到的客户端不影响轮换起点
    pub fn force_failover_from(&self, endpoint_id: &str) -> Result<Endpoint, ManagerError> {
        let next = self.failover.failover(Some(endpoint_id))?;
        *self.current.write() = Some(next.id().to_string());
        Ok(next)
    }

    /// 最近一次交给调用方的端点
    pub fn current_endpoint(&self) -> Option<Endpoint> {
        let id = self.current.read().clone()?;
        self.registry.get(&id)
    }

    pub fn get_stats(&self) -> ManagerStats {
        let now = Instant::now();
        let endpoints: Vec<EndpointStats> = self
            .registry
            .list_endpoints()
            .iter()
            .map(|endpoint| {
                let metrics = self.metrics.endpoint_metrics(endpoint.id());
                EndpointStats {
                    id: endpoint.id().to_string(),
                    url: endpoint.url().to_string(),
                    ws_url: endpoint.ws_url().map(str::to_string),
                    priority: endpoint.priority(),
                    weight: endpoint.weight(),
                    is_healthy: endpoint.is_healthy,
                    response_time_ms: endpoint.response_time_ms,
                    consecutive_failures: endpoint.consecutive_failures,
                    score: score(endpoint),
                    seconds_since_last_check: endpoint
                        .last_health_check_at
                        .map(|at| now.saturating_duration_since(at).as_secs()),
                    samples: metrics.samples,
                    success_rate: metrics.success_rate(),
                }
            })
            .collect();

        let summary = self.metrics.summary();

        ManagerStats {
            timestamp: chrono::Utc::now().to_rfc3339(),
            chain_id: self.config.chain.chain_id,
            chain_name: self.config.chain.name.clone(),
            running: self.is_running(),
            current_endpoint: self.current.read().clone(),
            pinned_endpoint: self.failover.active_pin().map(|e| e.id().to_string()),
            total_endpoints: endpoints.len(),
            healthy_endpoints: endpoints.iter().filter(|e| e.is_healthy).count(),
            average_latency_ms: summary.average_latency_ms,
            success_rate: summary.success_rate,
            endpoints,
            pool: self.pool.get_stats(),
            metrics: summary,
        }
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.config.settings
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.config.chain
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}

impl Drop for RpcEndpointManager {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
