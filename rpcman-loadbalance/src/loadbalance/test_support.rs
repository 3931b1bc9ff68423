//! 测试用的假传输和假工厂

use async_trait::async_trait;
use parking_lot::Mutex;
use rpcman_core::config::model::{ChainConfig, Config, EndpointConfig, GlobalSettings, NativeCurrency};
use rpcman_core::{ClientError, ClientFactory, RpcTransport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 假端点的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    Healthy,
    Failing,
    /// 永不返回
    Hang,
    /// 等待指定时间后正常返回
    Slow(Duration),
}

pub struct FakeTransport {
    url: String,
    timeout: Duration,
    chain_id: u64,
    behavior: Arc<Mutex<FakeBehavior>>,
    block: AtomicU64,
    pub requests: AtomicUsize,
}

#[async_trait]
impl RpcTransport for FakeTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, ClientError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut behavior = *self.behavior.lock();
        if let FakeBehavior::Slow(delay) = behavior {
            tokio::time::sleep(delay).await;
            behavior = FakeBehavior::Healthy;
        }
        match behavior {
            FakeBehavior::Healthy | FakeBehavior::Slow(_) => match method {
                "eth_blockNumber" => {
                    let block = self.block.fetch_add(1, Ordering::Relaxed);
                    Ok(json!(format!("0x{block:x}")))
                }
                _ => Ok(json!("ok")),
            },
            FakeBehavior::Failing => Err(ClientError::Connection("connection refused".to_string())),
            FakeBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(ClientError::Timeout)
            }
        }
    }
}

/// 按URL配置行为并统计构建次数的假工厂
#[derive(Default)]
pub struct FakeFactory {
    behaviors: Mutex<HashMap<String, Arc<Mutex<FakeBehavior>>>>,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 设置某个URL的行为，已创建的客户端同样生效
    pub fn set_behavior(&self, url: &str, behavior: FakeBehavior) {
        let mut behaviors = self.behaviors.lock();
        let slot = behaviors
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(FakeBehavior::Healthy)));
        *slot.lock() = behavior;
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn create_client(
        &self,
        endpoint: &EndpointConfig,
        chain: &ChainConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn RpcTransport>, ClientError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .entry(endpoint.url.clone())
            .or_insert_with(|| Arc::new(Mutex::new(FakeBehavior::Healthy)))
            .clone();

        Ok(Arc::new(FakeTransport {
            url: endpoint.url.clone(),
            timeout,
            chain_id: chain.chain_id,
            behavior,
            block: AtomicU64::new(100),
            requests: AtomicUsize::new(0),
        }))
    }
}

pub fn test_chain() -> ChainConfig {
    ChainConfig {
        chain_id: 1,
        name: "Ethereum".to_string(),
        native_currency: NativeCurrency::default(),
    }
}

pub fn url_for(name: &str) -> String {
    format!("https://{name}.rpc.example.com")
}

/// 按 (名称, 优先级, 权重) 创建测试配置
pub fn test_config(specs: &[(&str, u32, f64)]) -> Config {
    Config {
        endpoints: specs
            .iter()
            .map(|(name, priority, weight)| EndpointConfig::new(*name, url_for(name), *priority, *weight))
            .collect(),
        chain: test_chain(),
        settings: GlobalSettings::default(),
    }
}
