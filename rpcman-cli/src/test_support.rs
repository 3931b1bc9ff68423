use async_trait::async_trait;
use rpcman_core::config::model::{ChainConfig, Config, EndpointConfig, GlobalSettings, NativeCurrency};
use rpcman_core::{ClientError, ClientFactory, RpcTransport};
use rpcman_loadbalance::RpcEndpointManager;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

struct FakeTransport {
    url: String,
    timeout: Duration,
    failing: bool,
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
        1
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, ClientError> {
        if self.failing {
            return Err(ClientError::Http(503, "service unavailable".to_string()));
        }
        match method {
            "eth_blockNumber" => Ok(json!("0x10")),
            _ => Ok(json!("0x1")),
        }
    }
}

/// 指定名称的端点总是失败
pub struct FakeFactory {
    failing: HashSet<String>,
}

impl FakeFactory {
    pub fn new(failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.iter().map(|name| name.to_string()).collect(),
        })
    }
}

impl ClientFactory for FakeFactory {
    fn create_client(
        &self,
        endpoint: &EndpointConfig,
        _chain: &ChainConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn RpcTransport>, ClientError> {
        Ok(Arc::new(FakeTransport {
            url: endpoint.url.clone(),
            timeout,
            failing: self.failing.contains(&endpoint.name),
        }))
    }
}

pub fn create_test_manager(factory: Arc<FakeFactory>) -> RpcEndpointManager {
    create_test_manager_with(factory, &[("primary", 1, 100.0), ("backup", 2, 80.0)])
}

/// 按 (名称, 优先级, 权重) 创建端点
pub fn create_test_manager_with(
    factory: Arc<FakeFactory>,
    specs: &[(&str, u32, f64)],
) -> RpcEndpointManager {
    let config = Config {
        endpoints: specs
            .iter()
            .map(|(name, priority, weight)| {
                EndpointConfig::new(
                    *name,
                    format!("https://{name}.rpc.example.com"),
                    *priority,
                    *weight,
                )
            })
            .collect(),
        chain: ChainConfig {
            chain_id: 1,
            name: "Ethereum".to_string(),
            native_currency: NativeCurrency::default(),
        },
        settings: GlobalSettings::default(),
    };
    RpcEndpointManager::new(config, factory).unwrap()
}
