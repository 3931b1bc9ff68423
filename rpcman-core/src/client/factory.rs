use std::sync::Arc;
use std::time::Duration;

use super::http::HttpTransport;
use super::traits::RpcTransport;
use super::types::ClientError;
use crate::config::model::{ChainConfig, EndpointConfig};

/// 客户端工厂
///
/// 按端点、链描述和超时构建传输客户端。管理器通过注入的工厂创建客户端，
/// 测试可以注入计数或挂起的假实现
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        endpoint: &EndpointConfig,
        chain: &ChainConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn RpcTransport>, ClientError>;
}

/// 默认的 HTTP JSON-RPC 客户端工厂
#[derive(Debug, Default, Clone)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn create_client(
        &self,
        endpoint: &EndpointConfig,
        chain: &ChainConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn RpcTransport>, ClientError> {
        tracing::debug!(
            "Creating HTTP transport for endpoint {} ({}) with timeout {:?}",
            endpoint.name,
            endpoint.url,
            timeout
        );
        let transport = HttpTransport::with_headers(
            endpoint.url.clone(),
            timeout,
            chain.chain_id,
            &endpoint.headers,
        )?;
        Ok(Arc::new(transport))
    }
}
