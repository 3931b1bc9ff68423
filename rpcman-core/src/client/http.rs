use super::traits::RpcTransport;
use super::types::{ClientError, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 基于 reqwest 的 HTTP JSON-RPC 客户端
pub struct HttpTransport {
    client: Client,
    url: String,
    timeout: Duration,
    chain_id: u64,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: String, timeout: Duration, chain_id: u64) -> Result<Self, ClientError> {
        Self::with_headers(url, timeout, chain_id, &HashMap::new())
    }

    /// 创建带自定义头部的客户端
    pub fn with_headers(
        url: String,
        timeout: Duration,
        chain_id: u64,
        headers: &HashMap<String, String>,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .default_headers(build_header_map(headers)?)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            url,
            timeout,
            chain_id,
            next_id: AtomicU64::new(1),
        })
    }
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ClientError::Build(format!("Invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::Build(format!("Invalid header value for '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl RpcTransport for HttpTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, &params);

        tracing::trace!("Sending {} (id={}) to {}", method, id, self.url);

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http(status.as_u16(), body));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        body.into_result()
    }
}
