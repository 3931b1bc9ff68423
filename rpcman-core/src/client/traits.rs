use super::types::{parse_hex_quantity, ClientError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// 区块链 JSON-RPC 传输客户端
///
/// 管理层只把它当作按 URL 和超时参数化的不透明客户端，
/// 测试中可以用假实现替换
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// 客户端绑定的端点地址
    fn url(&self) -> &str;

    /// 客户端构建时使用的请求超时
    fn timeout(&self) -> Duration;

    /// 客户端绑定的链ID
    fn chain_id(&self) -> u64;

    /// 发送一次 JSON-RPC 调用并返回 `result` 字段
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError>;

    /// 获取最新区块高度，健康探测默认使用它
    async fn block_number(&self) -> Result<u64, ClientError> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        parse_hex_quantity(&value)
    }
}
