use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP error {0}: {1}")]
    Http(u16, String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to build client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Timeout
        } else if error.is_connect() {
            ClientError::Connection("connection refused or unreachable".to_string())
        } else if error.is_decode() || error.is_body() {
            ClientError::InvalidResponse(error.to_string())
        } else {
            ClientError::Connection(error.to_string())
        }
    }
}

/// 调用用途：读调用使用较短超时，写/签名调用使用较长超时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Read,
    Write,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Read => "read",
            Purpose::Write => "write",
        }
    }

    /// 根据用途选择超时
    pub fn timeout(&self, settings: &crate::config::model::GlobalSettings) -> Duration {
        match self {
            Purpose::Read => Duration::from_secs(settings.read_timeout_seconds),
            Purpose::Write => Duration::from_secs(settings.write_timeout_seconds),
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC 2.0 请求
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC 2.0 响应
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// 拆出结果，错误对象或缺失结果都视为失败
    pub fn into_result(self) -> Result<Value, ClientError> {
        if let Some(error) = self.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| ClientError::InvalidResponse("missing 'result' field".to_string()))
    }
}

/// 解析十六进制数量（如 eth_blockNumber 的返回值）
pub fn parse_hex_quantity(value: &Value) -> Result<u64, ClientError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ClientError::InvalidResponse(format!("expected hex string, got {value}")))?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing 0x prefix: {raw}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ClientError::InvalidResponse(format!("invalid hex quantity '{raw}': {e}")))
}
