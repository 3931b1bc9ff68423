use rpcman_core::ClientError;
use thiserror::Error;

/// 端点管理错误
#[derive(Debug, Error)]
pub enum ManagerError {
    /// 没有配置任何可用端点，启动时致命
    #[error("no endpoints configured; at least one enabled endpoint is required")]
    NoEndpoints,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}
