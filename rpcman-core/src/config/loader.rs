use crate::config::model::{Config, EndpointConfig};
use tracing::info;

/// 环境变量：配置文件路径
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
/// 环境变量：逗号分隔的RPC地址，按顺序作为优先级
pub const RPC_URLS_ENV: &str = "RPC_URLS";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 获取配置文件路径
pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_config() -> Result<Config, anyhow::Error> {
    load_config_from_path(&get_config_path())
}

pub fn load_config_from_path(config_path: &str) -> Result<Config, anyhow::Error> {
    // RPC_URLS只提供端点，链信息仍然来自配置文件
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        if std::env::var(RPC_URLS_ENV).is_ok() {
            anyhow::anyhow!(
                "Failed to read config file '{}': {} ({} only supplies endpoints, the file must still define [chain])",
                config_path,
                e,
                RPC_URLS_ENV
            )
        } else {
            anyhow::anyhow!("Failed to read config file '{}': {}", config_path, e)
        }
    })?;
    let mut config = parse_config(&config_str)?;

    if config.endpoints.is_empty() {
        if let Ok(urls) = std::env::var(RPC_URLS_ENV) {
            config.endpoints = endpoints_from_url_list(&urls);
            info!(
                "Loaded {} endpoints from {} environment variable",
                config.endpoints.len(),
                RPC_URLS_ENV
            );
        }
    }

    config.validate()?;
    Ok(config)
}

/// 解析TOML配置（不做验证）
pub fn parse_config(config_str: &str) -> Result<Config, anyhow::Error> {
    let config: Config = toml::from_str(config_str)?;
    Ok(config)
}

/// 将逗号分隔的地址列表转换为端点配置
///
/// 列表位置决定优先级（第一个为1），权重统一为默认值
pub fn endpoints_from_url_list(urls: &str) -> Vec<EndpointConfig> {
    urls.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .enumerate()
        .map(|(index, url)| {
            let priority = index as u32 + 1;
            EndpointConfig::new(format!("rpc-{priority}"), url, priority, 50.0)
        })
        .collect()
}
