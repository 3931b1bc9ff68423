use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 候选端点，声明顺序即注册顺序（用于打破平局）
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    pub chain: ChainConfig,
    #[serde(default)]
    pub settings: GlobalSettings,
}

/// 链描述信息，由外部应用提供，用于构建传输客户端
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    #[serde(default)]
    pub native_currency: NativeCurrency,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NativeCurrency {
    #[serde(default = "default_currency_name")]
    pub name: String,
    #[serde(default = "default_currency_symbol")]
    pub symbol: String,
    #[serde(default = "default_currency_decimals")]
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self {
            name: default_currency_name(),
            symbol: default_currency_symbol(),
            decimals: default_currency_decimals(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointConfig {
    /// 端点标识，同时作为日志和指标中的provider名称
    pub name: String,
    pub url: String,
    /// 可选的WebSocket地址
    #[serde(default)]
    pub ws_url: Option<String>,
    /// 数值越小越优先
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// 基础权重 (0-100)，与实时表现无关
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: u32, weight: f64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ws_url: None,
            priority,
            weight,
            enabled: true,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
    #[serde(default = "default_pool_sweep_interval")]
    pub pool_sweep_interval_seconds: u64,
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: u64,
    /// 连续失败达到该次数后标记为不健康
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    /// 失败时记录的响应时间哨兵值
    #[serde(default = "default_failure_latency_ms")]
    pub failure_latency_ms: u64,
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,
    #[serde(default = "default_failover_hold")]
    pub failover_hold_seconds: u64,
    /// CLI 调用时的最大尝试次数（含首次）
    #[serde(default = "default_max_call_attempts")]
    pub max_call_attempts: u32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check_interval(),
            health_check_timeout_seconds: default_health_check_timeout(),
            read_timeout_seconds: default_read_timeout(),
            write_timeout_seconds: default_write_timeout(),
            pool_sweep_interval_seconds: default_pool_sweep_interval(),
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            unhealthy_threshold: default_unhealthy_threshold(),
            failure_latency_ms: default_failure_latency_ms(),
            metrics_window: default_metrics_window(),
            failover_hold_seconds: default_failover_hold(),
            max_call_attempts: default_max_call_attempts(),
        }
    }
}

impl GlobalSettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    pub fn pool_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pool_sweep_interval_seconds)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_seconds)
    }

    pub fn failover_hold(&self) -> Duration {
        Duration::from_secs(self.failover_hold_seconds)
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    50.0
}

fn default_priority() -> u32 {
    1
}

fn default_health_check_interval() -> u64 {
    15
}

fn default_health_check_timeout() -> u64 {
    3
}

fn default_read_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    30 // 签名/写入调用需要更长的超时
}

fn default_pool_sweep_interval() -> u64 {
    300 // 5分钟清理一次
}

fn default_pool_idle_timeout() -> u64 {
    600 // 空闲10分钟后回收
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_failure_latency_ms() -> u64 {
    9999
}

fn default_metrics_window() -> usize {
    1000
}

fn default_failover_hold() -> u64 {
    60
}

fn default_max_call_attempts() -> u32 {
    3
}

fn default_currency_name() -> String {
    "Ether".to_string()
}

fn default_currency_symbol() -> String {
    "ETH".to_string()
}

fn default_currency_decimals() -> u8 {
    18
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let enabled = self.endpoints.iter().filter(|e| e.enabled).count();
        if enabled == 0 {
            anyhow::bail!("No enabled endpoints configured; at least one endpoint is required");
        }

        let mut names = HashSet::new();
        let mut urls = HashSet::new();
        for endpoint in &self.endpoints {
            self.validate_endpoint_config(endpoint)?;

            if !names.insert(endpoint.name.as_str()) {
                anyhow::bail!("Duplicate endpoint name '{}'", endpoint.name);
            }
            if !urls.insert(endpoint.url.as_str()) {
                anyhow::bail!(
                    "Endpoint '{}' reuses url '{}' already declared by another endpoint",
                    endpoint.name,
                    endpoint.url
                );
            }
            if let Some(ws_url) = &endpoint.ws_url {
                if !urls.insert(ws_url.as_str()) {
                    anyhow::bail!(
                        "Endpoint '{}' reuses ws_url '{}' already declared by another endpoint",
                        endpoint.name,
                        ws_url
                    );
                }
            }
        }

        self.validate_chain_config()?;
        self.validate_settings()?;

        Ok(())
    }

    /// 验证单个端点配置
    fn validate_endpoint_config(&self, endpoint: &EndpointConfig) -> Result<()> {
        if endpoint.name.is_empty() {
            anyhow::bail!("Endpoint with url '{}' has empty name", endpoint.url);
        }

        if endpoint.url.is_empty() {
            anyhow::bail!("Endpoint '{}' has empty url", endpoint.name);
        }

        // URL格式验证
        if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
            anyhow::bail!(
                "Endpoint '{}' has invalid url format: '{}'. Must start with http:// or https://",
                endpoint.name,
                endpoint.url
            );
        }

        if let Some(ws_url) = &endpoint.ws_url {
            if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
                anyhow::bail!(
                    "Endpoint '{}' has invalid ws_url format: '{}'. Must start with ws:// or wss://",
                    endpoint.name,
                    ws_url
                );
            }
        }

        if !(0.0..=100.0).contains(&endpoint.weight) {
            anyhow::bail!(
                "Endpoint '{}' has invalid weight: {} (must be between 0 and 100)",
                endpoint.name,
                endpoint.weight
            );
        }

        for (header_name, header_value) in &endpoint.headers {
            if header_name.is_empty() {
                anyhow::bail!("Endpoint '{}' has empty header name", endpoint.name);
            }
            if header_value.is_empty() {
                anyhow::bail!(
                    "Endpoint '{}' has empty header value for header '{}'",
                    endpoint.name,
                    header_name
                );
            }
        }

        Ok(())
    }

    fn validate_chain_config(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            anyhow::bail!("Chain '{}' has invalid chain_id: cannot be 0", self.chain.name);
        }
        if self.chain.name.is_empty() {
            anyhow::bail!("Chain {} has empty name", self.chain.chain_id);
        }
        Ok(())
    }

    fn validate_settings(&self) -> Result<()> {
        let settings = &self.settings;

        if settings.health_check_interval_seconds == 0 {
            anyhow::bail!("health_check_interval_seconds cannot be 0");
        }

        if settings.health_check_timeout_seconds == 0 {
            anyhow::bail!("health_check_timeout_seconds cannot be 0");
        }

        if settings.read_timeout_seconds == 0 || settings.write_timeout_seconds == 0 {
            anyhow::bail!("read_timeout_seconds and write_timeout_seconds cannot be 0");
        }

        if settings.pool_sweep_interval_seconds == 0 {
            anyhow::bail!("pool_sweep_interval_seconds cannot be 0");
        }

        if settings.unhealthy_threshold == 0 {
            anyhow::bail!("unhealthy_threshold cannot be 0");
        }

        if settings.metrics_window == 0 {
            anyhow::bail!("metrics_window cannot be 0");
        }

        if settings.max_call_attempts == 0 {
            anyhow::bail!("max_call_attempts cannot be 0");
        }

        Ok(())
    }

    /// 获取所有启用的端点（保持注册顺序）
    pub fn enabled_endpoints(&self) -> Vec<&EndpointConfig> {
        self.endpoints.iter().filter(|e| e.enabled).collect()
    }

    /// 获取指定端点的配置
    pub fn get_endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}
