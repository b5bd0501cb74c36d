//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 消息分页与读取超时
//! - WebSocket 推送通道
//!
//! 加载顺序：内置默认值 -> `CHAT_CONFIG` 指定的 TOML 文件 -> `CHAT_` 前缀的环境变量
//! （嵌套字段用 `__` 分隔，例如 `CHAT_SERVER__PORT=9000`）。

use std::env;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHAT_";
/// 指定 TOML 配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG";

/// 全局应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 消息读取配置
    pub messaging: MessagingConfig,
    /// WebSocket 配置
    pub websocket: WebSocketConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 消息分页与读取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// 未指定 limit 时的分页大小
    pub default_page_limit: usize,
    /// 单页最大条数，超出时截断
    pub max_page_limit: usize,
    /// 读操作的默认超时（毫秒）
    pub read_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 50,
            max_page_limit: 100,
            read_timeout_ms: 5_000,
        }
    }
}

impl MessagingConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// WebSocket 推送配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// 每个连接的出站缓冲容量
    pub channel_capacity: usize,
    /// 单次推送的最长等待（毫秒），超时视为连接死亡
    pub push_timeout_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            push_timeout_ms: 2_000,
        }
    }
}

impl WebSocketConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序合并并校验
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 组装配置来源，便于测试时单独检查
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".to_string(),
            ));
        }

        if self.messaging.max_page_limit == 0 || self.messaging.default_page_limit == 0 {
            return Err(ConfigError::InvalidMessagingConfig(
                "page limits must be greater than 0".to_string(),
            ));
        }

        if self.messaging.default_page_limit > self.messaging.max_page_limit {
            return Err(ConfigError::InvalidMessagingConfig(
                "default_page_limit cannot exceed max_page_limit".to_string(),
            ));
        }

        if self.messaging.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidMessagingConfig(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.websocket.channel_capacity == 0 {
            return Err(ConfigError::InvalidWebSocketConfig(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.websocket.push_timeout_ms == 0 {
            return Err(ConfigError::InvalidWebSocketConfig(
                "push_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid messaging configuration: {0}")]
    InvalidMessagingConfig(String),
    #[error("Invalid websocket configuration: {0}")]
    InvalidWebSocketConfig(String),
}
