//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 会话生命周期参数（关闭宽限期、客户端版本建议）
//! - 日志与审计输出
//!
//! 加载优先级：默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，嵌套用 `__` 分隔）。

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    /// 会话配置
    #[serde(default)]
    #[validate(nested)]
    pub session: SessionConfig,
    /// 日志配置
    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// 关闭房间时，广播 `room/closed` 之后等待多久再删除房间
    #[validate(range(max = 60000))]
    pub close_grace_ms: u64,
    /// 建议的最低客户端版本（点分数字），低于它只提示不拒绝
    #[serde(default)]
    pub min_client_version: Option<String>,
    /// 是否响应 `room/log` 诊断请求
    pub diagnostics: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_grace_ms: 2000,
            min_client_version: None,
            diagnostics: true,
        }
    }
}

impl SessionConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// 未设置 `RUST_LOG` 时使用的过滤级别
    #[validate(length(min = 1))]
    pub level: String,
    /// WARN 及以上级别额外写入的错误日志文件
    #[serde(default)]
    pub error_log: Option<PathBuf>,
    /// 是否把审计日志以 `log` 事件广播给所有连接
    pub broadcast_audit: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            error_log: None,
            broadcast_audit: true,
        }
    }
}

impl AppConfig {
    /// 按优先级加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig = fig.merge(Env::prefixed("APP_").split("__"));

        let cfg = fig.extract::<AppConfig>().map_err(Box::new)?;
        cfg.verify()?;
        Ok(cfg)
    }

    /// 校验字段范围以及版本号格式
    pub fn verify(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(version) = &self.session.min_client_version {
            let well_formed = !version.is_empty()
                && version
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
            if !well_formed {
                return Err(ConfigError::InvalidClientVersion(version.clone()));
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("invalid min_client_version: {0:?} (expected dotted numbers such as 1.1.0)")]
    InvalidClientVersion(String),
}
