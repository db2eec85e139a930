//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，
//! 以 `__` 分隔嵌套字段，例如 `APP_JWT__SECRET`）。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 开发用密钥，生产环境必须覆盖
pub const DEVELOPMENT_JWT_SECRET: &str = "pollchat-development-secret-change-me";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[validate(nested)]
    pub session: SessionConfig,
    #[validate(nested)]
    pub poll: PollConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub bcrypt_cost: Option<u32>,
    /// 单个请求体（含上传文件）的字节上限
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,
}

/// 数据库配置；未设置 url 时使用进程内存储
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[serde(default)]
    #[validate(url)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    pub secret: String,
    /// 上限一年
    #[validate(range(min = 1, max = 525_600))]
    pub access_token_minutes: i64,
    #[validate(range(min = 1, max = 3650))]
    pub refresh_token_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// 每个用户同时存活的会话上限
    #[validate(range(min = 1))]
    pub max_per_user: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PollConfig {
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    #[validate(length(min = 1))]
    pub root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                bcrypt_cost: None,
                max_upload_bytes: 25 * 1024 * 1024,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: DEVELOPMENT_JWT_SECRET.into(),
                access_token_minutes: 10,
                refresh_token_days: 10,
            },
            session: SessionConfig { max_per_user: 2 },
            poll: PollConfig { timeout_seconds: 10 },
            storage: StorageConfig {
                root: "storage".into(),
            },
        }
    }
}

impl AppConfig {
    /// 组合所有配置来源，不做提取与校验
    pub fn figment() -> Figment {
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
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate_all()?;
        Ok(config)
    }

    /// 派生校验之外的检查
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()?;

        // 至少 256 位
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 bytes long".to_string(),
            ));
        }

        if let Some(cost) = self.server.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidServerConfig(
                    "bcrypt cost must be between 4 and 31".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn uses_development_secret(&self) -> bool {
        self.jwt.secret == DEVELOPMENT_JWT_SECRET
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll.timeout_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 日志用的脱敏摘要
    pub fn sanitize(&self) -> String {
        format!(
            "server={} database={} max_sessions={} poll_timeout={}s access={}m refresh={}d storage={}",
            self.bind_address(),
            if self.database.url.is_some() {
                "postgres"
            } else {
                "in-memory"
            },
            self.session.max_per_user,
            self.poll.timeout_seconds,
            self.jwt.access_token_minutes,
            self.jwt.refresh_token_days,
            self.storage.root,
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}
