//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> `APP_CONFIG_FILE` 指定的 TOML 文件 -> `APP_` 前缀的环境变量
//! （嵌套字段用 `__` 分隔，例如 `APP_SERVER__PORT=9000`）。

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";
const ENV_PREFIX: &str = "APP_";
const MIN_JWT_SECRET_LEN: usize = 32;
/// token 有效期上限：一年
pub const MAX_JWT_EXPIRATION_HOURS: i64 = 24 * 365;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// JSON 请求体上限，图片以 data URL 形式随请求提交
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
}

impl Default for AppConfig {
    /// 开发环境默认值：内存存储，本机监听
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 5000,
                cors_origins: vec!["*".into()],
                body_limit_bytes: 4 * 1024 * 1024,
            },
            jwt: JwtConfig {
                secret: "local-development-secret-change-me-0123456789".into(),
                expiration_hours: 24 * 7,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 5,
            },
            security: SecurityConfig { bcrypt_cost: 10 },
        }
    }
}

impl AppConfig {
    /// 从默认值、配置文件和环境变量加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 仅 postgres 后端返回连接串
    pub fn database_url(&self) -> Option<&str> {
        match self.storage.backend {
            StorageBackend::Postgres => self.storage.database_url.as_deref(),
            StorageBackend::Memory => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig("host cannot be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort("port must be greater than 0".into()));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "body limit must be greater than 0".into(),
            ));
        }

        // 至少 256 位
        if self.jwt.secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidJwtSecret(format!(
                "JWT secret must be at least {MIN_JWT_SECRET_LEN} characters long"
            )));
        }
        if !(1..=MAX_JWT_EXPIRATION_HOURS).contains(&self.jwt.expiration_hours) {
            return Err(ConfigError::InvalidJwtSecret(format!(
                "expiration must be between 1 and {MAX_JWT_EXPIRATION_HOURS} hours"
            )));
        }

        if self.storage.backend == StorageBackend::Postgres {
            match self.storage.database_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::InvalidDatabaseConfig(
                        "postgres backend requires storage.database_url".into(),
                    ))
                }
            }
            if self.storage.max_connections == 0 {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "max connections must be greater than 0".into(),
                ));
            }
        }

        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::InvalidSecurityConfig(
                "bcrypt cost must be between 4 and 31".into(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid security configuration: {0}")]
    InvalidSecurityConfig(String),
}
