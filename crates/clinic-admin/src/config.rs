//! 配置管理
//!
//! 默认值 → 配置文件 → CLINIC_ 前缀环境变量，逐层覆盖。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 智能助手配置
    pub assistant: AssistantConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT签名密钥
    pub jwt_secret: String,
    /// token有效期（分钟）
    pub token_expiry_minutes: i64,
}

/// 智能助手配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// chat-completions 服务地址
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// API密钥
    pub api_key: String,
}

impl ClinicConfig {
    /// 加载配置，环境变量使用双下划线分隔层级，如 CLINIC_SERVER__PORT
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&ClinicConfig::default()).context("Failed to seed default configuration")?,
        );

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("CLINIC").separator("__"))
            .build()?;

        let config: ClinicConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Some(path) = config_path {
            info!("Configuration loaded from: {}", path);
        }
        Ok(config)
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://clinic.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "clinic-dev-secret".to_string(),
            token_expiry_minutes: 30,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_file() {
        let config = ClinicConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.url, "sqlite://clinic.db");
        assert_eq!(config.auth.token_expiry_minutes, 30);
        assert!(config.assistant.api_key.is_empty());
    }
}
