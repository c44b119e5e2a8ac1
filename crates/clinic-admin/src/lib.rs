//! # Clinic Admin
//!
//! 系统管理横切面：配置加载与日志初始化。

pub mod config;
pub mod logging;

pub use config::ClinicConfig;
