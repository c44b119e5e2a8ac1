//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// filter 接受 env-filter 语法，例如 "info" 或 "clinic_web=debug,info"。
/// 重复调用是无害的空操作。
pub fn init(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .try_init();
}
