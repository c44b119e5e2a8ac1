//! # Clinic Web
//!
//! HTTP 接口层：axum 路由、JWT 认证中间件与各域处理器。

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AuthService, AuthUser};
pub use handlers::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
