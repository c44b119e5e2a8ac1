//! # Clinic Database
//!
//! 基于 sqlx/SQLite 的持久层：连接池、表结构、行模型与查询接口。

pub mod connection;
pub mod models;
pub mod queries;

pub use connection::Database;
pub use models::*;
pub use queries::DatabaseQueries;
