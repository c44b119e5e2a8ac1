//! 数据库连接管理

use clinic_core::{ClinicError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// 数据库连接池
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 建立连接池，文件数据库不存在时自动创建
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ClinicError::Database(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        tracing::info!("Database pool established: {}", url);
        Ok(Self { pool })
    }

    /// 内存数据库，单连接保证所有操作落在同一实例上
    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 连通性探测
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;
        Ok(())
    }
}
