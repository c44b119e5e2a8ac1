//! 临床工作流服务器主程序

use clap::Parser;
use clinic_admin::{logging, ClinicConfig};
use clinic_assistant::{AssistantPipeline, ChatCompletionsClient, ChatModel};
use clinic_core::{ClinicError, Result, Role};
use clinic_database::{Database, DatabaseQueries, NewUser};
use clinic_web::{AppState, AuthService, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// 服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "临床工作流 (Clinical Workflow) API 服务器")]
struct Args {
    /// 监听主机
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 数据库连接串
    #[arg(short, long)]
    database_url: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    logging::init(&args.log_level);

    info!("启动临床工作流服务器...");

    let mut config = ClinicConfig::load(args.config.as_deref())
        .map_err(|e| ClinicError::Config(e.to_string()))?;

    // 命令行参数优先于配置文件
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database.url = database_url;
    }

    info!("服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  数据库: {}", config.database.url);
    info!("  生成模型: {}", config.assistant.model);

    let db = Database::connect(&config.database.url, config.database.max_connections).await?;
    let queries = DatabaseQueries::new(&db);
    queries.create_tables().await?;
    seed_default_users(&queries).await?;

    if config.assistant.api_key.is_empty() {
        warn!("Assistant API key not configured; generation requests will be rejected upstream");
    }

    let model: Arc<dyn ChatModel> = Arc::new(ChatCompletionsClient::new(
        config.assistant.base_url.clone(),
        config.assistant.model.clone(),
        config.assistant.api_key.clone(),
    ));
    let assistant = AssistantPipeline::new(model);
    let auth = AuthService::new(
        db.clone(),
        config.auth.jwt_secret.clone(),
        config.auth.token_expiry_minutes,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ClinicError::Config(format!("Invalid listen address: {}", e)))?;

    let server = WebServer::new(addr, AppState::new(db, auth, assistant));
    server.run().await
}

/// 初始化默认账号：管理员直接可用，示例医生等待审批
async fn seed_default_users(queries: &DatabaseQueries<'_>) -> Result<()> {
    if queries.get_user_by_username("admin").await?.is_none() {
        queries
            .create_user(&NewUser {
                username: "admin".to_string(),
                password: "admin123".to_string(),
                role: Role::Admin,
                is_approved: true,
                full_name: Some("System Administrator".to_string()),
                phone: Some("9999999999".to_string()),
                email: Some("admin@hospital.com".to_string()),
            })
            .await?;
        info!("Seeded default admin account");
    }

    if queries.get_user_by_username("dr.smith").await?.is_none() {
        queries
            .create_user(&NewUser {
                username: "dr.smith".to_string(),
                password: "doctor123".to_string(),
                role: Role::Doctor,
                is_approved: false,
                full_name: Some("Dr. John Smith".to_string()),
                phone: Some("8888888888".to_string()),
                email: Some("dr.smith@hospital.com".to_string()),
            })
            .await?;
        info!("Seeded default doctor account (pending approval)");
    }

    Ok(())
}
