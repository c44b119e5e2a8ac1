//! 用户认证和授权系统

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use clinic_core::{ClinicError, Result, Role, User};
use clinic_database::{Database, DatabaseQueries, NewUser};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::{ApiError, ApiResult};
use crate::server::AppState;

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub role: Role,
    pub username: String,
}

/// 医生自助注册请求
#[derive(Debug, Deserialize)]
pub struct DoctorRegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,   // 登录名
    role: String,  // 角色
    user_id: i64,  // 账号ID
    exp: usize,    // 过期时间
    iat: usize,    // 签发时间
    jti: String,   // JWT ID
}

/// 当前请求的认证用户
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub username: String,
    pub role: Role,
    pub user_id: i64,
}

impl AuthUser {
    /// 仅管理员可访问
    pub fn require_admin(&self) -> Result<()> {
        if self.role != Role::Admin {
            return Err(ClinicError::Forbidden("Admin access required".to_string()));
        }
        Ok(())
    }

    /// 仅医生可访问
    pub fn require_doctor(&self) -> Result<()> {
        if self.role != Role::Doctor {
            return Err(ClinicError::Forbidden("Doctor access required".to_string()));
        }
        Ok(())
    }
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt_secret: String,
    token_expiry_minutes: i64,
}

impl AuthService {
    pub fn new(db: Database, jwt_secret: String, token_expiry_minutes: i64) -> Self {
        Self {
            db,
            jwt_secret,
            token_expiry_minutes,
        }
    }

    /// 用户登录
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let queries = DatabaseQueries::new(&self.db);

        let user = queries
            .get_user_by_username(&request.username)
            .await?
            .ok_or_else(|| ClinicError::Unauthorized("Invalid credentials".to_string()))?;

        if user.password != request.password {
            return Err(ClinicError::Unauthorized("Invalid credentials".to_string()));
        }

        // 未审批的医生不能登录
        if user.role == Role::Doctor && !user.is_approved {
            return Err(ClinicError::Forbidden("Doctor not approved yet".to_string()));
        }

        let token = self.issue_token(&user)?;
        queries.set_user_last_login(user.id, Utc::now()).await?;

        Ok(LoginResponse {
            access_token: token,
            token_type: "bearer".to_string(),
            role: user.role,
            username: user.username,
        })
    }

    /// 医生自助注册，等待管理员审批
    pub async fn register_doctor(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<i64> {
        let queries = DatabaseQueries::new(&self.db);

        if queries.get_user_by_username(username).await?.is_some() {
            return Err(ClinicError::Conflict("Username already exists".to_string()));
        }

        queries
            .create_user(&NewUser {
                username: username.to_string(),
                password: password.to_string(),
                role: Role::Doctor,
                is_approved: false,
                full_name: Some(full_name.to_string()),
                phone: None,
                email: None,
            })
            .await
    }

    /// 签发JWT token
    fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.token_expiry_minutes);

        let claims = Claims {
            sub: user.username.clone(),
            role: user.role.as_str().to_string(),
            user_id: user.id,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ClinicError::Internal(e.to_string()))
    }

    /// 验证JWT token
    pub fn verify_token(&self, token: &str) -> Result<AuthUser> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ClinicError::Unauthorized("Invalid token".to_string()))?;

        let role = match data.claims.role.as_str() {
            "admin" => Role::Admin,
            _ => Role::Doctor,
        };

        Ok(AuthUser {
            username: data.claims.sub,
            role,
            user_id: data.claims.user_id,
        })
    }
}

/// 认证中间件
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    // 从请求头获取token
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(ApiError::from(ClinicError::Unauthorized(
                "Missing token".to_string(),
            )));
        }
    };

    let user = state.auth.verify_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("Login attempt for user: {}", request.username);

    match state.auth.login(request).await {
        Ok(response) => {
            info!("User logged in successfully: {}", response.username);
            Ok(Json(response))
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}

/// 医生自助注册处理器
pub async fn register_doctor_handler(
    State(state): State<AppState>,
    Json(request): Json<DoctorRegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let doctor_id = state
        .auth
        .register_doctor(&request.username, &request.password, &request.full_name)
        .await?;

    Ok(Json(json!({
        "message": "Doctor registered successfully. Waiting for admin approval.",
        "doctor_id": doctor_id
    })))
}

/// 获取当前用户信息
pub async fn me_handler(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    Json(user)
}
