//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use chrono::{NaiveTime, TimeZone, Utc};
use clinic_core::{ClinicError, DoctorStatus};
use clinic_database::{
    DatabaseQueries, DoctorProfileChanges, NewClinicalDocument, NewPatient, PatientChanges,
};
use clinic_workflow::{ApprovalOutcome, DoctorApplication, GenerationOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::server::AppState;

/// HTTP层错误包装，承载状态码映射
#[derive(Debug)]
pub struct ApiError(pub ClinicError);

/// HTTP处理器统一结果类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.0 {
            ClinicError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ClinicError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ClinicError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ClinicError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ClinicError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ClinicError::Workflow(msg) => (StatusCode::CONFLICT, msg),
            err @ ClinicError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            ClinicError::Assistant(msg) => (StatusCode::BAD_GATEWAY, msg),
            ClinicError::Config(msg) | ClinicError::Database(msg) | ClinicError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            err @ ClinicError::Network(_) | err @ ClinicError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Clinical Workflow API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "auth": "/api/auth",
            "patients": "/api/patients",
            "templates": "/api/templates",
            "doctors": "/api/doctors",
            "discharge": "/api/discharge",
            "dashboard": "/api/dashboard/stats"
        }
    }))
}

/// 健康检查处理器，探测数据库连通性
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "service": "Clinical Workflow API"
        })),
        Err(e) => Json(json!({
            "status": "unhealthy",
            "error": e.to_string(),
            "timestamp": Utc::now().to_rfc3339()
        })),
    }
}

// ========== 患者 ==========

#[derive(Debug, Deserialize)]
pub struct PatientCreateRequest {
    pub name: String,
    pub age: i64,
    pub blood_group: String,
    pub diagnosis: String,
    pub treatment: String,
}

#[derive(Debug, Deserialize)]
pub struct PatientUpdateRequest {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub blood_group: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
}

/// 新建患者（仅管理员）
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<PatientCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let patient_id = DatabaseQueries::new(&state.db)
        .create_patient(&NewPatient {
            name: request.name,
            age: request.age,
            blood_group: request.blood_group,
            diagnosis: request.diagnosis,
            treatment: request.treatment,
        })
        .await?;

    info!("Patient {} created", patient_id);

    Ok(Json(json!({
        "message": "Patient created successfully",
        "patient_id": patient_id
    })))
}

/// 患者列表，附最新出院小结状态
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let overviews = state.discharge.patient_overviews().await?;
    Ok(Json(overviews))
}

/// 患者详情
pub async fn get_patient(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let patient = DatabaseQueries::new(&state.db)
        .get_patient_by_id(patient_id)
        .await?
        .ok_or_else(|| ClinicError::NotFound("Patient not found".to_string()))?;

    Ok(Json(patient))
}

/// 更新患者信息（仅管理员）
pub async fn update_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
    Json(request): Json<PatientUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let patient = DatabaseQueries::new(&state.db)
        .update_patient(
            patient_id,
            &PatientChanges {
                name: request.name,
                age: request.age,
                blood_group: request.blood_group,
                diagnosis: request.diagnosis,
                treatment: request.treatment,
            },
        )
        .await?
        .ok_or_else(|| ClinicError::NotFound("Patient not found".to_string()))?;

    Ok(Json(patient))
}

/// 删除患者及其出院小结（仅管理员）
pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let deleted = DatabaseQueries::new(&state.db).delete_patient(patient_id).await?;
    if !deleted {
        return Err(ClinicError::NotFound("Patient not found".to_string()).into());
    }

    Ok(Json(json!({ "message": "Patient deleted successfully" })))
}

// ========== 模板文档 ==========

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub filename: String,
    pub content: String,
}

/// 上传模板文档（仅管理员）
pub async fn create_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let queries = DatabaseQueries::new(&state.db);

    // 文件名已存在时直接返回现有模板
    if let Some(existing) = queries.get_document_by_filename(&request.filename).await? {
        return Ok(Json(json!({
            "message": "Template already exists",
            "template_id": existing.id
        })));
    }

    let template_id = queries
        .create_document(&NewClinicalDocument {
            filename: request.filename,
            content: request.content,
        })
        .await?;

    let document = queries
        .get_document_by_id(template_id)
        .await?
        .ok_or_else(|| ClinicError::NotFound("Template not found".to_string()))?;

    Ok(Json(serde_json::to_value(document).map_err(ClinicError::from)?))
}

/// 模板列表
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let documents = DatabaseQueries::new(&state.db).list_documents().await?;
    Ok(Json(documents))
}

/// 模板详情
pub async fn get_template(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(template_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let document = DatabaseQueries::new(&state.db)
        .get_document_by_id(template_id)
        .await?
        .ok_or_else(|| ClinicError::NotFound("Template not found".to_string()))?;

    Ok(Json(document))
}

/// 更新模板（仅管理员）
pub async fn update_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<i64>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let updated = DatabaseQueries::new(&state.db)
        .update_document(template_id, &request.filename, &request.content)
        .await?
        .ok_or_else(|| ClinicError::NotFound("Template not found".to_string()))?;

    Ok(Json(json!({
        "message": "Template updated successfully",
        "template_id": updated.id
    })))
}

/// 删除模板（仅管理员）
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let deleted = DatabaseQueries::new(&state.db).delete_document(template_id).await?;
    if !deleted {
        return Err(ClinicError::NotFound("Template not found".to_string()).into());
    }

    Ok(Json(json!({ "message": "Template deleted successfully" })))
}

// ========== 医生管理 ==========

#[derive(Debug, Deserialize)]
pub struct OtpSendRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct DoctorListParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorUpdateRequest {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialization: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub license_number: Option<String>,
}

/// 下发手机验证码（仅管理员）
pub async fn send_otp(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<OtpSendRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let dispatch = state.onboarding.send_verification_otp(&request.phone).await?;

    Ok(Json(json!({
        "message": "OTP sent successfully",
        "phone": dispatch.phone,
        "expires_in": dispatch.expires_in
    })))
}

/// 校验手机验证码（仅管理员）
pub async fn verify_otp(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<OtpVerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    state.onboarding.verify_phone_otp(&request.phone, &request.otp).await?;

    Ok(Json(json!({
        "message": "OTP verified successfully",
        "verified": true,
        "phone": request.phone
    })))
}

/// 建立医生档案（仅管理员）
pub async fn create_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(application): Json<DoctorApplication>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let created = state.onboarding.create_doctor_profile(&application).await?;

    Ok(Json(json!({
        "message": "Doctor profile created successfully. Pending admin approval.",
        "employee_id": created.employee_id,
        "doctor_id": created.doctor_id,
        "user_id": created.user_id,
        "temporary_password": created.temporary_password,
        "phone": created.phone
    })))
}

/// 医生列表，可按状态过滤（仅管理员）
pub async fn list_doctors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<DoctorListParams>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let filter = match params.status.as_deref() {
        None | Some("all") | Some("") => None,
        Some(value) => Some(
            DoctorStatus::parse(value)
                .ok_or_else(|| ClinicError::Validation(format!("Unknown status: {}", value)))?,
        ),
    };

    let doctors = state.onboarding.list_doctors(filter).await?;
    Ok(Json(doctors))
}

/// 待审批医生列表（仅管理员）
pub async fn list_pending_doctors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;
    Ok(Json(state.onboarding.pending_doctors().await?))
}

/// 在职医生列表（仅管理员）
pub async fn list_active_doctors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;
    Ok(Json(state.onboarding.active_doctors().await?))
}

/// 医生详情（仅管理员）
pub async fn get_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(doctor_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;
    Ok(Json(state.onboarding.doctor_by_id(doctor_id).await?))
}

/// 按工号查询医生（仅管理员）
pub async fn get_doctor_by_employee_id(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(employee_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;
    Ok(Json(state.onboarding.doctor_by_employee_id(&employee_id).await?))
}

/// 审批医生（仅管理员）
pub async fn approve_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(doctor_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    match state.onboarding.approve_doctor(doctor_id).await? {
        ApprovalOutcome::Profile(profile) => Ok(Json(json!({
            "message": format!("Doctor {} approved successfully", profile.full_name),
            "doctor_id": profile.id,
            "employee_id": profile.employee_id,
            "status": profile.status
        }))),
        ApprovalOutcome::Account(account) => Ok(Json(json!({
            "message": format!(
                "Doctor {} approved successfully",
                account.full_name.as_deref().unwrap_or(&account.username)
            ),
            "user_id": account.id,
            "username": account.username
        }))),
    }
}

/// 驳回医生申请（仅管理员）
pub async fn reject_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(doctor_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let profile = state.onboarding.reject_doctor(doctor_id).await?;

    Ok(Json(json!({
        "message": format!("Doctor {} rejected", profile.full_name),
        "doctor_id": profile.id
    })))
}

/// 更新医生档案（仅管理员）
pub async fn update_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(doctor_id): Path<i64>,
    Json(request): Json<DoctorUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let profile = state
        .onboarding
        .update_doctor(
            doctor_id,
            &DoctorProfileChanges {
                title: request.title,
                first_name: request.first_name,
                last_name: request.last_name,
                specialization: request.specialization,
                email: request.email,
                phone: request.phone,
                department: request.department,
                qualification: request.qualification,
                experience_years: request.experience_years,
                license_number: request.license_number,
            },
        )
        .await?;

    Ok(Json(json!({
        "message": "Doctor details updated successfully",
        "doctor": profile
    })))
}

/// 停用医生账号（仅管理员，软删除）
pub async fn delete_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(doctor_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let profile = state.onboarding.deactivate_doctor(doctor_id).await?;

    Ok(Json(json!({
        "message": format!("Doctor {} removed successfully", profile.full_name)
    })))
}

// ========== 出院小结 ==========

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub doctor_name: String,
    pub doctor_signature: String,
}

/// 生成出院小结（仅管理员）
pub async fn generate_discharge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    match state.discharge.generate(patient_id).await? {
        GenerationOutcome::AlreadyPending(existing) => Ok(Json(json!({
            "message": "Pending discharge summary already exists",
            "summary_id": existing.id,
            "summary": existing.summary
        }))),
        GenerationOutcome::Created(record) => Ok(Json(json!({
            "message": "Discharge summary generated",
            "summary_id": record.id,
            "patient_id": record.patient_id,
            "summary": record.summary,
            "approved": record.approved
        }))),
    }
}

/// 待审批出院小结列表（仅医生）
pub async fn pending_discharges(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    user.require_doctor()?;
    Ok(Json(state.discharge.pending().await?))
}

/// 审批出院小结（仅医生）
pub async fn approve_discharge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(summary_id): Path<i64>,
    Json(approval): Json<ApprovalRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require_doctor()?;

    let record = state
        .discharge
        .approve(summary_id, &approval.doctor_name, &approval.doctor_signature)
        .await?;

    Ok(Json(json!({
        "message": "Discharge summary approved",
        "summary_id": record.id,
        "patient_id": record.patient_id,
        "approved": record.approved,
        "doctor_name": record.doctor_name,
        "approved_at": record.approved_at
    })))
}

/// 出院小结详情
pub async fn get_discharge(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(summary_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.discharge.detail(summary_id).await?))
}

/// 下载出院小结文本
pub async fn download_discharge(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(summary_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.discharge.detail(summary_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"discharge_summary.txt\"",
            ),
        ],
        detail.summary,
    ))
}

// ========== 仪表盘 ==========

/// 角色相关的仪表盘统计
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub generated_today: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_doctors: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_templates: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_discharges: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_doctors: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approvals: Option<i64>,
}

/// 仪表盘统计
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.db);

    let midnight = Utc.from_utc_datetime(&Utc::now().date_naive().and_time(NaiveTime::MIN));

    let mut stats = DashboardStats {
        total_patients: queries.count_patients().await?,
        generated_today: queries.count_patients_since(midnight).await?,
        pending_doctors: None,
        total_templates: None,
        pending_discharges: None,
        active_doctors: None,
        pending_approvals: None,
    };

    match user.role {
        clinic_core::Role::Admin => {
            let pending_profiles = queries.count_profiles_with_status(DoctorStatus::Pending).await?;
            let pending_accounts = queries.count_pending_doctor_users().await?;
            stats.pending_doctors = Some(pending_profiles + pending_accounts);
            stats.total_templates = Some(queries.count_documents().await?);
            stats.pending_discharges = Some(queries.count_pending_summaries().await?);
            stats.active_doctors =
                Some(queries.count_profiles_with_status(DoctorStatus::Active).await?);
        }
        clinic_core::Role::Doctor => {
            stats.pending_approvals = Some(queries.count_pending_summaries().await?);
        }
    }

    Ok(Json(stats))
}

// ========== 知识问答 ==========

#[derive(Debug, Deserialize)]
pub struct AssistantQuery {
    pub query: String,
}

/// 知识问答，走检索增强管线（仅管理员）
pub async fn generate_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AssistantQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;

    let answer = state.assistant.run(&request.query, &state.db).await?;
    Ok(Json(json!({ "answer": answer })))
}
