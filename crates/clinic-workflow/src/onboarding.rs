//! 医生入职流程
//!
//! 手机验证码校验、档案建立、账号发放与审批。

use crate::state_machine::{OnboardingEvent, OnboardingStateMachine};
use chrono::{Duration, Utc};
use clinic_core::utils::{generate_employee_id, generate_otp, generate_temp_password};
use clinic_core::{ClinicError, DoctorProfile, DoctorStatus, Result, Role, User};
use clinic_database::{
    Database, DatabaseQueries, DoctorProfileChanges, NewDoctorProfile, NewOtpChallenge, NewUser,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 验证码有效期（分钟）
const OTP_TTL_MINUTES: i64 = 10;
/// 验证码位数
const OTP_LENGTH: usize = 6;
/// 临时密码长度
const TEMP_PASSWORD_LENGTH: usize = 10;

/// 医生建档申请
#[derive(Debug, Clone, Deserialize)]
pub struct DoctorApplication {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub email: String,
    pub phone: String,
    pub department: String,
    pub qualification: String,
    pub experience_years: i64,
    pub license_number: String,
}

/// 验证码下发回执
#[derive(Debug, Clone, Serialize)]
pub struct OtpDispatch {
    pub phone: String,
    pub expires_in: i64, // 分钟
}

/// 建档结果
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDoctor {
    pub employee_id: String,
    pub doctor_id: i64,
    pub user_id: i64,
    pub temporary_password: String,
    pub phone: String,
}

/// 审批结果：命中档案，或仅命中自助注册账号
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Profile(DoctorProfile),
    Account(User),
}

/// 医生入职服务
#[derive(Clone)]
pub struct OnboardingService {
    db: Database,
    machine: std::sync::Arc<OnboardingStateMachine>,
}

impl OnboardingService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            machine: std::sync::Arc::new(OnboardingStateMachine::new()),
        }
    }

    fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(&self.db)
    }

    /// 下发手机验证码
    pub async fn send_verification_otp(&self, phone: &str) -> Result<OtpDispatch> {
        let queries = self.queries();

        if queries.profile_phone_taken(phone).await? {
            return Err(ClinicError::Conflict(
                "Phone number already registered with another doctor".to_string(),
            ));
        }

        // 同一手机号只保留最新一条未验证记录
        queries.purge_unverified_otp(phone).await?;

        let code = generate_otp(OTP_LENGTH);
        queries
            .create_otp(&NewOtpChallenge {
                phone: phone.to_string(),
                code: code.clone(),
                purpose: "registration".to_string(),
                expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
            })
            .await?;

        // 短信通道不在范围内，验证码走日志下发
        info!("OTP for {}: {}", phone, code);

        Ok(OtpDispatch {
            phone: phone.to_string(),
            expires_in: OTP_TTL_MINUTES,
        })
    }

    /// 校验手机验证码
    pub async fn verify_phone_otp(&self, phone: &str, code: &str) -> Result<()> {
        let queries = self.queries();

        match queries.find_live_otp(phone, code, Utc::now()).await? {
            Some(challenge) => {
                queries.mark_otp_verified(challenge.id).await?;
                Ok(())
            }
            None => {
                // 记录失败尝试
                if let Some(challenge) = queries.latest_unverified_otp(phone).await? {
                    queries.bump_otp_attempts(challenge.id).await?;
                }
                Err(ClinicError::Validation("Invalid or expired OTP".to_string()))
            }
        }
    }

    /// 建立医生档案并发放待审批账号
    pub async fn create_doctor_profile(&self, application: &DoctorApplication) -> Result<CreatedDoctor> {
        let queries = self.queries();

        // 工号冲突时重新生成
        let employee_id = loop {
            let candidate = generate_employee_id();
            if !queries.employee_id_taken(&candidate).await? {
                break candidate;
            }
        };

        if queries.profile_email_taken(&application.email).await? {
            return Err(ClinicError::Conflict("Email already registered".to_string()));
        }
        if queries.profile_license_taken(&application.license_number).await? {
            return Err(ClinicError::Conflict(
                "License number already registered".to_string(),
            ));
        }

        let full_name = format!(
            "{} {} {}",
            application.title, application.first_name, application.last_name
        )
        .trim()
        .to_string();

        let doctor_id = queries
            .create_profile(&NewDoctorProfile {
                user_id: None,
                employee_id: employee_id.clone(),
                title: application.title.clone(),
                first_name: application.first_name.clone(),
                last_name: application.last_name.clone(),
                full_name: full_name.clone(),
                specialization: application.specialization.clone(),
                email: application.email.clone(),
                phone: application.phone.clone(),
                phone_verified: true,
                department: application.department.clone(),
                qualification: application.qualification.clone(),
                experience_years: application.experience_years,
                license_number: application.license_number.clone(),
                status: DoctorStatus::Pending,
            })
            .await?;

        // 账号以工号为登录名，待管理员审批后方可登录
        let temporary_password = generate_temp_password(TEMP_PASSWORD_LENGTH);
        let user_id = queries
            .create_user(&NewUser {
                username: employee_id.clone(),
                password: temporary_password.clone(),
                role: Role::Doctor,
                is_approved: false,
                full_name: Some(full_name),
                phone: Some(application.phone.clone()),
                email: Some(application.email.clone()),
            })
            .await?;

        queries.link_profile_user(doctor_id, user_id).await?;

        info!("Doctor profile {} created, employee id {}", doctor_id, employee_id);

        Ok(CreatedDoctor {
            employee_id,
            doctor_id,
            user_id,
            temporary_password,
            phone: application.phone.clone(),
        })
    }

    /// 审批通过，激活档案与登录账号
    pub async fn approve_doctor(&self, doctor_id: i64) -> Result<ApprovalOutcome> {
        let queries = self.queries();

        if let Some(profile) = queries.get_profile_by_id(doctor_id).await? {
            let next = self.machine.transition(profile.status, &OnboardingEvent::Approve)?;
            queries
                .set_profile_status(profile.id, next, Some(Utc::now()))
                .await?;

            if let Some(user_id) = profile.user_id {
                queries.set_user_approved(user_id, true).await?;
            }

            let updated = queries
                .get_profile_by_id(doctor_id)
                .await?
                .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;
            info!("Doctor {} approved", updated.employee_id);
            return Ok(ApprovalOutcome::Profile(updated));
        }

        // 自助注册的医生没有档案，直接放行账号
        if let Some(user) = queries.get_user_by_id(doctor_id).await? {
            if user.role == Role::Doctor {
                queries.set_user_approved(user.id, true).await?;
                let updated = queries
                    .get_user_by_id(doctor_id)
                    .await?
                    .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;
                return Ok(ApprovalOutcome::Account(updated));
            }
        }

        Err(ClinicError::NotFound("Doctor not found".to_string()))
    }

    /// 驳回申请
    pub async fn reject_doctor(&self, doctor_id: i64) -> Result<DoctorProfile> {
        let queries = self.queries();

        let profile = queries
            .get_profile_by_id(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;

        let next = self.machine.transition(profile.status, &OnboardingEvent::Reject)?;
        queries.set_profile_status(profile.id, next, None).await?;

        queries
            .get_profile_by_id(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))
    }

    /// 停用（软删除）
    pub async fn deactivate_doctor(&self, doctor_id: i64) -> Result<DoctorProfile> {
        let queries = self.queries();

        let profile = queries
            .get_profile_by_id(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;

        let next = self.machine.transition(profile.status, &OnboardingEvent::Deactivate)?;
        queries.set_profile_status(profile.id, next, None).await?;

        queries
            .get_profile_by_id(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))
    }

    /// 更新档案信息
    pub async fn update_doctor(
        &self,
        doctor_id: i64,
        changes: &DoctorProfileChanges,
    ) -> Result<DoctorProfile> {
        self.queries()
            .update_profile_details(doctor_id, changes)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))
    }

    /// 医生列表，可按状态过滤
    pub async fn list_doctors(&self, status: Option<DoctorStatus>) -> Result<Vec<DoctorProfile>> {
        self.queries().list_profiles(status).await
    }

    /// 待审批医生列表
    pub async fn pending_doctors(&self) -> Result<Vec<DoctorProfile>> {
        self.queries().list_profiles(Some(DoctorStatus::Pending)).await
    }

    /// 在职医生列表
    pub async fn active_doctors(&self) -> Result<Vec<DoctorProfile>> {
        self.queries().list_active_profiles().await
    }

    /// 按ID查询档案
    pub async fn doctor_by_id(&self, doctor_id: i64) -> Result<DoctorProfile> {
        self.queries()
            .get_profile_by_id(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))
    }

    /// 按工号查询档案
    pub async fn doctor_by_employee_id(&self, employee_id: &str) -> Result<DoctorProfile> {
        self.queries()
            .get_profile_by_employee_id(employee_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::utils::is_valid_employee_id;

    async fn test_service() -> OnboardingService {
        let db = Database::connect_in_memory().await.unwrap();
        DatabaseQueries::new(&db).create_tables().await.unwrap();
        OnboardingService::new(db)
    }

    fn sample_application() -> DoctorApplication {
        DoctorApplication {
            title: "Dr.".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Verma".to_string(),
            specialization: "Cardiology".to_string(),
            email: "asha.verma@hospital.com".to_string(),
            phone: "9876543210".to_string(),
            department: "Cardiology".to_string(),
            qualification: "MD".to_string(),
            experience_years: 12,
            license_number: "MCI-4821".to_string(),
        }
    }

    #[tokio::test]
    async fn test_otp_send_and_verify() {
        let service = test_service().await;

        let dispatch = service.send_verification_otp("9000000001").await.unwrap();
        assert_eq!(dispatch.expires_in, 10);

        let challenge = DatabaseQueries::new(&service.db)
            .latest_unverified_otp("9000000001")
            .await
            .unwrap()
            .unwrap();

        service.verify_phone_otp("9000000001", &challenge.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_otp_failure_bumps_attempts() {
        let service = test_service().await;
        service.send_verification_otp("9000000002").await.unwrap();

        let result = service.verify_phone_otp("9000000002", "000000").await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));

        let challenge = DatabaseQueries::new(&service.db)
            .latest_unverified_otp("9000000002")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.attempts, 1);
    }

    #[tokio::test]
    async fn test_otp_rejects_registered_phone() {
        let service = test_service().await;
        service.create_doctor_profile(&sample_application()).await.unwrap();

        let result = service.send_verification_otp("9876543210").await;
        assert!(matches!(result, Err(ClinicError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_profile_issues_pending_account() {
        let service = test_service().await;

        let created = service.create_doctor_profile(&sample_application()).await.unwrap();
        assert!(is_valid_employee_id(&created.employee_id));
        assert_eq!(created.temporary_password.len(), 10);

        let queries = DatabaseQueries::new(&service.db);
        let profile = queries.get_profile_by_id(created.doctor_id).await.unwrap().unwrap();
        assert_eq!(profile.status, DoctorStatus::Pending);
        assert_eq!(profile.user_id, Some(created.user_id));
        assert_eq!(profile.full_name, "Dr. Asha Verma");

        // 审批前账号不可用
        let user = queries.get_user_by_username(&created.employee_id).await.unwrap().unwrap();
        assert!(!user.is_approved);
        assert_eq!(user.role, Role::Doctor);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflict() {
        let service = test_service().await;
        service.create_doctor_profile(&sample_application()).await.unwrap();

        let mut second = sample_application();
        second.phone = "9876543299".to_string();
        second.license_number = "MCI-9999".to_string();

        let result = service.create_doctor_profile(&second).await;
        assert!(matches!(result, Err(ClinicError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_approve_activates_profile_and_account() {
        let service = test_service().await;
        let created = service.create_doctor_profile(&sample_application()).await.unwrap();

        let outcome = service.approve_doctor(created.doctor_id).await.unwrap();
        let profile = match outcome {
            ApprovalOutcome::Profile(profile) => profile,
            ApprovalOutcome::Account(_) => panic!("expected profile outcome"),
        };
        assert_eq!(profile.status, DoctorStatus::Active);
        assert!(profile.approved_at.is_some());

        let user = DatabaseQueries::new(&service.db)
            .get_user_by_id(created.user_id)
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_approved);

        // 审批后不能再驳回
        let result = service.reject_doctor(created.doctor_id).await;
        assert!(matches!(result, Err(ClinicError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_approve_falls_back_to_self_registered_account() {
        let service = test_service().await;

        let user_id = DatabaseQueries::new(&service.db)
            .create_user(&NewUser {
                username: "dr.free".to_string(),
                password: "pw".to_string(),
                role: Role::Doctor,
                is_approved: false,
                full_name: Some("Dr. Free".to_string()),
                phone: None,
                email: None,
            })
            .await
            .unwrap();

        let outcome = service.approve_doctor(user_id).await.unwrap();
        match outcome {
            ApprovalOutcome::Account(user) => assert!(user.is_approved),
            ApprovalOutcome::Profile(_) => panic!("expected account outcome"),
        }
    }

    #[tokio::test]
    async fn test_deactivate_is_soft_delete() {
        let service = test_service().await;
        let created = service.create_doctor_profile(&sample_application()).await.unwrap();
        service.approve_doctor(created.doctor_id).await.unwrap();

        let profile = service.deactivate_doctor(created.doctor_id).await.unwrap();
        assert_eq!(profile.status, DoctorStatus::Inactive);

        // 档案仍可查询
        assert!(service.doctor_by_id(created.doctor_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_doctor_not_found() {
        let service = test_service().await;
        let result = service.doctor_by_id(404).await;
        assert!(matches!(result, Err(ClinicError::NotFound(_))));
    }
}
