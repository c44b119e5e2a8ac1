//! 数据库模型

use chrono::{DateTime, Utc};
use clinic_core::models::*;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库账号表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String, // 存储为字符串，转换为Role枚举
    pub is_approved: bool,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<DbUser> for User {
    fn from(db_user: DbUser) -> Self {
        User {
            id: db_user.id,
            username: db_user.username,
            password: db_user.password,
            role: match db_user.role.as_str() {
                "admin" => Role::Admin,
                _ => Role::Doctor, // 默认角色
            },
            is_approved: db_user.is_approved,
            full_name: db_user.full_name,
            phone: db_user.phone,
            email: db_user.email,
            created_at: db_user.created_at,
            last_login: db_user.last_login,
        }
    }
}

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub blood_group: String,
    pub diagnosis: String,
    pub treatment: String,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            name: db_patient.name,
            age: db_patient.age,
            blood_group: db_patient.blood_group,
            diagnosis: db_patient.diagnosis,
            treatment: db_patient.treatment,
            admission_date: db_patient.admission_date,
            discharge_date: db_patient.discharge_date,
            created_at: db_patient.created_at,
        }
    }
}

/// 数据库模板文档表
#[derive(Debug, FromRow)]
pub struct DbClinicalDocument {
    pub id: i64,
    pub filename: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<DbClinicalDocument> for ClinicalDocument {
    fn from(db_document: DbClinicalDocument) -> Self {
        ClinicalDocument {
            id: db_document.id,
            filename: db_document.filename,
            content: db_document.content,
            created_at: db_document.created_at,
            updated_at: db_document.updated_at,
        }
    }
}

/// 数据库出院小结表
#[derive(Debug, FromRow)]
pub struct DbDischargeSummary {
    pub id: i64,
    pub patient_id: i64,
    pub summary: String,
    pub approved: bool,
    pub doctor_name: Option<String>,
    pub doctor_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<DbDischargeSummary> for DischargeSummary {
    fn from(db_summary: DbDischargeSummary) -> Self {
        DischargeSummary {
            id: db_summary.id,
            patient_id: db_summary.patient_id,
            summary: db_summary.summary,
            approved: db_summary.approved,
            doctor_name: db_summary.doctor_name,
            doctor_signature: db_summary.doctor_signature,
            created_at: db_summary.created_at,
            approved_at: db_summary.approved_at,
        }
    }
}

/// 数据库医生档案表
#[derive(Debug, FromRow)]
pub struct DbDoctorProfile {
    pub id: i64,
    pub user_id: Option<i64>,
    pub employee_id: String,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub specialization: String,
    pub email: String,
    pub phone: String,
    pub phone_verified: bool,
    pub department: String,
    pub qualification: String,
    pub experience_years: i64,
    pub license_number: String,
    pub joining_date: DateTime<Utc>,
    pub status: String, // 存储为字符串，转换为DoctorStatus枚举
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<DbDoctorProfile> for DoctorProfile {
    fn from(db_profile: DbDoctorProfile) -> Self {
        DoctorProfile {
            id: db_profile.id,
            user_id: db_profile.user_id,
            employee_id: db_profile.employee_id,
            title: db_profile.title,
            first_name: db_profile.first_name,
            last_name: db_profile.last_name,
            full_name: db_profile.full_name,
            specialization: db_profile.specialization,
            email: db_profile.email,
            phone: db_profile.phone,
            phone_verified: db_profile.phone_verified,
            department: db_profile.department,
            qualification: db_profile.qualification,
            experience_years: db_profile.experience_years,
            license_number: db_profile.license_number,
            joining_date: db_profile.joining_date,
            status: DoctorStatus::parse(&db_profile.status).unwrap_or(DoctorStatus::Pending),
            created_at: db_profile.created_at,
            updated_at: db_profile.updated_at,
            approved_at: db_profile.approved_at,
        }
    }
}

/// 数据库验证码表
#[derive(Debug, FromRow)]
pub struct DbOtpChallenge {
    pub id: i64,
    pub phone: String,
    pub code: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

impl From<DbOtpChallenge> for OtpChallenge {
    fn from(db_otp: DbOtpChallenge) -> Self {
        OtpChallenge {
            id: db_otp.id,
            phone: db_otp.phone,
            code: db_otp.code,
            purpose: db_otp.purpose,
            expires_at: db_otp.expires_at,
            verified: db_otp.verified,
            attempts: db_otp.attempts,
            created_at: db_otp.created_at,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新账号插入模型
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub is_approved: bool,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// 新患者插入模型
#[derive(Debug)]
pub struct NewPatient {
    pub name: String,
    pub age: i64,
    pub blood_group: String,
    pub diagnosis: String,
    pub treatment: String,
}

/// 新模板文档插入模型
#[derive(Debug)]
pub struct NewClinicalDocument {
    pub filename: String,
    pub content: String,
}

/// 新出院小结插入模型
#[derive(Debug)]
pub struct NewDischargeSummary {
    pub patient_id: i64,
    pub summary: String,
}

/// 新医生档案插入模型
#[derive(Debug)]
pub struct NewDoctorProfile {
    pub user_id: Option<i64>,
    pub employee_id: String,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub specialization: String,
    pub email: String,
    pub phone: String,
    pub phone_verified: bool,
    pub department: String,
    pub qualification: String,
    pub experience_years: i64,
    pub license_number: String,
    pub status: DoctorStatus,
}

/// 新验证码插入模型
#[derive(Debug)]
pub struct NewOtpChallenge {
    pub phone: String,
    pub code: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
}

// 更新模型 - 仅更新给定字段

/// 患者信息变更
#[derive(Debug, Default)]
pub struct PatientChanges {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub blood_group: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
}

/// 医生档案变更
#[derive(Debug, Default)]
pub struct DoctorProfileChanges {
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
