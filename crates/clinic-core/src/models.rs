//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 管理员 - 病历与系统管理权限
    Admin,
    /// 医生 - 出院小结审批权限
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 系统账号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String, // 登录名，医生账号为工号
    pub password: String,
    pub role: Role,
    pub is_approved: bool,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub blood_group: String,
    pub diagnosis: String,
    pub treatment: String,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>, // 出院小结审批通过后写入
    pub created_at: DateTime<Utc>,
}

/// 临床模板文档
///
/// 出院小结生成与知识问答的检索语料。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub id: i64,
    pub filename: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 出院小结
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeSummary {
    pub id: i64,
    pub patient_id: i64,
    pub summary: String,
    pub approved: bool,
    pub doctor_name: Option<String>,
    pub doctor_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// 医生档案状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DoctorStatus {
    Pending,  // 待审批
    Active,   // 在职
    Inactive, // 停用
    Rejected, // 已驳回
}

impl DoctorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoctorStatus::Pending => "pending",
            DoctorStatus::Active => "active",
            DoctorStatus::Inactive => "inactive",
            DoctorStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DoctorStatus::Pending),
            "active" => Some(DoctorStatus::Active),
            "inactive" => Some(DoctorStatus::Inactive),
            "rejected" => Some(DoctorStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for DoctorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 医生档案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: i64,
    pub user_id: Option<i64>, // 关联的登录账号
    pub employee_id: String,  // 工号，格式 HYYXXXX
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
    pub status: DoctorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// 手机验证码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub id: i64,
    pub phone: String,
    pub code: String,
    pub purpose: String, // registration, login, verification
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}
