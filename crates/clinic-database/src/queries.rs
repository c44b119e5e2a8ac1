//! 数据库查询操作

use crate::connection::Database;
use crate::models::*;
use chrono::{DateTime, Utc};
use clinic_core::{
    ClinicalDocument, ClinicError, DischargeSummary, DoctorProfile, DoctorStatus, OtpChallenge,
    Patient, Result, User,
};

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    db: &'a Database,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.db.pool();

        // 创建账号表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                role TEXT NOT NULL,
                is_approved BOOLEAN NOT NULL DEFAULT 0,
                full_name TEXT,
                phone TEXT,
                email TEXT,
                created_at TEXT NOT NULL,
                last_login TEXT
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                age INTEGER NOT NULL,
                blood_group TEXT NOT NULL,
                diagnosis TEXT NOT NULL,
                treatment TEXT NOT NULL,
                admission_date TEXT NOT NULL,
                discharge_date TEXT,
                created_at TEXT NOT NULL
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建模板文档表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS clinical_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT UNIQUE NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建出院小结表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS discharge_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id INTEGER NOT NULL REFERENCES patients(id),
                summary TEXT NOT NULL,
                approved BOOLEAN NOT NULL DEFAULT 0,
                doctor_name TEXT,
                doctor_signature TEXT,
                created_at TEXT NOT NULL,
                approved_at TEXT
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建医生档案表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS doctor_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER UNIQUE REFERENCES users(id),
                employee_id TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                full_name TEXT NOT NULL,
                specialization TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                phone TEXT UNIQUE NOT NULL,
                phone_verified BOOLEAN NOT NULL DEFAULT 0,
                department TEXT NOT NULL,
                qualification TEXT NOT NULL,
                experience_years INTEGER NOT NULL,
                license_number TEXT UNIQUE NOT NULL,
                joining_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT,
                approved_at TEXT
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建验证码表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS otp_challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL,
                code TEXT NOT NULL,
                purpose TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                verified BOOLEAN NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
        "#).execute(pool).await.map_err(|e| ClinicError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.db.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_users_username ON users(username)",
            "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
            "CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name)",
            "CREATE INDEX IF NOT EXISTS idx_documents_filename ON clinical_documents(filename)",
            "CREATE INDEX IF NOT EXISTS idx_summaries_patient_id ON discharge_summaries(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_summaries_approved ON discharge_summaries(approved)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_employee_id ON doctor_profiles(employee_id)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_status ON doctor_profiles(status)",
            "CREATE INDEX IF NOT EXISTS idx_otp_phone ON otp_challenges(phone)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| ClinicError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 账号相关操作 ==========

    /// 创建新账号
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            INSERT INTO users (username, password, role, is_approved, full_name, phone, email, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.is_approved)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 根据登录名查找账号
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbUser>(
            "SELECT * FROM users WHERE username = ?"
        )
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(User::from))
    }

    /// 根据ID查找账号
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbUser>(
            "SELECT * FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(User::from))
    }

    /// 更新最后登录时间
    pub async fn set_user_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    /// 更新账号审批标记
    pub async fn set_user_approved(&self, id: i64, approved: bool) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE users SET is_approved = ? WHERE id = ?")
            .bind(approved)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== 患者相关操作 ==========

    /// 创建新患者
    pub async fn create_patient(&self, patient: &NewPatient) -> Result<i64> {
        let pool = self.db.pool();
        let now = Utc::now();

        let result = sqlx::query(r#"
            INSERT INTO patients (name, age, blood_group, diagnosis, treatment, admission_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#)
        .bind(&patient.name)
        .bind(patient.age)
        .bind(&patient.blood_group)
        .bind(&patient.diagnosis)
        .bind(&patient.treatment)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID查找患者
    pub async fn get_patient_by_id(&self, id: i64) -> Result<Option<Patient>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 获取所有患者
    pub async fn list_patients(&self) -> Result<Vec<Patient>> {
        let pool = self.db.pool();

        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients ORDER BY id"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    /// 部分更新患者信息，仅写入给定字段
    pub async fn update_patient(&self, id: i64, changes: &PatientChanges) -> Result<Option<Patient>> {
        let pool = self.db.pool();

        let Some(existing) = self.get_patient_by_id(id).await? else {
            return Ok(None);
        };

        let name = changes.name.clone().unwrap_or(existing.name);
        let age = changes.age.unwrap_or(existing.age);
        let blood_group = changes.blood_group.clone().unwrap_or(existing.blood_group);
        let diagnosis = changes.diagnosis.clone().unwrap_or(existing.diagnosis);
        let treatment = changes.treatment.clone().unwrap_or(existing.treatment);

        sqlx::query(r#"
            UPDATE patients SET name = ?, age = ?, blood_group = ?, diagnosis = ?, treatment = ?
            WHERE id = ?
        "#)
        .bind(&name)
        .bind(age)
        .bind(&blood_group)
        .bind(&diagnosis)
        .bind(&treatment)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        self.get_patient_by_id(id).await
    }

    /// 删除患者及其出院小结
    pub async fn delete_patient(&self, id: i64) -> Result<bool> {
        let pool = self.db.pool();

        sqlx::query("DELETE FROM discharge_summaries WHERE patient_id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        let result = sqlx::query("DELETE FROM patients WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 写入患者出院日期
    pub async fn set_patient_discharged(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE patients SET discharge_date = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== 模板文档相关操作 ==========

    /// 创建新模板文档
    pub async fn create_document(&self, document: &NewClinicalDocument) -> Result<i64> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            INSERT INTO clinical_documents (filename, content, created_at)
            VALUES (?, ?, ?)
        "#)
        .bind(&document.filename)
        .bind(&document.content)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID查找模板文档
    pub async fn get_document_by_id(&self, id: i64) -> Result<Option<ClinicalDocument>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbClinicalDocument>(
            "SELECT * FROM clinical_documents WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(ClinicalDocument::from))
    }

    /// 根据文件名查找模板文档
    pub async fn get_document_by_filename(&self, filename: &str) -> Result<Option<ClinicalDocument>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbClinicalDocument>(
            "SELECT * FROM clinical_documents WHERE filename = ?"
        )
        .bind(filename)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(ClinicalDocument::from))
    }

    /// 获取所有模板文档
    pub async fn list_documents(&self) -> Result<Vec<ClinicalDocument>> {
        let pool = self.db.pool();

        let results = sqlx::query_as::<_, DbClinicalDocument>(
            "SELECT * FROM clinical_documents ORDER BY id"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(ClinicalDocument::from).collect())
    }

    /// 更新模板文档
    pub async fn update_document(
        &self,
        id: i64,
        filename: &str,
        content: &str,
    ) -> Result<Option<ClinicalDocument>> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            UPDATE clinical_documents SET filename = ?, content = ?, updated_at = ?
            WHERE id = ?
        "#)
        .bind(filename)
        .bind(content)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_document_by_id(id).await
    }

    /// 删除模板文档
    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        let pool = self.db.pool();

        let result = sqlx::query("DELETE FROM clinical_documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    // ========== 出院小结相关操作 ==========

    /// 创建新出院小结，初始为待审批状态
    pub async fn create_summary(&self, summary: &NewDischargeSummary) -> Result<i64> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            INSERT INTO discharge_summaries (patient_id, summary, approved, created_at)
            VALUES (?, ?, 0, ?)
        "#)
        .bind(summary.patient_id)
        .bind(&summary.summary)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID查找出院小结
    pub async fn get_summary_by_id(&self, id: i64) -> Result<Option<DischargeSummary>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbDischargeSummary>(
            "SELECT * FROM discharge_summaries WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(DischargeSummary::from))
    }

    /// 患者最新一条出院小结
    pub async fn latest_summary_for_patient(&self, patient_id: i64) -> Result<Option<DischargeSummary>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbDischargeSummary>(
            "SELECT * FROM discharge_summaries WHERE patient_id = ? ORDER BY created_at DESC, id DESC LIMIT 1"
        )
        .bind(patient_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(DischargeSummary::from))
    }

    /// 患者待审批的出院小结
    pub async fn pending_summary_for_patient(&self, patient_id: i64) -> Result<Option<DischargeSummary>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbDischargeSummary>(
            "SELECT * FROM discharge_summaries WHERE patient_id = ? AND approved = 0 LIMIT 1"
        )
        .bind(patient_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(DischargeSummary::from))
    }

    /// 所有待审批出院小结，按生成时间倒序
    pub async fn list_pending_summaries(&self) -> Result<Vec<DischargeSummary>> {
        let pool = self.db.pool();

        let results = sqlx::query_as::<_, DbDischargeSummary>(
            "SELECT * FROM discharge_summaries WHERE approved = 0 ORDER BY created_at DESC, id DESC"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(DischargeSummary::from).collect())
    }

    /// 审批出院小结，写入医生署名
    pub async fn approve_summary(
        &self,
        id: i64,
        doctor_name: &str,
        doctor_signature: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DischargeSummary>> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            UPDATE discharge_summaries
            SET approved = 1, doctor_name = ?, doctor_signature = ?, approved_at = ?
            WHERE id = ?
        "#)
        .bind(doctor_name)
        .bind(doctor_signature)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_summary_by_id(id).await
    }

    // ========== 医生档案相关操作 ==========

    /// 创建新医生档案
    pub async fn create_profile(&self, profile: &NewDoctorProfile) -> Result<i64> {
        let pool = self.db.pool();
        let now = Utc::now();

        let result = sqlx::query(r#"
            INSERT INTO doctor_profiles (
                user_id, employee_id, title, first_name, last_name, full_name,
                specialization, email, phone, phone_verified, department,
                qualification, experience_years, license_number, joining_date,
                status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#)
        .bind(profile.user_id)
        .bind(&profile.employee_id)
        .bind(&profile.title)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.full_name)
        .bind(&profile.specialization)
        .bind(&profile.email)
        .bind(&profile.phone)
        .bind(profile.phone_verified)
        .bind(&profile.department)
        .bind(&profile.qualification)
        .bind(profile.experience_years)
        .bind(&profile.license_number)
        .bind(now)
        .bind(profile.status.as_str())
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 医生档案列表，可按状态过滤，按创建时间倒序
    pub async fn list_profiles(&self, status: Option<DoctorStatus>) -> Result<Vec<DoctorProfile>> {
        let pool = self.db.pool();

        let results = match status {
            Some(status) => {
                sqlx::query_as::<_, DbDoctorProfile>(
                    "SELECT * FROM doctor_profiles WHERE status = ? ORDER BY created_at DESC, id DESC"
                )
                .bind(status.as_str())
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, DbDoctorProfile>(
                    "SELECT * FROM doctor_profiles ORDER BY created_at DESC, id DESC"
                )
                .fetch_all(pool)
                .await
            }
        }
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(DoctorProfile::from).collect())
    }

    /// 在职医生列表，按姓名排序
    pub async fn list_active_profiles(&self) -> Result<Vec<DoctorProfile>> {
        let pool = self.db.pool();

        let results = sqlx::query_as::<_, DbDoctorProfile>(
            "SELECT * FROM doctor_profiles WHERE status = 'active' ORDER BY full_name"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(results.into_iter().map(DoctorProfile::from).collect())
    }

    /// 根据ID查找医生档案
    pub async fn get_profile_by_id(&self, id: i64) -> Result<Option<DoctorProfile>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbDoctorProfile>(
            "SELECT * FROM doctor_profiles WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(DoctorProfile::from))
    }

    /// 根据工号查找医生档案
    pub async fn get_profile_by_employee_id(&self, employee_id: &str) -> Result<Option<DoctorProfile>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbDoctorProfile>(
            "SELECT * FROM doctor_profiles WHERE employee_id = ?"
        )
        .bind(employee_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(DoctorProfile::from))
    }

    /// 检查工号是否已被占用
    pub async fn employee_id_taken(&self, employee_id: &str) -> Result<bool> {
        self.profile_field_taken("employee_id", employee_id).await
    }

    /// 检查邮箱是否已注册
    pub async fn profile_email_taken(&self, email: &str) -> Result<bool> {
        self.profile_field_taken("email", email).await
    }

    /// 检查手机号是否已注册
    pub async fn profile_phone_taken(&self, phone: &str) -> Result<bool> {
        self.profile_field_taken("phone", phone).await
    }

    /// 检查执业证号是否已注册
    pub async fn profile_license_taken(&self, license_number: &str) -> Result<bool> {
        self.profile_field_taken("license_number", license_number).await
    }

    async fn profile_field_taken(&self, column: &str, value: &str) -> Result<bool> {
        let pool = self.db.pool();

        // column 为内部固定取值，不来自外部输入
        let sql = format!("SELECT COUNT(*) FROM doctor_profiles WHERE {} = ?", column);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_one(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    /// 更新医生档案状态
    pub async fn set_profile_status(
        &self,
        id: i64,
        status: DoctorStatus,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query(r#"
            UPDATE doctor_profiles
            SET status = ?, approved_at = COALESCE(?, approved_at), updated_at = ?
            WHERE id = ?
        "#)
        .bind(status.as_str())
        .bind(approved_at)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    /// 部分更新医生档案，姓名字段变更后重组全名
    pub async fn update_profile_details(
        &self,
        id: i64,
        changes: &DoctorProfileChanges,
    ) -> Result<Option<DoctorProfile>> {
        let pool = self.db.pool();

        let Some(existing) = self.get_profile_by_id(id).await? else {
            return Ok(None);
        };

        let title = changes.title.clone().unwrap_or(existing.title);
        let first_name = changes.first_name.clone().unwrap_or(existing.first_name);
        let last_name = changes.last_name.clone().unwrap_or(existing.last_name);
        let full_name = format!("{} {} {}", title, first_name, last_name).trim().to_string();
        let specialization = changes.specialization.clone().unwrap_or(existing.specialization);
        let email = changes.email.clone().unwrap_or(existing.email);
        let phone = changes.phone.clone().unwrap_or(existing.phone);
        let department = changes.department.clone().unwrap_or(existing.department);
        let qualification = changes.qualification.clone().unwrap_or(existing.qualification);
        let experience_years = changes.experience_years.unwrap_or(existing.experience_years);
        let license_number = changes.license_number.clone().unwrap_or(existing.license_number);

        sqlx::query(r#"
            UPDATE doctor_profiles
            SET title = ?, first_name = ?, last_name = ?, full_name = ?,
                specialization = ?, email = ?, phone = ?, department = ?,
                qualification = ?, experience_years = ?, license_number = ?,
                updated_at = ?
            WHERE id = ?
        "#)
        .bind(&title)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&full_name)
        .bind(&specialization)
        .bind(&email)
        .bind(&phone)
        .bind(&department)
        .bind(&qualification)
        .bind(experience_years)
        .bind(&license_number)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        self.get_profile_by_id(id).await
    }

    /// 关联医生档案与登录账号
    pub async fn link_profile_user(&self, profile_id: i64, user_id: i64) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE doctor_profiles SET user_id = ? WHERE id = ?")
            .bind(user_id)
            .bind(profile_id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== 验证码相关操作 ==========

    /// 删除某手机号的未验证记录
    pub async fn purge_unverified_otp(&self, phone: &str) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("DELETE FROM otp_challenges WHERE phone = ? AND verified = 0")
            .bind(phone)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    /// 创建新验证码
    pub async fn create_otp(&self, otp: &NewOtpChallenge) -> Result<i64> {
        let pool = self.db.pool();

        let result = sqlx::query(r#"
            INSERT INTO otp_challenges (phone, code, purpose, expires_at, verified, attempts, created_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
        "#)
        .bind(&otp.phone)
        .bind(&otp.code)
        .bind(&otp.purpose)
        .bind(otp.expires_at)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 查找未过期且码匹配的验证记录
    pub async fn find_live_otp(
        &self,
        phone: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbOtpChallenge>(r#"
            SELECT * FROM otp_challenges
            WHERE phone = ? AND code = ? AND verified = 0 AND expires_at > ?
            LIMIT 1
        "#)
        .bind(phone)
        .bind(code)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(OtpChallenge::from))
    }

    /// 某手机号最近一条未验证记录
    pub async fn latest_unverified_otp(&self, phone: &str) -> Result<Option<OtpChallenge>> {
        let pool = self.db.pool();

        let result = sqlx::query_as::<_, DbOtpChallenge>(r#"
            SELECT * FROM otp_challenges
            WHERE phone = ? AND verified = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
        "#)
        .bind(phone)
        .fetch_optional(pool)
        .await
        .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(result.map(OtpChallenge::from))
    }

    /// 累加失败次数
    pub async fn bump_otp_attempts(&self, id: i64) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE otp_challenges SET attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    /// 标记验证通过
    pub async fn mark_otp_verified(&self, id: i64) -> Result<()> {
        let pool = self.db.pool();

        sqlx::query("UPDATE otp_challenges SET verified = 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== 统计相关操作 ==========

    /// 患者总数
    pub async fn count_patients(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM patients").await
    }

    /// 给定时刻之后入院的患者数
    pub async fn count_patients_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let pool = self.db.pool();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients WHERE created_at >= ?")
            .bind(cutoff)
            .fetch_one(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(count)
    }

    /// 模板文档总数
    pub async fn count_documents(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM clinical_documents").await
    }

    /// 待审批出院小结数
    pub async fn count_pending_summaries(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM discharge_summaries WHERE approved = 0").await
    }

    /// 指定状态的医生档案数
    pub async fn count_profiles_with_status(&self, status: DoctorStatus) -> Result<i64> {
        let pool = self.db.pool();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doctor_profiles WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(count)
    }

    /// 无档案关联的待审批医生账号数（自助注册通道）
    pub async fn count_pending_doctor_users(&self) -> Result<i64> {
        self.count(r#"
            SELECT COUNT(*) FROM users u
            WHERE u.role = 'doctor' AND u.is_approved = 0
              AND NOT EXISTS (SELECT 1 FROM doctor_profiles p WHERE p.user_id = u.id)
        "#).await
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let pool = self.db.pool();

        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(pool)
            .await
            .map_err(|e| ClinicError::Database(e.to_string()))?;

        Ok(count)
    }
}
