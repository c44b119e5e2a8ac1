//! 出院小结流程
//!
//! 生成走检索增强管线，审批由医生署名完成并触发患者出院。

use crate::state_machine::{SummaryEvent, SummaryState, SummaryStateMachine};
use chrono::{DateTime, Utc};
use clinic_assistant::AssistantPipeline;
use clinic_core::{ClinicError, DischargeSummary, Result};
use clinic_database::{Database, DatabaseQueries, NewDischargeSummary};
use serde::Serialize;
use tracing::info;

/// 待审批列表中的摘要预览长度（字符）
const PREVIEW_CHARS: usize = 300;

/// 生成结果：新生成，或该患者已有待审批小结
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Created(DischargeSummary),
    AlreadyPending(DischargeSummary),
}

/// 待审批小结条目
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub summary_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub summary: String, // 截断预览
    pub generated_at: DateTime<Utc>,
}

/// 小结详情，附患者姓名
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDetail {
    pub summary_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub summary: String,
    pub approved: bool,
    pub doctor_name: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// 患者列表条目，附最新小结状态
#[derive(Debug, Clone, Serialize)]
pub struct PatientOverview {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub blood_group: String,
    pub diagnosis: String,
    pub treatment: String,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub discharge_status: String, // "Active" 或 "Discharged"
    pub summary_approved: bool,
}

/// 出院小结服务
#[derive(Clone)]
pub struct DischargeService {
    db: Database,
    pipeline: AssistantPipeline,
    machine: std::sync::Arc<SummaryStateMachine>,
}

impl DischargeService {
    pub fn new(db: Database, pipeline: AssistantPipeline) -> Self {
        Self {
            db,
            pipeline,
            machine: std::sync::Arc::new(SummaryStateMachine::new()),
        }
    }

    fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(&self.db)
    }

    /// 为患者生成出院小结
    ///
    /// 同一患者同时只允许一份待审批小结。
    pub async fn generate(&self, patient_id: i64) -> Result<GenerationOutcome> {
        let queries = self.queries();

        let patient = queries
            .get_patient_by_id(patient_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Patient not found".to_string()))?;

        if let Some(existing) = queries.pending_summary_for_patient(patient_id).await? {
            return Ok(GenerationOutcome::AlreadyPending(existing));
        }

        let query = format!(
            "Generate discharge summary for:\nName: {}\nAge: {}\nBlood Group: {}\nDiagnosis: {}\nTreatment: {}",
            patient.name, patient.age, patient.blood_group, patient.diagnosis, patient.treatment
        );

        let summary_text = self.pipeline.run(&query, &self.db).await?;

        let summary_id = queries
            .create_summary(&NewDischargeSummary {
                patient_id: patient.id,
                summary: summary_text,
            })
            .await?;

        info!("Discharge summary {} generated for patient {}", summary_id, patient_id);

        let record = queries
            .get_summary_by_id(summary_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Discharge summary not found".to_string()))?;

        Ok(GenerationOutcome::Created(record))
    }

    /// 医生审批通过，患者转为已出院
    pub async fn approve(
        &self,
        summary_id: i64,
        doctor_name: &str,
        doctor_signature: &str,
    ) -> Result<DischargeSummary> {
        let queries = self.queries();

        let summary = queries
            .get_summary_by_id(summary_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Discharge summary not found".to_string()))?;

        self.machine.transition(
            SummaryState::from_approved_flag(summary.approved),
            &SummaryEvent::Approve,
        )?;

        let now = Utc::now();
        let approved = queries
            .approve_summary(summary_id, doctor_name, doctor_signature, now)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Discharge summary not found".to_string()))?;

        queries.set_patient_discharged(approved.patient_id, now).await?;

        info!("Discharge summary {} approved by {}", summary_id, doctor_name);
        Ok(approved)
    }

    /// 待审批小结列表，摘要截断为预览
    pub async fn pending(&self) -> Result<Vec<PendingSummary>> {
        let queries = self.queries();
        let pending = queries.list_pending_summaries().await?;

        let mut result = Vec::with_capacity(pending.len());
        for summary in pending {
            let patient_name = match queries.get_patient_by_id(summary.patient_id).await? {
                Some(patient) => patient.name,
                None => "Unknown".to_string(),
            };

            result.push(PendingSummary {
                summary_id: summary.id,
                patient_id: summary.patient_id,
                patient_name,
                summary: preview(&summary.summary),
                generated_at: summary.created_at,
            });
        }

        Ok(result)
    }

    /// 小结详情
    pub async fn detail(&self, summary_id: i64) -> Result<SummaryDetail> {
        let queries = self.queries();

        let summary = queries
            .get_summary_by_id(summary_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Discharge summary not found".to_string()))?;

        let patient_name = match queries.get_patient_by_id(summary.patient_id).await? {
            Some(patient) => patient.name,
            None => "Unknown".to_string(),
        };

        Ok(SummaryDetail {
            summary_id: summary.id,
            patient_id: summary.patient_id,
            patient_name,
            summary: summary.summary,
            approved: summary.approved,
            doctor_name: summary.doctor_name,
            approved_at: summary.approved_at,
        })
    }

    /// 患者列表，附最新小结的出院状态
    pub async fn patient_overviews(&self) -> Result<Vec<PatientOverview>> {
        let queries = self.queries();
        let patients = queries.list_patients().await?;

        let mut result = Vec::with_capacity(patients.len());
        for patient in patients {
            let latest = queries.latest_summary_for_patient(patient.id).await?;
            let summary_approved = latest.as_ref().map(|s| s.approved).unwrap_or(false);

            result.push(PatientOverview {
                id: patient.id,
                name: patient.name,
                age: patient.age,
                blood_group: patient.blood_group,
                diagnosis: patient.diagnosis,
                treatment: patient.treatment,
                admission_date: patient.admission_date,
                discharge_date: patient.discharge_date,
                discharge_status: if summary_approved {
                    "Discharged".to_string()
                } else {
                    "Active".to_string()
                },
                summary_approved,
            });
        }

        Ok(result)
    }
}

/// 截断为预览文本，超长加省略号
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let truncated: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clinic_assistant::{ChatModel, CompletionRequest, NO_TEMPLATES_MESSAGE};
    use clinic_database::{NewClinicalDocument, NewPatient};
    use std::sync::Arc;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    async fn test_service(reply: &str) -> DischargeService {
        let db = Database::connect_in_memory().await.unwrap();
        DatabaseQueries::new(&db).create_tables().await.unwrap();

        let pipeline = AssistantPipeline::new(Arc::new(ScriptedModel {
            reply: reply.to_string(),
        }));
        DischargeService::new(db, pipeline)
    }

    async fn seed_patient(service: &DischargeService) -> i64 {
        let queries = DatabaseQueries::new(&service.db);
        queries
            .create_document(&NewClinicalDocument {
                filename: "general.txt".to_string(),
                content: "General discharge protocol: review medications, schedule follow-up.".to_string(),
            })
            .await
            .unwrap();
        queries
            .create_patient(&NewPatient {
                name: "Ravi Kumar".to_string(),
                age: 54,
                blood_group: "B+".to_string(),
                diagnosis: "Type 2 diabetes mellitus".to_string(),
                treatment: "Metformin 500mg twice daily".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_creates_pending_summary() {
        let service = test_service("PATIENT OVERVIEW: Ravi Kumar, stable").await;
        let patient_id = seed_patient(&service).await;

        let outcome = service.generate(patient_id).await.unwrap();
        let summary = match outcome {
            GenerationOutcome::Created(summary) => summary,
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        };
        assert!(!summary.approved);
        assert_eq!(summary.summary, "PATIENT OVERVIEW: Ravi Kumar, stable");
    }

    #[tokio::test]
    async fn test_generate_returns_existing_pending() {
        let service = test_service("SUMMARY").await;
        let patient_id = seed_patient(&service).await;

        let first = match service.generate(patient_id).await.unwrap() {
            GenerationOutcome::Created(summary) => summary,
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        };

        // 已有待审批小结时不重复生成
        match service.generate(patient_id).await.unwrap() {
            GenerationOutcome::AlreadyPending(existing) => assert_eq!(existing.id, first.id),
            GenerationOutcome::Created(_) => panic!("expected pending summary"),
        }
    }

    #[tokio::test]
    async fn test_generate_unknown_patient() {
        let service = test_service("SUMMARY").await;
        let result = service.generate(404).await;
        assert!(matches!(result, Err(ClinicError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_generate_without_templates_stores_notice() {
        let service = test_service("unused").await;
        let patient_id = DatabaseQueries::new(&service.db)
            .create_patient(&NewPatient {
                name: "Meena Joshi".to_string(),
                age: 61,
                blood_group: "O+".to_string(),
                diagnosis: "Hypertension".to_string(),
                treatment: "Amlodipine 5mg daily".to_string(),
            })
            .await
            .unwrap();

        let outcome = service.generate(patient_id).await.unwrap();
        match outcome {
            GenerationOutcome::Created(summary) => assert_eq!(summary.summary, NO_TEMPLATES_MESSAGE),
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        }
    }

    #[tokio::test]
    async fn test_approve_discharges_patient() {
        let service = test_service("SUMMARY").await;
        let patient_id = seed_patient(&service).await;

        let summary = match service.generate(patient_id).await.unwrap() {
            GenerationOutcome::Created(summary) => summary,
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        };

        let approved = service.approve(summary.id, "Dr. Mehta", "sig-mehta").await.unwrap();
        assert!(approved.approved);
        assert_eq!(approved.doctor_name.as_deref(), Some("Dr. Mehta"));

        let patient = DatabaseQueries::new(&service.db)
            .get_patient_by_id(patient_id)
            .await
            .unwrap()
            .unwrap();
        assert!(patient.discharge_date.is_some());

        // 重复审批走状态机报错
        let result = service.approve(summary.id, "Dr. Mehta", "sig-mehta").await;
        assert!(matches!(result, Err(ClinicError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_pending_list_truncates_preview() {
        let long_reply = "x".repeat(400);
        let service = test_service(&long_reply).await;
        let patient_id = seed_patient(&service).await;
        service.generate(patient_id).await.unwrap();

        let pending = service.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].patient_name, "Ravi Kumar");
        assert_eq!(pending[0].summary.chars().count(), 303); // 300 + "..."
        assert!(pending[0].summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_detail_includes_patient_name() {
        let service = test_service("SUMMARY").await;
        let patient_id = seed_patient(&service).await;
        let summary = match service.generate(patient_id).await.unwrap() {
            GenerationOutcome::Created(summary) => summary,
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        };

        let detail = service.detail(summary.id).await.unwrap();
        assert_eq!(detail.patient_name, "Ravi Kumar");
    }

    #[tokio::test]
    async fn test_patient_overviews_reflect_discharge() {
        let service = test_service("SUMMARY").await;
        let patient_id = seed_patient(&service).await;

        let overviews = service.patient_overviews().await.unwrap();
        assert_eq!(overviews[0].discharge_status, "Active");
        assert!(!overviews[0].summary_approved);

        let summary = match service.generate(patient_id).await.unwrap() {
            GenerationOutcome::Created(summary) => summary,
            GenerationOutcome::AlreadyPending(_) => panic!("expected fresh summary"),
        };
        service.approve(summary.id, "Dr. Mehta", "sig").await.unwrap();

        let overviews = service.patient_overviews().await.unwrap();
        assert_eq!(overviews[0].discharge_status, "Discharged");
        assert!(overviews[0].summary_approved);
    }
}
