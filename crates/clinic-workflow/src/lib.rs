//! # Clinic Workflow
//!
//! 医生入职审批与出院小结生命周期的业务编排层。

pub mod discharge;
pub mod onboarding;
pub mod state_machine;

pub use discharge::{DischargeService, GenerationOutcome, PatientOverview, PendingSummary, SummaryDetail};
pub use onboarding::{ApprovalOutcome, CreatedDoctor, DoctorApplication, OnboardingService, OtpDispatch};
pub use state_machine::{OnboardingEvent, OnboardingStateMachine, SummaryEvent, SummaryState, SummaryStateMachine};
