//! 状态机
//!
//! 管理医生档案与出院小结的生命周期状态转换

use clinic_core::{ClinicError, DoctorStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 医生档案状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OnboardingEvent {
    Approve,
    Reject,
    Deactivate,
    Reinstate,
}

/// 医生入职状态机
#[derive(Debug)]
pub struct OnboardingStateMachine {
    transitions: HashMap<(DoctorStatus, OnboardingEvent), DoctorStatus>,
}

impl OnboardingStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((DoctorStatus::Pending, OnboardingEvent::Approve), DoctorStatus::Active);
        transitions.insert((DoctorStatus::Pending, OnboardingEvent::Reject), DoctorStatus::Rejected);
        transitions.insert((DoctorStatus::Pending, OnboardingEvent::Deactivate), DoctorStatus::Inactive);
        transitions.insert((DoctorStatus::Active, OnboardingEvent::Deactivate), DoctorStatus::Inactive);
        transitions.insert((DoctorStatus::Inactive, OnboardingEvent::Reinstate), DoctorStatus::Active);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: DoctorStatus, event: &OnboardingEvent) -> bool {
        self.transitions.contains_key(&(from, event.clone()))
    }

    /// 执行状态转换
    pub fn transition(&self, from: DoctorStatus, event: &OnboardingEvent) -> Result<DoctorStatus> {
        match self.transitions.get(&(from, event.clone())) {
            Some(to) => Ok(*to),
            None => Err(ClinicError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current: DoctorStatus) -> Vec<OnboardingEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Default for OnboardingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 出院小结状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SummaryState {
    /// 已生成，等待医生审批
    PendingReview,
    /// 审批通过，患者出院
    Approved,
}

impl SummaryState {
    pub fn from_approved_flag(approved: bool) -> Self {
        if approved {
            SummaryState::Approved
        } else {
            SummaryState::PendingReview
        }
    }
}

/// 出院小结状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SummaryEvent {
    Approve,
}

/// 出院小结状态机
#[derive(Debug)]
pub struct SummaryStateMachine {
    transitions: HashMap<(SummaryState, SummaryEvent), SummaryState>,
}

impl SummaryStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();
        transitions.insert((SummaryState::PendingReview, SummaryEvent::Approve), SummaryState::Approved);

        Self { transitions }
    }

    pub fn can_transition(&self, from: SummaryState, event: &SummaryEvent) -> bool {
        self.transitions.contains_key(&(from, event.clone()))
    }

    pub fn transition(&self, from: SummaryState, event: &SummaryEvent) -> Result<SummaryState> {
        match self.transitions.get(&(from, event.clone())) {
            Some(to) => Ok(*to),
            None => Err(ClinicError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for SummaryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
