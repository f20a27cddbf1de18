//! Action policy adapters.
//!
//! A policy decides, from the step input and the pre-action state packet,
//! whether an action may run. Denials short-circuit the step before the
//! executor is touched.

use crate::actions::ActionInput;
use crate::config::PolicyMode;
use crate::security;
use crate::state::StatePacket;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

pub trait ActionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &ActionInput, pre_state: &StatePacket) -> PolicyDecision;
}

/// Lets every action through; the model owns its choices.
pub struct ModelOwnsActionPolicy;

impl ActionPolicy for ModelOwnsActionPolicy {
    fn name(&self) -> &'static str {
        "model_owns_action"
    }

    fn evaluate(&self, _input: &ActionInput, _pre_state: &StatePacket) -> PolicyDecision {
        PolicyDecision::allow()
    }
}

/// Blocks navigations to unsafe schemes (javascript:, data:, file:,
/// about:, chrome:).
pub struct DeterministicPolicy;

impl ActionPolicy for DeterministicPolicy {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    fn evaluate(&self, input: &ActionInput, _pre_state: &StatePacket) -> PolicyDecision {
        if input.action == "navigate" {
            if let Some(url) = input.url.as_deref() {
                if security::is_unsafe_navigation(url) {
                    return PolicyDecision::deny(format!(
                        "navigation to unsafe scheme blocked: {url}"
                    ));
                }
            }
        }
        PolicyDecision::allow()
    }
}

pub fn policy_for(mode: PolicyMode) -> Arc<dyn ActionPolicy> {
    match mode {
        PolicyMode::ModelOwnsAction => Arc::new(ModelOwnsActionPolicy),
        PolicyMode::Deterministic => Arc::new(DeterministicPolicy),
    }
}
