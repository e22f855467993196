//! REST API types.
//!
//! Violations are flattened to plain JSON so clients can show them next to
//! the offending part of the definition.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ConfigErrors, Violation, ViolationKind};
use crate::steps::{StepInfo, StepRegistry};

/// Response of `POST /api/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub violations: Vec<ViolationDto>,
}

impl ValidateResponse {
    pub fn ok() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
        }
    }
}

impl From<ConfigErrors> for ValidateResponse {
    fn from(errors: ConfigErrors) -> Self {
        Self {
            valid: false,
            violations: errors.0.iter().map(ViolationDto::from).collect(),
        }
    }
}

/// A violation as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationDto {
    /// JSON pointer into the submitted document.
    pub path: String,
    pub message: String,
    /// `invalid_document`, `missing_field`, `unknown_field`, `invalid_value`
    /// or `unknown_step_type`.
    pub kind: String,
    /// Registered step types, for `unknown_step_type` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl From<&Violation> for ViolationDto {
    fn from(violation: &Violation) -> Self {
        let (kind, allowed) = match &violation.kind {
            ViolationKind::InvalidDocument => ("invalid_document", None),
            ViolationKind::MissingField => ("missing_field", None),
            ViolationKind::UnknownField => ("unknown_field", None),
            ViolationKind::InvalidValue => ("invalid_value", None),
            ViolationKind::UnknownStepType { allowed, .. } => ("unknown_step_type", Some(allowed.clone())),
        };
        Self {
            path: violation.path.clone(),
            message: violation.message.clone(),
            kind: kind.to_string(),
            allowed,
        }
    }
}

/// Response of `GET /api/steps`.
#[derive(Debug, Clone, Serialize)]
pub struct StepsResponse {
    pub steps: Vec<StepInfo>,
}

impl From<&StepRegistry> for StepsResponse {
    fn from(registry: &StepRegistry) -> Self {
        Self {
            steps: registry.describe(),
        }
    }
}

/// Error body shared by every endpoint.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
