//! Serializable snapshot of a fault for error reporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Fault, FaultId, Frame};

/// Everything about a [`Fault`] except the payload itself, in a form that can
/// be shipped to an error tracker or written as a structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    pub id: FaultId,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub captured_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
}

impl FaultReport {
    pub(crate) fn from_fault(fault: &Fault) -> Self {
        Self {
            id: fault.id(),
            message: fault.message().to_string(),
            location: fault.location().map(str::to_string),
            captured_at: fault.captured_at(),
            frames: fault.stack_trace().frames(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // 全フィールドが JSON 表現を持つので失敗しない
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
