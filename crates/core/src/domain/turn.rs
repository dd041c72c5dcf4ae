use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestAttributes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Customer,
    Agent,
}

/// Audit record of one capability invocation, kept on the agent turn that
/// consumed it. The full result payload is not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub capability: String,
    pub success: bool,
    pub latency_ms: u64,
}

/// One message within a session. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
    pub attributes: Option<RequestAttributes>,
    pub invocations: Vec<InvocationRecord>,
}

impl Turn {
    pub fn customer(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Customer,
            text: text.into(),
            at: Utc::now(),
            attributes: None,
            invocations: Vec::new(),
        }
    }

    pub fn agent(
        text: impl Into<String>,
        attributes: RequestAttributes,
        invocations: Vec<InvocationRecord>,
    ) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
            at: Utc::now(),
            attributes: Some(attributes),
            invocations,
        }
    }
}
