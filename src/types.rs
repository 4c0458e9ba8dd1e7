/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Mutation kinds recorded in the audit trail.
/// Stored in the `operacion` column using the uppercase SQL verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(Operation::Insert),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a mutation targets an entity whose `estado` is already false
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InactivePolicy {
    /// Updates and repeated soft-deletes go through and are audited
    Permit,
    /// Mutations of inactive rows are refused; only restore is allowed
    Reject,
}

impl InactivePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permit" | "allow" => Some(InactivePolicy::Permit),
            "reject" | "deny" => Some(InactivePolicy::Reject),
            _ => None,
        }
    }
}
