//! # Contact Model
//!
//! Directory entries for people who receive incident alerts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A person in the contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub department: String,
    pub is_active: bool,
    /// Emergency organisation role, e.g. the team the person leads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_role_description: Option<String>,
    /// Concrete duty the person performs during an emergency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_duty: Option<String>,
}

impl Contact {
    /// Active and reachable by phone.
    pub fn is_reachable(&self) -> bool {
        self.is_active && !self.phone.trim().is_empty()
    }

    /// Whether the contact carries a role description or a duty.
    pub fn has_assignment(&self) -> bool {
        non_blank(&self.emergency_role_description) || non_blank(&self.emergency_duty)
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
