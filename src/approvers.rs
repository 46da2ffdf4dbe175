//! Authorized approvers.
//!
//! Only people on this list may approve an incident for broadcast. The list is
//! built in and can be replaced through `ALERTING_APPROVERS`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A person allowed to approve incidents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorizedApprover {
    pub name: String,
    pub phone: String,
    pub company: String,
    pub position: String,
}

impl AuthorizedApprover {
    fn builtin(name: &str, phone: &str, position: &str) -> Self {
        Self {
            name: name.to_string(),
            phone: phone.to_string(),
            company: "GS동해전력".to_string(),
            position: position.to_string(),
        }
    }
}

fn builtin_approvers() -> Vec<AuthorizedApprover> {
    vec![
        AuthorizedApprover::builtin("황병소", "010-0000-0001", "대표이사"),
        AuthorizedApprover::builtin("권혁만", "010-0000-0002", "발전기술본부장"),
        AuthorizedApprover::builtin("심재춘", "010-0000-0003", "발전처장"),
        AuthorizedApprover::builtin("이승열", "010-0000-0004", "발전팀장"),
        AuthorizedApprover::builtin("윤지수", "010-0000-0005", "발전팀 1파트장"),
        AuthorizedApprover::builtin("곽종만", "010-0000-0006", "발전팀 2파트장"),
        AuthorizedApprover::builtin("임태헌", "010-0000-0007", "발전팀 3파트장"),
        AuthorizedApprover::builtin("이민우", "010-0000-0008", "발전팀 4파트장"),
    ]
}

fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Lookup over the authorized approvers.
#[derive(Debug, Clone)]
pub struct ApproverRegistry {
    approvers: Vec<AuthorizedApprover>,
}

impl ApproverRegistry {
    /// Registry over `approvers`, or the built-in list when none are given.
    pub fn new(approvers: Vec<AuthorizedApprover>) -> Self {
        let approvers = if approvers.is_empty() {
            builtin_approvers()
        } else {
            approvers
        };
        Self { approvers }
    }

    pub fn all(&self) -> &[AuthorizedApprover] {
        &self.approvers
    }

    /// Finds the approver with exactly this name and a matching phone number.
    ///
    /// Phone numbers compare with spaces and dashes removed.
    pub fn verify(&self, name: &str, phone: &str) -> Option<&AuthorizedApprover> {
        let phone = normalize_phone(phone);
        if phone.is_empty() {
            return None;
        }

        self.approvers
            .iter()
            .find(|approver| approver.name == name && normalize_phone(&approver.phone) == phone)
    }
}

impl Default for ApproverRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_is_used_when_empty() {
        let registry = ApproverRegistry::default();
        assert_eq!(registry.all().len(), 8);
        assert!(registry.all().iter().all(|a| a.company == "GS동해전력"));
    }

    #[test]
    fn verify_ignores_phone_formatting() {
        let registry = ApproverRegistry::default();

        let approver = registry.verify("이승열", "01000000004").unwrap();
        assert_eq!(approver.position, "발전팀장");
        assert!(registry.verify("이승열", "010 0000 0004").is_some());
        assert!(registry.verify("이승열", "010-0000-0004").is_some());
    }

    #[test]
    fn verify_requires_name_and_phone_to_match() {
        let registry = ApproverRegistry::default();

        assert!(registry.verify("이승열", "010-0000-0005").is_none());
        assert!(registry.verify("이승 열", "010-0000-0004").is_none());
        assert!(registry.verify("이승열", "").is_none());
    }

    #[test]
    fn configured_list_replaces_builtin() {
        let registry = ApproverRegistry::new(vec![AuthorizedApprover {
            name: "김당직".to_string(),
            phone: "010-9999-0000".to_string(),
            company: "협력사".to_string(),
            position: "당직자".to_string(),
        }]);

        assert_eq!(registry.all().len(), 1);
        assert!(registry.verify("김당직", "01099990000").is_some());
        assert!(registry.verify("황병소", "010-0000-0001").is_none());
    }
}
