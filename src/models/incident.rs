//! # Incident Model
//!
//! The incident record carried through the report, approval and resolution
//! lifecycle, together with the request payloads that create and edit it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Alert level assigned to an incident, ordered by increasing severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    White,
    Blue,
    Yellow,
    Red,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::White => "white",
            AlertLevel::Blue => "blue",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Red => "red",
        }
    }

    /// Whether an approved incident at this level is broadcast to contacts.
    pub fn requires_broadcast(&self) -> bool {
        matches!(self, AlertLevel::Yellow | AlertLevel::Red)
    }
}

/// Lifecycle status. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    PendingApproval,
    Active,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::PendingApproval => "pending_approval",
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

/// Reporter-assessed severity, used when no alarm criteria are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Minor,
    Moderate,
    Major,
    Critical,
}

/// Hazardous materials stored on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HazardousMaterial {
    Ammonia,
    HydrochloricAcid,
    ByproductFuelOil,
    Hydrogen,
}

/// Structured alarm criteria filled in by the reporter.
///
/// Values are free-text categories. Unknown or missing values are kept as-is
/// (or empty) and score zero in the classifier. The self-response field is
/// accepted under both `selfResponse` and `self-response`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlarmCriteria {
    /// Incident scope, e.g. `사업장 내부` or `사업장 외부`
    #[serde(default)]
    pub scope: String,
    /// Whether staff can contain the incident themselves
    #[serde(default, alias = "self-response")]
    pub self_response: String,
    /// Whether there are casualties
    #[serde(default)]
    pub casualties: String,
    /// Whether residents need to evacuate
    #[serde(default)]
    pub evacuation: String,
}

/// Reporter contact details captured by the report form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    #[serde(default)]
    pub reporter_name: String,
    #[serde(default)]
    pub reporter_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_company: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub timestamp: String,
}

/// Descriptive emergency response plan attached to an incident.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyResponse {
    #[serde(default)]
    pub command_center: String,
    #[serde(default)]
    pub evacuation_route: String,
    #[serde(default)]
    pub affected_radius: String,
    #[serde(default)]
    pub equipment_used: Vec<String>,
    #[serde(default)]
    pub external_agencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_teams: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_resolution_time: Option<String>,
}

/// A reported incident and its accumulated lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub location: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazardous_material: Option<HazardousMaterial>,
    pub description: String,
    pub reported_at: DateTime<Utc>,
    pub reported_by: String,
    pub status: IncidentStatus,
    pub alert_level: AlertLevel,
    #[serde(default)]
    pub notifications_sent: u32,
    #[serde(default)]
    pub contacts_notified: Vec<String>,
    #[serde(default)]
    pub evacuation_required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_damage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_response: Option<EmergencyResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_details: Option<ReportDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_criteria: Option<AlarmCriteria>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_limited_test: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_alert_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_message_modified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_chemical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_chemical_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_training: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_ended_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_ended_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// A fresh, pending incident built from a report.
    pub fn from_report(
        id: String,
        request: CreateIncidentRequest,
        alert_level: AlertLevel,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            location: request.location,
            incident_type: request.incident_type,
            hazardous_material: request.hazardous_material,
            description: request.description,
            reported_at,
            reported_by: request.reported_by,
            status: IncidentStatus::PendingApproval,
            alert_level,
            notifications_sent: 0,
            contacts_notified: Vec::new(),
            evacuation_required: request.evacuation_required,
            affected_area: request.affected_area,
            estimated_damage: request.estimated_damage,
            recovery_time: request.recovery_time,
            emergency_response: request.emergency_response,
            report_details: request.report_details,
            alarm_criteria: request.alarm_criteria,
            approved_by: None,
            approved_at: None,
            is_limited_test: request.is_limited_test,
            custom_alert_message: request.custom_alert_message,
            is_message_modified: request.is_message_modified,
            reviewed_by: None,
            reviewed_at: None,
            selected_chemical: request.selected_chemical,
            custom_chemical_name: request.custom_chemical_name,
            action_completed: None,
            action_details: None,
            action_completed_by: None,
            action_completed_at: None,
            is_training: request.is_training,
            training_ended_by: None,
            training_ended_at: None,
        }
    }

    /// Severity recorded on the original report, `minor` when absent.
    pub fn reported_severity(&self) -> Severity {
        self.report_details
            .as_ref()
            .map(|details| details.severity)
            .unwrap_or_default()
    }
}

/// Payload for reporting a new incident.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentRequest {
    pub location: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    #[serde(default)]
    pub hazardous_material: Option<HazardousMaterial>,
    #[serde(default)]
    pub description: String,
    /// Optional time of occurrence; defaults to the time of the report
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
    pub reported_by: String,
    #[serde(default)]
    pub evacuation_required: bool,
    #[serde(default)]
    pub affected_area: Option<String>,
    #[serde(default)]
    pub estimated_damage: Option<String>,
    #[serde(default)]
    pub recovery_time: Option<String>,
    #[serde(default)]
    pub emergency_response: Option<EmergencyResponse>,
    #[serde(default)]
    pub report_details: Option<ReportDetails>,
    #[serde(default)]
    pub alarm_criteria: Option<AlarmCriteria>,
    #[serde(default)]
    pub is_limited_test: Option<bool>,
    #[serde(default)]
    pub custom_alert_message: Option<String>,
    #[serde(default)]
    pub is_message_modified: Option<bool>,
    #[serde(default)]
    pub selected_chemical: Option<String>,
    #[serde(default)]
    pub custom_chemical_name: Option<String>,
    #[serde(default)]
    pub is_training: bool,
}

/// Corrections an approver may apply before the incident is broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEdits {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "type")]
    pub incident_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub alarm_criteria: Option<AlarmCriteria>,
    /// Explicit level override; wins over a level derived from edited criteria
    #[serde(default)]
    pub alert_level: Option<AlertLevel>,
    #[serde(default)]
    pub selected_chemical: Option<String>,
    #[serde(default)]
    pub custom_chemical_name: Option<String>,
    #[serde(default)]
    pub custom_alert_message: Option<String>,
    #[serde(default)]
    pub is_message_modified: Option<bool>,
    #[serde(default)]
    pub is_limited_test: Option<bool>,
}

impl ApprovalEdits {
    pub fn is_empty(&self) -> bool {
        self == &ApprovalEdits::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_levels_order_by_severity() {
        assert!(AlertLevel::White < AlertLevel::Blue);
        assert!(AlertLevel::Blue < AlertLevel::Yellow);
        assert!(AlertLevel::Yellow < AlertLevel::Red);
        assert!(!AlertLevel::Blue.requires_broadcast());
        assert!(AlertLevel::Yellow.requires_broadcast());
    }

    #[test]
    fn alarm_criteria_accepts_hyphenated_self_response() {
        let criteria: AlarmCriteria = serde_json::from_value(json!({
            "scope": "사업장 외부",
            "self-response": "불가능",
            "casualties": "있음",
            "evacuation": "필요",
        }))
        .unwrap();

        assert_eq!(criteria.self_response, "불가능");

        let serialized = serde_json::to_value(&criteria).unwrap();
        assert_eq!(serialized["selfResponse"], "불가능");
    }

    #[test]
    fn alarm_criteria_missing_fields_default_to_empty() {
        let criteria: AlarmCriteria = serde_json::from_value(json!({ "scope": "기타" })).unwrap();
        assert_eq!(criteria.scope, "기타");
        assert!(criteria.self_response.is_empty());
        assert!(criteria.casualties.is_empty());
    }

    #[test]
    fn create_request_uses_type_key() {
        let request: CreateIncidentRequest = serde_json::from_value(json!({
            "location": "암모니아 저장 탱크",
            "type": "유해물질 누출",
            "reportedBy": "김다혜",
            "hazardousMaterial": "ammonia",
            "reportDetails": { "reporterName": "김다혜", "severity": "major" }
        }))
        .unwrap();

        assert_eq!(request.incident_type, "유해물질 누출");
        assert_eq!(request.hazardous_material, Some(HazardousMaterial::Ammonia));
        assert_eq!(
            request.report_details.map(|d| d.severity),
            Some(Severity::Major)
        );
        assert!(!request.is_training);
    }

    #[test]
    fn approval_edits_emptiness() {
        assert!(ApprovalEdits::default().is_empty());
        let edits = ApprovalEdits {
            location: Some("2호기 터빈건물".to_string()),
            ..Default::default()
        };
        assert!(!edits.is_empty());
    }
}
