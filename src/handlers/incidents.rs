//! # Incident API Handlers
//!
//! Report, approve, resolve and delete incidents.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use utoipa::ToSchema;

use crate::approvers::AuthorizedApprover;
use crate::error::{ApiError, forbidden, validation_error};
use crate::models::{ApprovalEdits, CreateIncidentRequest, Incident};
use crate::server::AppState;

/// A single incident with an outcome message
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IncidentResponse {
    pub success: bool,
    pub incident: Incident,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// All stored incidents, newest first
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IncidentListResponse {
    pub success: bool,
    pub incidents: Vec<Incident>,
    pub message: String,
}

/// Approval request. The approver must be on the authorized list.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveIncidentRequest {
    #[serde(default)]
    pub approver_name: String,
    #[serde(default)]
    pub approver_phone: String,
    /// Corrections applied before the alert is broadcast
    #[serde(default)]
    pub modified_incident: ModifiedIncident,
    #[serde(default)]
    pub custom_alert_message: Option<String>,
    #[serde(default)]
    pub is_message_modified: Option<bool>,
    #[serde(default)]
    pub is_limited_test: Option<bool>,
}

/// Approval edits as sent by the review dialog. The chemical may arrive under
/// both the current keys and the older `chemicalType`/`otherChemicalName`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedIncident {
    #[serde(flatten)]
    pub edits: ApprovalEdits,
    #[serde(default)]
    pub chemical_type: Option<String>,
    #[serde(default)]
    pub other_chemical_name: Option<String>,
}

fn first_non_empty(current: Option<String>, legacy: Option<String>) -> Option<String> {
    current
        .into_iter()
        .chain(legacy)
        .find(|value| !value.trim().is_empty())
}

impl ApproveIncidentRequest {
    fn into_edits(self) -> ApprovalEdits {
        let ModifiedIncident {
            mut edits,
            chemical_type,
            other_chemical_name,
        } = self.modified_incident;
        edits.selected_chemical = first_non_empty(edits.selected_chemical, chemical_type);
        edits.custom_chemical_name =
            first_non_empty(edits.custom_chemical_name, other_chemical_name);

        if self.custom_alert_message.is_some() {
            edits.custom_alert_message = self.custom_alert_message;
        }
        if self.is_message_modified.is_some() {
            edits.is_message_modified = self.is_message_modified;
        }
        if self.is_limited_test.is_some() {
            edits.is_limited_test = self.is_limited_test;
        }
        edits
    }
}

/// Approval outcome, including whether any SMS went out
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveIncidentResponse {
    pub success: bool,
    pub incident: Incident,
    pub sms_sent: bool,
    pub message: String,
}

/// Identifies the authorized approver deleting an incident
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteIncidentRequest {
    #[serde(default)]
    pub approver_name: String,
    #[serde(default)]
    pub approver_phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteIncidentResponse {
    pub success: bool,
    pub message: String,
    pub deleted_incident: Incident,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteActionRequest {
    #[serde(default)]
    pub action_details: String,
    #[serde(default)]
    pub completed_by: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndTrainingRequest {
    #[serde(default)]
    pub ended_by: String,
}

fn incident_not_found(id: &str) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("Incident {} not found", id),
    )
}

fn authorize(state: &AppState, name: &str, phone: &str) -> Result<AuthorizedApprover, ApiError> {
    if name.trim().is_empty() || phone.trim().is_empty() {
        return Err(validation_error(
            "Approver name and phone are required",
            json!({ "fields": ["approverName", "approverPhone"] }),
        ));
    }

    state.approvers.verify(name, phone).cloned().ok_or_else(|| {
        warn!(approver = name, "Rejected unauthorized approver");
        forbidden(Some("Approver is not authorized"))
    })
}

fn approval_message(approver: &AuthorizedApprover, incident: &Incident) -> String {
    let mut message = format!("{} {}님이 승인하였습니다.", approver.name, approver.position);
    if incident.is_training {
        message.push_str(" (훈련 상황)");
    }
    if incident.notifications_sent > 0 {
        message.push_str(&format!(
            " {}명에게 SMS가 발송되었습니다.",
            incident.notifications_sent
        ));
    } else {
        message.push_str(" SMS 발송이 생략되었습니다.");
    }
    message
}

/// Lists every stored incident
#[utoipa::path(
    get,
    path = "/incidents",
    responses(
        (status = 200, description = "Stored incidents, newest first", body = IncidentListResponse),
        (status = 500, description = "Storage failure", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn list_incidents(
    State(state): State<AppState>,
) -> Result<Json<IncidentListResponse>, ApiError> {
    let incidents = state.service.get_all_incidents().await?;
    let message = if incidents.is_empty() {
        "저장된 사고가 없습니다.".to_string()
    } else {
        format!("{}건의 사고가 조회되었습니다.", incidents.len())
    };

    Ok(Json(IncidentListResponse {
        success: true,
        incidents,
        message,
    }))
}

/// Reports a new incident. It waits for approval before anything is sent.
#[utoipa::path(
    post,
    path = "/incidents",
    request_body = CreateIncidentRequest,
    responses(
        (status = 201, description = "Incident recorded as pending approval", body = IncidentResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn report_incident(
    State(state): State<AppState>,
    body: Result<Json<CreateIncidentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IncidentResponse>), ApiError> {
    let Json(request) = body?;
    let incident = state.service.report_incident(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(IncidentResponse {
            success: true,
            message: Some(format!("사고가 접수되었습니다. 승인 대기 중입니다. ({})", incident.id)),
            incident,
        }),
    ))
}

/// Fetches one incident
#[utoipa::path(
    get,
    path = "/incidents/{id}",
    params(("id" = String, Path, description = "Incident identifier")),
    responses(
        (status = 200, description = "Incident found", body = IncidentResponse),
        (status = 404, description = "Unknown incident", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IncidentResponse>, ApiError> {
    let incident = state
        .service
        .get_incident_by_id(&id)
        .await?
        .ok_or_else(|| incident_not_found(&id))?;

    Ok(Json(IncidentResponse {
        success: true,
        incident,
        message: None,
    }))
}

/// Deletes an incident in any state. Requires an authorized approver.
#[utoipa::path(
    delete,
    path = "/incidents/{id}",
    params(("id" = String, Path, description = "Incident identifier")),
    request_body = DeleteIncidentRequest,
    responses(
        (status = 200, description = "Incident deleted", body = DeleteIncidentResponse),
        (status = 400, description = "Missing approver details", body = ApiError),
        (status = 403, description = "Approver not authorized", body = ApiError),
        (status = 404, description = "Unknown incident", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<DeleteIncidentRequest>, JsonRejection>,
) -> Result<Json<DeleteIncidentResponse>, ApiError> {
    let Json(request) = body?;
    let approver = authorize(&state, &request.approver_name, &request.approver_phone)?;

    let incident = state
        .service
        .get_incident_by_id(&id)
        .await?
        .ok_or_else(|| incident_not_found(&id))?;

    if !state.service.delete_incident(&id).await? {
        return Err(incident_not_found(&id));
    }

    Ok(Json(DeleteIncidentResponse {
        success: true,
        message: format!(
            "{} {}님이 사고를 삭제했습니다.",
            approver.name, approver.position
        ),
        deleted_incident: incident,
    }))
}

/// Approves a pending incident and broadcasts yellow and red alerts
#[utoipa::path(
    post,
    path = "/incidents/{id}/approve",
    params(("id" = String, Path, description = "Incident identifier")),
    request_body = ApproveIncidentRequest,
    responses(
        (status = 200, description = "Incident approved", body = ApproveIncidentResponse),
        (status = 400, description = "Missing approver details", body = ApiError),
        (status = 403, description = "Approver not authorized", body = ApiError),
        (status = 404, description = "Unknown incident", body = ApiError),
        (status = 409, description = "Incident is not pending approval", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn approve_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ApproveIncidentRequest>, JsonRejection>,
) -> Result<Json<ApproveIncidentResponse>, ApiError> {
    let Json(request) = body?;
    let approver = authorize(&state, &request.approver_name, &request.approver_phone)?;

    let incident = state
        .service
        .approve_incident(&id, &approver.name, request.into_edits())
        .await?;

    Ok(Json(ApproveIncidentResponse {
        success: true,
        sms_sent: incident.notifications_sent > 0,
        message: approval_message(&approver, &incident),
        incident,
    }))
}

/// Records the response taken and resolves an active incident
#[utoipa::path(
    post,
    path = "/incidents/{id}/complete-action",
    params(("id" = String, Path, description = "Incident identifier")),
    request_body = CompleteActionRequest,
    responses(
        (status = 200, description = "Incident resolved", body = IncidentResponse),
        (status = 400, description = "Missing details", body = ApiError),
        (status = 404, description = "Unknown incident", body = ApiError),
        (status = 409, description = "Incident is not active", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn complete_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CompleteActionRequest>, JsonRejection>,
) -> Result<Json<IncidentResponse>, ApiError> {
    let Json(request) = body?;
    let incident = state
        .service
        .complete_action(&id, &request.action_details, &request.completed_by)
        .await?;

    Ok(Json(IncidentResponse {
        success: true,
        incident,
        message: Some("조치가 완료되었습니다.".to_string()),
    }))
}

/// Ends an active training incident
#[utoipa::path(
    post,
    path = "/incidents/{id}/end-training",
    params(("id" = String, Path, description = "Incident identifier")),
    request_body = EndTrainingRequest,
    responses(
        (status = 200, description = "Training ended", body = IncidentResponse),
        (status = 400, description = "Missing endedBy", body = ApiError),
        (status = 404, description = "Unknown incident", body = ApiError),
        (status = 409, description = "Not an active training incident", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn end_training(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EndTrainingRequest>, JsonRejection>,
) -> Result<Json<IncidentResponse>, ApiError> {
    let Json(request) = body?;
    let incident = state.service.end_training(&id, &request.ended_by).await?;

    Ok(Json(IncidentResponse {
        success: true,
        incident,
        message: Some("훈련이 종료되었습니다.".to_string()),
    }))
}
