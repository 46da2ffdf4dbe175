//! Incident lifecycle
//!
//! `pending_approval -> active -> resolved`. Reporting classifies the incident,
//! approval optionally broadcasts it, and completion or training-end closes it.
//! All mutations of one incident are serialized; different incidents never
//! contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, instrument, warn};
use uuid::Uuid;

use crate::alerts::determine_alert_level;
use crate::error::IncidentError;
use crate::models::{ApprovalEdits, CreateIncidentRequest, Incident, IncidentStatus};
use crate::notifications::AlertDispatcher;
use crate::repositories::IncidentRepository;

/// Per-incident async locks, dropped once nobody holds them.
#[derive(Default)]
struct IncidentLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IncidentLocks {
    /// Waits for exclusive access to `id`. The map entry goes away with the
    /// last lease, also when the waiting future is dropped.
    async fn acquire(self: &Arc<Self>, id: &str) -> IncidentLease {
        let mut lease = IncidentLease {
            locks: Arc::clone(self),
            id: id.to_string(),
            guard: None,
        };
        let lock = self.entry(id);
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    fn entry(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    fn release(&self, id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

/// Exclusive hold on one incident id.
struct IncidentLease {
    locks: Arc<IncidentLocks>,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IncidentLease {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.id);
    }
}

fn require(value: &str, field: &str) -> Result<(), IncidentError> {
    if value.trim().is_empty() {
        return Err(IncidentError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn generate_incident_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("INC-{}-{}", now.timestamp_millis(), &suffix[..8])
}

fn expect_status(
    incident: &Incident,
    expected: IncidentStatus,
    action: &'static str,
) -> Result<(), IncidentError> {
    if incident.status != expected {
        return Err(IncidentError::InvalidTransition {
            id: incident.id.clone(),
            from: incident.status,
            action,
        });
    }
    Ok(())
}

/// Applies approver corrections. An explicit level wins; edited criteria
/// without one re-derive the level from the reported severity.
fn apply_edits(incident: &mut Incident, edits: ApprovalEdits) {
    if let Some(location) = edits.location {
        incident.location = location;
    }
    if let Some(incident_type) = edits.incident_type {
        incident.incident_type = incident_type;
    }
    if let Some(description) = edits.description {
        incident.description = description;
    }
    if let Some(criteria) = edits.alarm_criteria {
        if edits.alert_level.is_none() {
            incident.alert_level =
                determine_alert_level(incident.reported_severity(), Some(&criteria));
        }
        incident.alarm_criteria = Some(criteria);
    }
    if let Some(level) = edits.alert_level {
        incident.alert_level = level;
    }
    if edits.selected_chemical.is_some() {
        incident.selected_chemical = edits.selected_chemical;
    }
    if edits.custom_chemical_name.is_some() {
        incident.custom_chemical_name = edits.custom_chemical_name;
    }
    if edits.custom_alert_message.is_some() {
        incident.custom_alert_message = edits.custom_alert_message;
    }
    if edits.is_message_modified.is_some() {
        incident.is_message_modified = edits.is_message_modified;
    }
    if edits.is_limited_test.is_some() {
        incident.is_limited_test = edits.is_limited_test;
    }
}

async fn approve_transition(
    mut incident: Incident,
    dispatcher: &dyn AlertDispatcher,
    approver_name: &str,
    edits: ApprovalEdits,
) -> Result<Incident, IncidentError> {
    expect_status(&incident, IncidentStatus::PendingApproval, "approved")?;

    let now = Utc::now();
    if !edits.is_empty() {
        incident.reviewed_by = Some(approver_name.to_string());
        incident.reviewed_at = Some(now);
    }
    apply_edits(&mut incident, edits);
    incident.status = IncidentStatus::Active;
    incident.approved_by = Some(approver_name.to_string());
    incident.approved_at = Some(now);

    if incident.alert_level.requires_broadcast() {
        let outcome = dispatcher.send_incident_alert(&incident).await;
        if outcome.sent_count == 0 {
            warn!(
                alert_level = incident.alert_level.as_str(),
                "Broadcast reached nobody"
            );
        }
        incident.notifications_sent = outcome.sent_count;
        incident.contacts_notified = outcome.recipients;
    } else {
        incident.notifications_sent = 0;
        incident.contacts_notified = Vec::new();
    }

    info!(
        approved_by = approver_name,
        alert_level = incident.alert_level.as_str(),
        notifications_sent = incident.notifications_sent,
        "Incident approved"
    );
    Ok(incident)
}

/// Read-modify-write of one incident under its lock. Nothing is stored when
/// `change` fails.
async fn mutate_incident<F, Fut>(
    repository: &dyn IncidentRepository,
    locks: &Arc<IncidentLocks>,
    id: &str,
    change: F,
) -> Result<Incident, IncidentError>
where
    F: FnOnce(Incident) -> Fut,
    Fut: Future<Output = Result<Incident, IncidentError>>,
{
    let _lease = locks.acquire(id).await;

    let current = repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| IncidentError::NotFound(id.to_string()))?;

    let updated = change(current).await?;

    repository
        .update(id, updated)
        .await?
        .ok_or_else(|| IncidentError::NotFound(id.to_string()))
}

/// Owns every mutation of incident records.
pub struct IncidentService {
    repository: Arc<dyn IncidentRepository>,
    dispatcher: Arc<dyn AlertDispatcher>,
    locks: Arc<IncidentLocks>,
    tasks: TaskTracker,
}

impl IncidentService {
    pub fn new(repository: Arc<dyn IncidentRepository>, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        Self {
            repository,
            dispatcher,
            locks: Arc::default(),
            tasks: TaskTracker::new(),
        }
    }

    /// Waits for approvals still in flight to be stored.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    pub async fn get_all_incidents(&self) -> Result<Vec<Incident>, IncidentError> {
        Ok(self.repository.find_all().await?)
    }

    pub async fn get_incident_by_id(&self, id: &str) -> Result<Option<Incident>, IncidentError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Classifies and stores a new pending incident. Nothing is sent.
    #[instrument(skip_all, fields(location = %request.location))]
    pub async fn report_incident(
        &self,
        request: CreateIncidentRequest,
    ) -> Result<Incident, IncidentError> {
        require(&request.location, "location")?;
        require(&request.incident_type, "type")?;
        require(&request.reported_by, "reportedBy")?;

        let now = Utc::now();
        let reported_at = request.reported_at.filter(|at| *at <= now).unwrap_or(now);
        let severity = request
            .report_details
            .as_ref()
            .map(|details| details.severity)
            .unwrap_or_default();
        let alert_level = determine_alert_level(severity, request.alarm_criteria.as_ref());

        let incident = Incident::from_report(
            generate_incident_id(now),
            request,
            alert_level,
            reported_at,
        );
        let stored = self.repository.create(incident).await?;

        info!(
            incident_id = %stored.id,
            alert_level = stored.alert_level.as_str(),
            is_training = stored.is_training,
            "Incident reported"
        );
        Ok(stored)
    }

    /// Approves a pending incident, applying `edits` first. Yellow and red
    /// incidents are broadcast before the record is stored. The approval runs
    /// as a tracked task, so its outcome is stored even if the caller is
    /// dropped mid-broadcast.
    #[instrument(skip_all, fields(incident_id = %id))]
    pub async fn approve_incident(
        &self,
        id: &str,
        approver_name: &str,
        edits: ApprovalEdits,
    ) -> Result<Incident, IncidentError> {
        require(approver_name, "approverName")?;

        let repository = Arc::clone(&self.repository);
        let dispatcher = Arc::clone(&self.dispatcher);
        let locks = Arc::clone(&self.locks);
        let id = id.to_string();
        let approver_name = approver_name.to_string();

        let approval = self.tasks.spawn(
            async move {
                mutate_incident(repository.as_ref(), &locks, &id, |incident| {
                    approve_transition(incident, dispatcher.as_ref(), &approver_name, edits)
                })
                .await
            }
            .in_current_span(),
        );

        approval
            .await
            .map_err(|err| IncidentError::Interrupted(err.to_string()))?
    }

    /// Records the response taken and resolves an active incident.
    #[instrument(skip_all, fields(incident_id = %id))]
    pub async fn complete_action(
        &self,
        id: &str,
        details: &str,
        completed_by: &str,
    ) -> Result<Incident, IncidentError> {
        require(details, "actionDetails")?;
        require(completed_by, "completedBy")?;

        self.mutate(id, |mut incident| async move {
            expect_status(&incident, IncidentStatus::Active, "completed")?;

            incident.action_completed = Some(true);
            incident.action_details = Some(details.to_string());
            incident.action_completed_by = Some(completed_by.to_string());
            incident.action_completed_at = Some(Utc::now());
            incident.status = IncidentStatus::Resolved;

            info!(completed_by, "Incident action completed");
            Ok(incident)
        })
        .await
    }

    /// Ends an active training incident.
    #[instrument(skip_all, fields(incident_id = %id))]
    pub async fn end_training(&self, id: &str, ended_by: &str) -> Result<Incident, IncidentError> {
        require(ended_by, "endedBy")?;

        self.mutate(id, |mut incident| async move {
            if !incident.is_training {
                return Err(IncidentError::NotTraining(incident.id));
            }
            expect_status(&incident, IncidentStatus::Active, "ended")?;

            incident.training_ended_by = Some(ended_by.to_string());
            incident.training_ended_at = Some(Utc::now());
            incident.status = IncidentStatus::Resolved;

            info!(ended_by, "Training ended");
            Ok(incident)
        })
        .await
    }

    /// Removes an incident in any state. Returns whether it existed.
    #[instrument(skip_all, fields(incident_id = %id))]
    pub async fn delete_incident(&self, id: &str) -> Result<bool, IncidentError> {
        let deleted = {
            let _lease = self.locks.acquire(id).await;
            self.repository.delete(id).await?
        };
        if deleted {
            info!("Incident deleted");
        }
        Ok(deleted)
    }

    async fn mutate<F, Fut>(&self, id: &str, change: F) -> Result<Incident, IncidentError>
    where
        F: FnOnce(Incident) -> Fut,
        Fut: Future<Output = Result<Incident, IncidentError>>,
    {
        mutate_incident(self.repository.as_ref(), &self.locks, id, change).await
    }
}
