//! Incident repository
//!
//! Defines the [`IncidentRepository`] contract used by the incident service and
//! a process-local in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::models::Incident;

/// Storage contract for incident records.
///
/// Unknown ids are reported as `Ok(None)` / `Ok(false)`, never as errors.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// All incidents, newest `reported_at` first
    async fn find_all(&self) -> Result<Vec<Incident>, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, RepositoryError>;

    /// Stores a new incident, failing with `Conflict` if the id is taken
    async fn create(&self, incident: Incident) -> Result<Incident, RepositoryError>;

    /// Replaces the stored record for `id` with `incident`.
    ///
    /// The stored `id` and `reported_at` are kept regardless of what the
    /// replacement carries. Returns `None` if no record exists.
    async fn update(&self, id: &str, incident: Incident)
    -> Result<Option<Incident>, RepositoryError>;

    /// Removes the record, returning whether one existed
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;
}

/// Single-process incident store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryIncidentRepository {
    incidents: RwLock<HashMap<String, Incident>>,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn find_all(&self) -> Result<Vec<Incident>, RepositoryError> {
        let incidents = self.incidents.read().await;
        let mut all: Vec<Incident> = incidents.values().cloned().collect();
        all.sort_by(|a, b| b.reported_at.cmp(&a.reported_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Incident>, RepositoryError> {
        Ok(self.incidents.read().await.get(id).cloned())
    }

    async fn create(&self, incident: Incident) -> Result<Incident, RepositoryError> {
        let mut incidents = self.incidents.write().await;
        if incidents.contains_key(&incident.id) {
            return Err(RepositoryError::Conflict(incident.id));
        }
        incidents.insert(incident.id.clone(), incident.clone());
        Ok(incident)
    }

    async fn update(
        &self,
        id: &str,
        mut incident: Incident,
    ) -> Result<Option<Incident>, RepositoryError> {
        let mut incidents = self.incidents.write().await;
        let Some(stored) = incidents.get_mut(id) else {
            return Ok(None);
        };

        incident.id = stored.id.clone();
        incident.reported_at = stored.reported_at;
        *stored = incident;
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.incidents.write().await.remove(id).is_some())
    }
}
