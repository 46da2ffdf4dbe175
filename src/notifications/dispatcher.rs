//! Alert fan-out.
//!
//! Gathers recipients and weather, composes one broadcast message, sends it
//! to every recipient concurrently and schedules the personal role/duty
//! follow-ups as a tracked background task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::DispatchConfig;
use crate::models::{Contact, Incident, IncidentKind, WeatherSnapshot};

use super::composer::{MessageComposer, MessageContext};
use super::contacts::ContactDirectory;
use super::sms::{SmsRequest, SmsTransport};
use super::weather::{EvacuationRecommender, WeatherProvider};

/// Escalation contacts used when the directory yields nobody reachable.
const FALLBACK_CONTACTS: [(&str, &str, &str); 3] = [
    ("fb1", "발전파트장", "01012345678"),
    ("fb2", "대표이사", "01023456789"),
    ("fb3", "비상대응팀장", "01034567890"),
];

fn fallback_contacts() -> Vec<Contact> {
    FALLBACK_CONTACTS
        .iter()
        .map(|(id, name, phone)| Contact {
            id: id.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            department: name.to_string(),
            is_active: true,
            emergency_role_description: None,
            emergency_duty: None,
        })
        .collect()
}

/// Result of the primary broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent_count: u32,
    /// Names of recipients whose send was accepted
    pub recipients: Vec<String>,
}

/// Sends incident alerts.
///
/// Implemented by [`NotificationDispatcher`]; the incident service depends on
/// this trait only.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send_incident_alert(&self, incident: &Incident) -> DispatchOutcome;
}

/// External collaborators used by the dispatcher.
#[derive(Clone)]
pub struct DispatchCollaborators {
    pub contacts: Arc<dyn ContactDirectory>,
    pub weather: Arc<dyn WeatherProvider>,
    pub recommender: Arc<dyn EvacuationRecommender>,
    pub transport: Arc<dyn SmsTransport>,
}

pub struct NotificationDispatcher {
    collaborators: DispatchCollaborators,
    composer: Arc<MessageComposer>,
    upstream_timeout: Duration,
    followup_delay: Duration,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl NotificationDispatcher {
    pub fn new(
        collaborators: DispatchCollaborators,
        composer: MessageComposer,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            collaborators,
            composer: Arc::new(composer),
            upstream_timeout: config.upstream_timeout(),
            followup_delay: config.role_followup_delay(),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tracker owning the scheduled follow-up waves.
    pub fn background_tasks(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Cancels follow-up waves that have not started sending and waits for
    /// the rest to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn timeout_ms(&self) -> u64 {
        self.upstream_timeout.as_millis() as u64
    }

    async fn fetch_contacts(&self) -> Vec<Contact> {
        match timeout(
            self.upstream_timeout,
            self.collaborators.contacts.fetch_active_contacts(),
        )
        .await
        {
            Ok(Ok(contacts)) => contacts,
            Ok(Err(err)) => {
                warn!(error = %err, "Contact directory unavailable");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms(), "Contact directory timed out");
                Vec::new()
            }
        }
    }

    async fn fetch_weather(&self) -> Option<WeatherSnapshot> {
        match timeout(
            self.upstream_timeout,
            self.collaborators.weather.current_weather(),
        )
        .await
        {
            Ok(Ok(weather)) => Some(weather),
            Ok(Err(err)) => {
                warn!(error = %err, "Weather unavailable, sending without weather");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms(), "Weather lookup timed out");
                None
            }
        }
    }

    /// Sends `message` to one contact, turning every failure into `false`.
    async fn deliver(&self, contact: &Contact, message: &str) -> bool {
        let request = SmsRequest::text(contact.phone.clone(), message);
        match self.collaborators.transport.send(&request).await {
            Ok(response) if response.success => {
                metrics::counter!("alerting_sms_sent_total").increment(1);
                true
            }
            Ok(response) => {
                metrics::counter!("alerting_sms_failed_total").increment(1);
                warn!(
                    recipient = %contact.name,
                    reason = response.error.as_deref().unwrap_or("unknown"),
                    "Alert rejected by transport"
                );
                false
            }
            Err(err) => {
                metrics::counter!("alerting_sms_failed_total").increment(1);
                warn!(recipient = %contact.name, error = %err, "Alert send failed");
                false
            }
        }
    }

    fn schedule_followups(
        &self,
        incident_id: &str,
        recipients: &[Contact],
        context: MessageContext,
    ) {
        let assigned: Vec<Contact> = recipients
            .iter()
            .filter(|contact| contact.has_assignment())
            .cloned()
            .collect();
        if assigned.is_empty() {
            return;
        }

        let delay = self.followup_delay;
        info!(
            incident_id,
            recipients = assigned.len(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling role follow-up messages"
        );

        let transport = Arc::clone(&self.collaborators.transport);
        let composer = Arc::clone(&self.composer);
        let shutdown = self.shutdown.clone();
        let span = info_span!("role_followup", incident_id = %incident_id);

        self.tracker.spawn(
            async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        warn!(
                            recipients = assigned.len(),
                            "Shutdown before follow-up wave, messages dropped"
                        );
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                for contact in &assigned {
                    let message = composer.role_message(contact, &context);
                    let request = SmsRequest::text(contact.phone.clone(), message);
                    match transport.send(&request).await {
                        Ok(response) if response.success => {
                            metrics::counter!("alerting_followup_sent_total").increment(1);
                        }
                        Ok(response) => error!(
                            recipient = %contact.name,
                            reason = response.error.as_deref().unwrap_or("unknown"),
                            "Follow-up rejected by transport"
                        ),
                        Err(err) => {
                            error!(recipient = %contact.name, error = %err, "Follow-up send failed")
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}

#[async_trait]
impl AlertDispatcher for NotificationDispatcher {
    async fn send_incident_alert(&self, incident: &Incident) -> DispatchOutcome {
        let (contacts, weather) = tokio::join!(self.fetch_contacts(), self.fetch_weather());

        let mut recipients: Vec<Contact> = contacts
            .into_iter()
            .filter(Contact::is_reachable)
            .collect();
        if recipients.is_empty() {
            warn!(incident_id = %incident.id, "No reachable contacts, using fallback list");
            recipients = fallback_contacts();
        }

        let evacuation = weather.as_ref().and_then(|weather| {
            self.collaborators.recommender.recommend(
                incident.alert_level,
                IncidentKind::classify(&incident.incident_type),
                &incident.location,
                weather,
            )
        });

        let context = MessageContext {
            weather,
            evacuation,
            is_training: incident.is_training,
        };
        let message = self.composer.compose(incident, &context);

        info!(
            incident_id = %incident.id,
            alert_level = incident.alert_level.as_str(),
            recipients = recipients.len(),
            has_weather = context.weather.is_some(),
            "Broadcasting incident alert"
        );

        let results = join_all(
            recipients
                .iter()
                .map(|contact| self.deliver(contact, &message)),
        )
        .await;

        let delivered: Vec<String> = recipients
            .iter()
            .zip(results)
            .filter(|(_, ok)| *ok)
            .map(|(contact, _)| contact.name.clone())
            .collect();

        info!(
            incident_id = %incident.id,
            sent = delivered.len(),
            failed = recipients.len() - delivered.len(),
            "Incident alert broadcast finished"
        );

        self.schedule_followups(&incident.id, &recipients, context);

        DispatchOutcome {
            sent_count: delivered.len() as u32,
            recipients: delivered,
        }
    }
}
