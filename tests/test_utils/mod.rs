//! Test utilities shared by the integration tests.
//!
//! In-process fakes of the notification collaborators plus builders for
//! services wired around them.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use alerting::config::DispatchConfig;
use alerting::models::{AlarmCriteria, Contact, CreateIncidentRequest, WeatherSnapshot};
use alerting::notifications::{
    DispatchCollaborators, LayoutDirectory, MessageComposer, NotificationDispatcher,
    SiteScoringRecommender, SmsRequest, SmsResponse, SmsTransport, StaticContactDirectory,
    WeatherProvider,
};
use alerting::repositories::InMemoryIncidentRepository;
use alerting::services::IncidentService;
use anyhow::anyhow;
use async_trait::async_trait;

/// Records every message; listed phones are rejected by the "provider".
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SmsRequest>>,
    rejected: HashSet<String>,
}

impl RecordingTransport {
    pub fn rejecting(phones: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            rejected: phones.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<SmsRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, phone: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|request| request.to == phone)
            .map(|request| request.message)
            .collect()
    }
}

#[async_trait]
impl SmsTransport for RecordingTransport {
    async fn send(&self, request: &SmsRequest) -> anyhow::Result<SmsResponse> {
        self.sent.lock().unwrap().push(request.clone());
        if self.rejected.contains(&request.to) {
            return Ok(SmsResponse::rejected("수신 거부"));
        }
        Ok(SmsResponse::delivered(None))
    }
}

/// Weather source that is either fixed or down.
pub struct StubWeather(pub Option<WeatherSnapshot>);

impl StubWeather {
    pub fn calm_north_wind() -> Self {
        Self(Some(WeatherSnapshot {
            temperature: 8.5,
            humidity: 60.0,
            wind_speed: 3.0,
            wind_direction: "북".to_string(),
            wind_degree: 0.0,
            precipitation: 0.0,
            visibility: 15.0,
            condition: "맑음".to_string(),
        }))
    }
}

#[async_trait]
impl WeatherProvider for StubWeather {
    async fn current_weather(&self) -> anyhow::Result<WeatherSnapshot> {
        self.0.clone().ok_or_else(|| anyhow!("KMA unavailable"))
    }
}

pub fn employee(id: &str, name: &str, phone: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        department: "발전팀".to_string(),
        is_active: true,
        emergency_role_description: None,
        emergency_duty: None,
    }
}

pub fn with_role(mut contact: Contact, role: &str, duty: &str) -> Contact {
    contact.emergency_role_description = Some(role.to_string());
    contact.emergency_duty = Some(duty.to_string());
    contact
}

pub fn criteria(scope: &str, self_response: &str, casualties: &str, evacuation: &str) -> AlarmCriteria {
    AlarmCriteria {
        scope: scope.to_string(),
        self_response: self_response.to_string(),
        casualties: casualties.to_string(),
        evacuation: evacuation.to_string(),
    }
}

pub fn leak_report(criteria: AlarmCriteria) -> CreateIncidentRequest {
    CreateIncidentRequest {
        location: "암모니아 저장 탱크".to_string(),
        incident_type: "유해물질 누출".to_string(),
        description: "배관 플랜지 누출".to_string(),
        reported_by: "김다혜".to_string(),
        alarm_criteria: Some(criteria),
        ..Default::default()
    }
}

/// Service wired to a real dispatcher over the given fakes.
pub fn service_with(
    contacts: Vec<Contact>,
    weather: StubWeather,
    transport: Arc<RecordingTransport>,
    followup_delay_ms: u64,
) -> (IncidentService, Arc<NotificationDispatcher>) {
    let config = DispatchConfig {
        role_followup_delay_ms: followup_delay_ms,
        ..Default::default()
    };
    let dispatcher = Arc::new(NotificationDispatcher::new(
        DispatchCollaborators {
            contacts: Arc::new(StaticContactDirectory::new(contacts)),
            weather: Arc::new(weather),
            recommender: Arc::new(SiteScoringRecommender),
            transport,
        },
        MessageComposer::new("GS동해전력", "033-820-1411", LayoutDirectory::default()),
        &config,
    ));
    let service = IncidentService::new(
        Arc::new(InMemoryIncidentRepository::new()),
        dispatcher.clone(),
    );
    (service, dispatcher)
}
