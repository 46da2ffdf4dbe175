//! In-process fakes of the notification collaborators for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::models::{Contact, WeatherSnapshot};

use super::contacts::ContactDirectory;
use super::sms::{SmsRequest, SmsResponse, SmsTransport};
use super::weather::WeatherProvider;

pub(crate) fn contact(id: &str, name: &str, phone: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        department: String::new(),
        is_active: true,
        emergency_role_description: None,
        emergency_duty: None,
    }
}

/// Records every request; selected phones are rejected or fail outright.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<SmsRequest>>,
    rejected: HashSet<String>,
    erroring: HashSet<String>,
}

impl RecordingTransport {
    pub(crate) fn rejecting(mut self, phone: &str) -> Self {
        self.rejected.insert(phone.to_string());
        self
    }

    pub(crate) fn erroring(mut self, phone: &str) -> Self {
        self.erroring.insert(phone.to_string());
        self
    }

    pub(crate) fn phones(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|r| r.to.clone()).collect()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }
}

#[async_trait]
impl SmsTransport for RecordingTransport {
    async fn send(&self, request: &SmsRequest) -> anyhow::Result<SmsResponse> {
        self.sent.lock().unwrap().push(request.clone());
        if self.erroring.contains(&request.to) {
            return Err(anyhow!("connection reset"));
        }
        if self.rejected.contains(&request.to) {
            return Ok(SmsResponse::rejected("invalid number"));
        }
        Ok(SmsResponse::delivered(Some(format!("M-{}", request.to))))
    }
}

pub(crate) struct UnavailableDirectory;

#[async_trait]
impl ContactDirectory for UnavailableDirectory {
    async fn fetch_active_contacts(&self) -> anyhow::Result<Vec<Contact>> {
        Err(anyhow!("sheet quota exceeded"))
    }
}

pub(crate) struct FixedWeather(Option<WeatherSnapshot>);

impl FixedWeather {
    /// North wind at 5 m/s, 12 °C, dry
    pub(crate) fn sunny() -> Self {
        Self(Some(WeatherSnapshot {
            temperature: 12.0,
            humidity: 50.0,
            wind_speed: 5.0,
            wind_direction: "북".to_string(),
            wind_degree: 0.0,
            precipitation: 0.0,
            visibility: 10.0,
            condition: "맑음".to_string(),
        }))
    }

    pub(crate) fn unavailable() -> Self {
        Self(None)
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn current_weather(&self) -> anyhow::Result<WeatherSnapshot> {
        self.0.clone().ok_or_else(|| anyhow!("observation service down"))
    }
}
