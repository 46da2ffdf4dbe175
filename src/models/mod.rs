//! # Data Models
//!
//! This module contains the data models used throughout the alerting service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod contact;
pub mod incident;
pub mod weather;

pub use contact::Contact;
pub use incident::{
    AlarmCriteria, AlertLevel, ApprovalEdits, CreateIncidentRequest, EmergencyResponse,
    HazardousMaterial, Incident, IncidentStatus, ReportDetails, Severity,
};
pub use weather::{EvacuationRecommendation, IncidentKind, WeatherSnapshot};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "emergency-alerting".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
