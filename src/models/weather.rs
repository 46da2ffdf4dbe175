//! # Weather & Evacuation Models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current surface observation near the plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Korean compass label of the wind origin, e.g. `북동`
    pub wind_direction: String,
    /// Wind origin in degrees
    pub wind_degree: f64,
    /// Hourly precipitation in mm
    pub precipitation: f64,
    /// Visibility in km
    pub visibility: f64,
    pub condition: String,
}

/// Coarse incident class used for evacuation planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Leak,
    FireExplosion,
}

impl IncidentKind {
    /// Leaks are recognised by the `누출` keyword; everything else is treated
    /// as fire or explosion.
    pub fn classify(incident_type: &str) -> Self {
        if incident_type.contains("누출") {
            IncidentKind::Leak
        } else {
            IncidentKind::FireExplosion
        }
    }
}

/// Recommended shelter for the current incident and weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvacuationRecommendation {
    pub primary_site: String,
    pub alternative_sites: Vec<String>,
    pub route: String,
    pub estimated_minutes: u32,
    pub special_instructions: String,
}
