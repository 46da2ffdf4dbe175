//! Alert message composition.
//!
//! A broadcast message is the blank-line-joined output of an ordered list of
//! part builders. Each part either renders a block of text or opts out.

use chrono::{Duration, NaiveDateTime};

use crate::models::{AlertLevel, Contact, EvacuationRecommendation, Incident, WeatherSnapshot};

use super::lookups::{LayoutDirectory, chemical_manual_url};

const TRAINING_PREFIX: &str = "[훈련 상황] ";
const UNASSIGNED: &str = "미지정";
const PART_SEPARATOR: &str = "\n\n";

/// Plant-local time (KST) is UTC+9 with no daylight saving.
const LOCAL_OFFSET_HOURS: i64 = 9;

/// Weather and evacuation data gathered for one dispatch.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub weather: Option<WeatherSnapshot>,
    pub evacuation: Option<EvacuationRecommendation>,
    pub is_training: bool,
}

/// One section of the broadcast message.
pub type MessagePart = fn(&MessageComposer, &Incident, &MessageContext) -> Option<String>;

/// Sections of the broadcast alert, in order.
pub const ALERT_PARTS: [MessagePart; 5] = [
    header_part,
    basic_info_part,
    weather_part,
    evacuation_part,
    footer_part,
];

/// Localized display label for an alert level.
pub fn alert_level_label(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::White => "백색경보",
        AlertLevel::Blue => "청색경보",
        AlertLevel::Yellow => "황색경보",
        AlertLevel::Red => "적색경보",
    }
}

/// Builds alert texts for an organisation.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    org_name: String,
    emergency_room_phone: String,
    layouts: LayoutDirectory,
}

impl MessageComposer {
    pub fn new(
        org_name: impl Into<String>,
        emergency_room_phone: impl Into<String>,
        layouts: LayoutDirectory,
    ) -> Self {
        Self {
            org_name: org_name.into(),
            emergency_room_phone: emergency_room_phone.into(),
            layouts,
        }
    }

    /// Broadcast message built from [`ALERT_PARTS`].
    pub fn compose(&self, incident: &Incident, context: &MessageContext) -> String {
        self.compose_with(&ALERT_PARTS, incident, context)
    }

    /// Joins the non-empty output of `parts` with blank lines.
    pub fn compose_with(
        &self,
        parts: &[MessagePart],
        incident: &Incident,
        context: &MessageContext,
    ) -> String {
        parts
            .iter()
            .filter_map(|part| part(self, incident, context))
            .collect::<Vec<_>>()
            .join(PART_SEPARATOR)
    }

    /// Personal follow-up naming the contact's emergency role and duty.
    pub fn role_message(&self, contact: &Contact, context: &MessageContext) -> String {
        let mut message = format!(
            "{}[{} 비상상황 - 개인 임무]\n👤 {}님\n\n🎯 귀하의 역할: {}\n📋 임무사항: {}",
            training_prefix(context),
            self.org_name,
            contact.name,
            or_unassigned(&contact.emergency_role_description),
            or_unassigned(&contact.emergency_duty),
        );

        if let (Some(weather), Some(evacuation)) = (&context.weather, &context.evacuation) {
            message.push_str(&format!(
                "\n\n🌤️ 기상정보: {}풍 {}m/s\n📍 대피장소: {}",
                weather.wind_direction, weather.wind_speed, evacuation.primary_site
            ));
        }

        message.push_str(&format!("\n\n📞 비상상황실: {}", self.emergency_room_phone));
        message
    }
}

fn training_prefix(context: &MessageContext) -> &'static str {
    if context.is_training {
        TRAINING_PREFIX
    } else {
        ""
    }
}

fn or_unassigned(value: &Option<String>) -> &str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNASSIGNED)
}

fn local_time(incident: &Incident) -> NaiveDateTime {
    incident.reported_at.naive_utc() + Duration::hours(LOCAL_OFFSET_HOURS)
}

fn header_part(
    composer: &MessageComposer,
    incident: &Incident,
    context: &MessageContext,
) -> Option<String> {
    Some(format!(
        "{}[{} 비상상황]\n🚨 {} 발령",
        training_prefix(context),
        composer.org_name,
        alert_level_label(incident.alert_level)
    ))
}

fn basic_info_part(
    _composer: &MessageComposer,
    incident: &Incident,
    _context: &MessageContext,
) -> Option<String> {
    Some(format!(
        "📍 사고위치: {}\n🔥 사고종류: {}\n📝 상황: {}\n⏰ 발생시간: {}\n👤 신고자: {}",
        incident.location,
        incident.incident_type,
        incident.description,
        local_time(incident).format("%Y-%m-%d %H:%M"),
        incident.reported_by
    ))
}

fn weather_part(
    _composer: &MessageComposer,
    _incident: &Incident,
    context: &MessageContext,
) -> Option<String> {
    context.weather.as_ref().map(|weather| {
        format!(
            "🌤️ 현재 기상: {}풍 {}m/s, {}°C",
            weather.wind_direction, weather.wind_speed, weather.temperature
        )
    })
}

fn evacuation_part(
    _composer: &MessageComposer,
    _incident: &Incident,
    context: &MessageContext,
) -> Option<String> {
    context.evacuation.as_ref().map(|evacuation| {
        let mut block = format!("📍 추천 대피장소: {}", evacuation.primary_site);
        if !evacuation.alternative_sites.is_empty() {
            block.push_str(&format!(
                "\n🔄 대안: {}",
                evacuation.alternative_sites.join(", ")
            ));
        }
        block
    })
}

fn footer_part(
    composer: &MessageComposer,
    incident: &Incident,
    _context: &MessageContext,
) -> Option<String> {
    let mut footer = format!("📞 비상상황실: {}", composer.emergency_room_phone);

    if let Some(layout) = composer.layouts.lookup(&incident.location) {
        footer.push_str(&format!("\n\n📋 위치 배치도:\n{layout}"));
    }

    if let Some(manual) = chemical_manual_url(
        incident.selected_chemical.as_deref(),
        &incident.location,
        &incident.incident_type,
    ) {
        footer.push_str(&format!("\n\n🔗 상세 대응 매뉴얼:\n{manual}"));
    }

    Some(footer)
}
