//! Alarm criteria scoring.
//!
//! Each criterion contributes independently to a total between 0 and 8. The
//! rule table is plain data so criteria can be added without touching the
//! threshold logic.

use crate::models::{AlarmCriteria, AlertLevel, Severity};

const SCOPE_OFF_SITE: &str = "사업장 외부";
const SCOPE_ON_SITE: &str = "사업장 내부";
const SELF_RESPONSE_IMPOSSIBLE: &str = "불가능";
const SELF_RESPONSE_VALVE: &str = "가능(밸브 등)";
const CASUALTIES_PRESENT: &str = "있음";
const EVACUATION_REQUIRED: &str = "필요";

type ScoreRule = fn(&AlarmCriteria) -> u8;

const SCORE_RULES: [ScoreRule; 4] = [
    scope_score,
    self_response_score,
    casualties_score,
    evacuation_score,
];

fn scope_score(criteria: &AlarmCriteria) -> u8 {
    match criteria.scope.trim() {
        SCOPE_OFF_SITE => 2,
        SCOPE_ON_SITE => 1,
        _ => 0,
    }
}

fn self_response_score(criteria: &AlarmCriteria) -> u8 {
    match criteria.self_response.trim() {
        SELF_RESPONSE_IMPOSSIBLE => 2,
        SELF_RESPONSE_VALVE => 1,
        _ => 0,
    }
}

fn casualties_score(criteria: &AlarmCriteria) -> u8 {
    if criteria.casualties.trim() == CASUALTIES_PRESENT {
        2
    } else {
        0
    }
}

fn evacuation_score(criteria: &AlarmCriteria) -> u8 {
    if criteria.evacuation.trim() == EVACUATION_REQUIRED {
        2
    } else {
        0
    }
}

/// Sum of all criterion contributions.
pub fn alarm_score(criteria: &AlarmCriteria) -> u8 {
    SCORE_RULES.iter().map(|rule| rule(criteria)).sum()
}

fn level_for_score(score: u8) -> AlertLevel {
    match score {
        6.. => AlertLevel::Red,
        4..=5 => AlertLevel::Yellow,
        2..=3 => AlertLevel::Blue,
        _ => AlertLevel::White,
    }
}

fn level_for_severity(severity: Severity) -> AlertLevel {
    match severity {
        Severity::Critical => AlertLevel::Red,
        Severity::Major => AlertLevel::Yellow,
        Severity::Moderate => AlertLevel::Blue,
        Severity::Minor => AlertLevel::White,
    }
}

/// Determine the alert level for a report.
///
/// Criteria, when present, always decide the level. The severity is only used
/// when no criteria were supplied.
pub fn determine_alert_level(severity: Severity, criteria: Option<&AlarmCriteria>) -> AlertLevel {
    match criteria {
        Some(criteria) => level_for_score(alarm_score(criteria)),
        None => level_for_severity(severity),
    }
}
