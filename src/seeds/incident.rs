//! Demo incident seeding
//!
//! Populates an empty repository with one pending leak report and one active
//! fire drill so a fresh local instance has something to approve and close.

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::models::{
    AlarmCriteria, AlertLevel, CreateIncidentRequest, Incident, IncidentStatus, ReportDetails,
    Severity,
};
use crate::repositories::IncidentRepository;

fn criteria(scope: &str, self_response: &str) -> AlarmCriteria {
    AlarmCriteria {
        scope: scope.to_string(),
        self_response: self_response.to_string(),
        casualties: "없음".to_string(),
        evacuation: "불필요".to_string(),
    }
}

fn demo_incidents() -> Vec<Incident> {
    let now = Utc::now();

    let leak_reported = now - Duration::minutes(15);
    let leak = Incident::from_report(
        "INC-EXAMPLE-001".to_string(),
        CreateIncidentRequest {
            location: "암모니아 저장 탱크".to_string(),
            incident_type: "유해물질 누출".to_string(),
            description: "M-TK-01B 암모니아 저장탱크 상부 배관 연결부 플랜지에서 누출 감지. \
                          누출량 약 5kg/hr 추정. 탱크 압력 8.5 bar, 온도 -33°C 정상 범위 유지 중."
                .to_string(),
            reported_by: "김다혜".to_string(),
            evacuation_required: true,
            report_details: Some(ReportDetails {
                reporter_name: "김다혜".to_string(),
                reporter_phone: "010-1234-5678".to_string(),
                reporter_company: Some("임시출입자".to_string()),
                severity: Severity::Major,
                timestamp: leak_reported.to_rfc3339(),
            }),
            alarm_criteria: Some(criteria("사업장 외부", "불가능")),
            is_limited_test: Some(false),
            ..Default::default()
        },
        AlertLevel::Yellow,
        leak_reported,
    );

    let drill_reported = now - Duration::minutes(25);
    let mut drill = Incident::from_report(
        "INC-TRAINING-001".to_string(),
        CreateIncidentRequest {
            location: "발전설비동 2호기".to_string(),
            incident_type: "화재 발생".to_string(),
            description: "[훈련 상황] 2호기 터빈 베어링 과열로 인한 화재 훈련. \
                          초동조치반 소화전 5조 출동, 구호반 2조 대기."
                .to_string(),
            reported_by: "박발전".to_string(),
            report_details: Some(ReportDetails {
                reporter_name: "박발전".to_string(),
                reporter_phone: "010-2345-6789".to_string(),
                reporter_company: Some("GS동해전력".to_string()),
                severity: Severity::Major,
                timestamp: drill_reported.to_rfc3339(),
            }),
            alarm_criteria: Some(criteria("사업장 내부", "가능")),
            is_limited_test: Some(false),
            is_training: true,
            ..Default::default()
        },
        AlertLevel::Yellow,
        drill_reported,
    );
    drill.status = IncidentStatus::Active;
    drill.approved_by = Some("박발전".to_string());
    drill.approved_at = Some(now - Duration::minutes(24));
    drill.contacts_notified = vec![
        "발전파트장".to_string(),
        "대표이사".to_string(),
        "비상대응팀장".to_string(),
    ];
    drill.notifications_sent = drill.contacts_notified.len() as u32;

    vec![leak, drill]
}

/// Seeds the demo incidents unless the repository already holds incidents.
pub async fn seed_demo_incidents(repository: &dyn IncidentRepository) -> Result<()> {
    if !repository.find_all().await?.is_empty() {
        log::info!("Incident repository is not empty, skipping demo seed");
        return Ok(());
    }

    for incident in demo_incidents() {
        let id = incident.id.clone();
        repository.create(incident).await?;
        log::info!("Seeded demo incident: {}", id);
    }

    log::info!("Demo incident seeding completed");
    Ok(())
}
