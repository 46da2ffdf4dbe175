//! End-to-end incident lifecycle scenarios against in-process collaborators.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use alerting::error::IncidentError;
use alerting::models::{AlertLevel, ApprovalEdits, IncidentStatus};
use test_utils::{
    RecordingTransport, StubWeather, criteria, employee, leak_report, service_with, with_role,
};

#[tokio::test]
async fn low_level_path_approves_without_sending() {
    let transport = Arc::new(RecordingTransport::default());
    let (service, _) = service_with(
        vec![employee("emp-001", "김동해", "01011112222")],
        StubWeather::calm_north_wind(),
        transport.clone(),
        3000,
    );

    // on-site (1) + basic valve action (1)
    let incident = service
        .report_incident(leak_report(criteria(
            "사업장 내부",
            "가능(밸브 등)",
            "없음",
            "불필요",
        )))
        .await
        .unwrap();
    assert_eq!(incident.alert_level, AlertLevel::Blue);

    let approved = service
        .approve_incident(&incident.id, "이승열", ApprovalEdits::default())
        .await
        .unwrap();

    assert_eq!(approved.status, IncidentStatus::Active);
    assert_eq!(approved.notifications_sent, 0);
    assert!(approved.contacts_notified.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn red_path_with_empty_directory_falls_back() {
    let transport = Arc::new(RecordingTransport::rejecting(&["01034567890"]));
    let (service, _) = service_with(
        Vec::new(),
        StubWeather(None),
        transport.clone(),
        3000,
    );

    let incident = service
        .report_incident(leak_report(criteria("사업장 외부", "불가능", "있음", "필요")))
        .await
        .unwrap();
    assert_eq!(incident.alert_level, AlertLevel::Red);

    let approved = service
        .approve_incident(&incident.id, "황병소", ApprovalEdits::default())
        .await
        .unwrap();

    assert_eq!(transport.sent().len(), 3);
    assert_eq!(approved.notifications_sent, 2);
    assert_eq!(approved.contacts_notified, vec!["발전파트장", "대표이사"]);

    let message = &transport.sent()[0].message;
    assert!(message.contains("적색경보"));
    assert!(!message.contains("현재 기상"));
    assert!(!message.contains("추천 대피장소"));
}

#[tokio::test]
async fn weather_adds_evacuation_guidance() {
    let transport = Arc::new(RecordingTransport::default());
    let (service, _) = service_with(
        vec![employee("emp-001", "김동해", "01011112222")],
        StubWeather::calm_north_wind(),
        transport.clone(),
        3000,
    );

    let incident = service
        .report_incident(leak_report(criteria("사업장 외부", "불가능", "없음", "불필요")))
        .await
        .unwrap();
    assert_eq!(incident.alert_level, AlertLevel::Yellow);

    service
        .approve_incident(&incident.id, "심재춘", ApprovalEdits::default())
        .await
        .unwrap();

    let message = &transport.sent_to("01011112222")[0];
    assert!(message.contains("황색경보"));
    assert!(message.contains("🌤️ 현재 기상: 북풍 3m/s, 8.5°C"));
    // yellow leaks are restricted to the old headquarters
    assert!(message.contains("📍 추천 대피장소: 구사옥"));
}

#[tokio::test(start_paused = true)]
async fn follow_up_wave_only_reaches_assigned_recipients() {
    let transport = Arc::new(RecordingTransport::rejecting(&["01033334444"]));
    let (service, dispatcher) = service_with(
        vec![
            employee("emp-001", "김동해", "01011112222"),
            with_role(
                employee("emp-002", "이비상", "01033334444"),
                "비상대응팀장",
                "현장 지휘",
            ),
        ],
        StubWeather(None),
        transport.clone(),
        3000,
    );

    let incident = service
        .report_incident(leak_report(criteria("사업장 외부", "불가능", "있음", "필요")))
        .await
        .unwrap();
    let approved = service
        .approve_incident(&incident.id, "황병소", ApprovalEdits::default())
        .await
        .unwrap();

    // the role holder's broadcast was rejected; the follow-up still goes out
    assert_eq!(approved.contacts_notified, vec!["김동해"]);
    assert_eq!(transport.sent().len(), 2);

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(transport.sent().len(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    dispatcher.shutdown().await;

    assert_eq!(transport.sent_to("01011112222").len(), 1);
    let to_leader = transport.sent_to("01033334444");
    assert_eq!(to_leader.len(), 2);
    assert!(to_leader[1].contains("🎯 귀하의 역할: 비상대응팀장"));
    assert!(to_leader[1].contains("📋 임무사항: 현장 지휘"));

    let stored = service.get_incident_by_id(&incident.id).await.unwrap().unwrap();
    assert_eq!(stored.notifications_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_follow_ups() {
    let transport = Arc::new(RecordingTransport::default());
    let (service, dispatcher) = service_with(
        vec![with_role(
            employee("emp-002", "이비상", "01033334444"),
            "비상대응팀장",
            "현장 지휘",
        )],
        StubWeather(None),
        transport.clone(),
        3000,
    );

    let incident = service
        .report_incident(leak_report(criteria("사업장 외부", "불가능", "있음", "필요")))
        .await
        .unwrap();
    service
        .approve_incident(&incident.id, "황병소", ApprovalEdits::default())
        .await
        .unwrap();

    dispatcher.shutdown().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.sent().len(), 1);
    assert!(dispatcher.background_tasks().is_empty());
}

#[tokio::test]
async fn full_lifecycle_is_monotonic() {
    let transport = Arc::new(RecordingTransport::default());
    let (service, _) = service_with(Vec::new(), StubWeather(None), transport, 3000);

    let mut request = leak_report(criteria("사업장 내부", "불가능", "없음", "불필요"));
    request.is_training = true;
    let incident = service.report_incident(request).await.unwrap();
    let mut observed = vec![incident.status];

    let approved = service
        .approve_incident(&incident.id, "윤지수", ApprovalEdits::default())
        .await
        .unwrap();
    observed.push(approved.status);

    assert!(matches!(
        service.approve_incident(&incident.id, "윤지수", ApprovalEdits::default()).await,
        Err(IncidentError::InvalidTransition { .. })
    ));

    let ended = service.end_training(&incident.id, "윤지수").await.unwrap();
    observed.push(ended.status);

    assert!(matches!(
        service.complete_action(&incident.id, "정리", "윤지수").await,
        Err(IncidentError::InvalidTransition { .. })
    ));
    assert!(matches!(
        service.end_training(&incident.id, "곽종만").await,
        Err(IncidentError::InvalidTransition { .. })
    ));

    assert_eq!(
        observed,
        vec![
            IncidentStatus::PendingApproval,
            IncidentStatus::Active,
            IncidentStatus::Resolved
        ]
    );
    let stored = service.get_incident_by_id(&incident.id).await.unwrap().unwrap();
    assert_eq!(stored.training_ended_by.as_deref(), Some("윤지수"));
    assert_eq!(stored.training_ended_at, ended.training_ended_at);
}
