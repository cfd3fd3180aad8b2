mod common;

use chrono::Duration;
use pipeline_core::{PipelineError, TimeFrame};
use pipeline_domain::{ProviderConfigRepository, ProviderKind, QuotaLimits, QuotaStatus};

use common::Harness;

fn daily(limit: u64) -> QuotaLimits {
    QuotaLimits {
        per_hour: None,
        per_day: Some(limit),
        per_month: None,
    }
}

async fn set_requests_today(harness: &Harness, config_id: &str, used: u64) {
    let mut usage = harness.configs.find_by_id(config_id).await.unwrap().unwrap().usage;
    usage.requests_today = used;
    harness.configs.save_usage(config_id, &usage).await.unwrap();
}

#[tokio::test]
async fn test_daily_window_at_95_percent_is_critical() {
    let harness = Harness::new();
    let config = harness.insert_config(ProviderKind::Openai, daily(1000)).await;
    set_requests_today(&harness, &config.id, 950).await;

    let report = harness.services.quota.get_status(&config.id).await.unwrap();
    let day = report
        .windows
        .iter()
        .find(|w| w.time_frame == TimeFrame::Day)
        .unwrap();

    assert!((day.percentage - 95.0).abs() < 1e-9);
    assert_eq!(day.status, QuotaStatus::Critical);
    assert_eq!(report.overall_status, QuotaStatus::Critical);
    assert_eq!(report.most_restrictive, Some(TimeFrame::Day));
}

#[tokio::test]
async fn test_record_usage_at_daily_limit_is_rejected_without_increment() {
    let harness = Harness::new();
    let config = harness.insert_config(ProviderKind::Openai, daily(1000)).await;
    set_requests_today(&harness, &config.id, 1000).await;

    let result = harness.services.quota.record_usage(&config.id).await;
    assert!(matches!(
        result,
        Err(PipelineError::QuotaExceeded { window: TimeFrame::Day, .. })
    ));

    let stored = harness.configs.find_by_id(&config.id).await.unwrap().unwrap();
    assert_eq!(stored.usage.requests_today, 1000);
    assert_eq!(stored.usage.requests_this_hour, 0);
    assert_eq!(stored.usage.requests_this_month, 0);
}

#[tokio::test]
async fn test_status_thresholds() {
    let harness = Harness::new();
    let config = harness.insert_config(ProviderKind::Apify, daily(100)).await;

    for (used, expected) in [
        (0, QuotaStatus::Normal),
        (74, QuotaStatus::Normal),
        (75, QuotaStatus::Warning),
        (89, QuotaStatus::Warning),
        (90, QuotaStatus::Critical),
        (100, QuotaStatus::Critical),
    ] {
        set_requests_today(&harness, &config.id, used).await;
        let report = harness.services.quota.get_status(&config.id).await.unwrap();
        assert_eq!(report.overall_status, expected, "used={used}");
    }
}

#[tokio::test]
async fn test_record_usage_never_exceeds_limit() {
    let harness = Harness::new();
    let config = harness
        .insert_config(
            ProviderKind::Apify,
            QuotaLimits {
                per_hour: Some(3),
                per_day: Some(10),
                per_month: Some(100),
            },
        )
        .await;

    let mut admitted = 0;
    let mut rejected = 0;
    for _ in 0..5 {
        match harness.services.quota.record_usage(&config.id).await {
            Ok(()) => admitted += 1,
            Err(PipelineError::QuotaExceeded { window, .. }) => {
                assert_eq!(window, TimeFrame::Hour);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(rejected, 2);
    let usage = harness.configs.find_by_id(&config.id).await.unwrap().unwrap().usage;
    assert_eq!(usage.requests_this_hour, 3);
    assert_eq!(usage.requests_today, 3);
    assert_eq!(usage.requests_this_month, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_record_usage_respects_limit() {
    let harness = std::sync::Arc::new(Harness::new());
    let config = harness.insert_config(ProviderKind::Openai, daily(5)).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let harness = harness.clone();
        let id = config.id.clone();
        handles.push(tokio::spawn(async move {
            harness.services.quota.record_usage(&id).await.is_ok()
        }));
    }
    let admitted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();

    assert_eq!(admitted, 5);
    let usage = harness.configs.find_by_id(&config.id).await.unwrap().unwrap().usage;
    assert_eq!(usage.requests_today, 5);
}

#[tokio::test]
async fn test_window_rolls_after_boundary() {
    let harness = Harness::new();
    let config = harness
        .insert_config(
            ProviderKind::Apify,
            QuotaLimits {
                per_hour: Some(1),
                per_day: None,
                per_month: None,
            },
        )
        .await;

    harness.services.quota.record_usage(&config.id).await.unwrap();
    assert!(harness.services.quota.record_usage(&config.id).await.is_err());

    harness.clock.advance(Duration::hours(1));
    harness.services.quota.record_usage(&config.id).await.unwrap();

    let usage = harness.configs.find_by_id(&config.id).await.unwrap().unwrap().usage;
    assert_eq!(usage.requests_this_hour, 1);
    assert_eq!(usage.requests_today, 2);
}

#[tokio::test]
async fn test_roll_window_is_idempotent() {
    let harness = Harness::new();
    let config = harness.insert_config(ProviderKind::Apify, daily(10)).await;
    harness.services.quota.record_usage(&config.id).await.unwrap();

    assert!(!harness.services.quota.roll_window(&config.id, TimeFrame::Day).await.unwrap());

    harness.clock.advance(Duration::days(1));
    assert!(harness.services.quota.roll_window(&config.id, TimeFrame::Day).await.unwrap());
    assert!(!harness.services.quota.roll_window(&config.id, TimeFrame::Day).await.unwrap());

    let usage = harness.configs.find_by_id(&config.id).await.unwrap().unwrap().usage;
    assert_eq!(usage.requests_today, 0);
    assert_eq!(usage.requests_this_month, 1);
}

#[tokio::test]
async fn test_unlimited_config_is_always_admitted() {
    let harness = Harness::new();
    let config = harness
        .insert_config(ProviderKind::Facebook, QuotaLimits::unlimited())
        .await;

    for _ in 0..50 {
        harness.services.quota.record_usage(&config.id).await.unwrap();
    }
    let report = harness.services.quota.get_status(&config.id).await.unwrap();
    assert_eq!(report.overall_status, QuotaStatus::Normal);
    assert!(report.windows.iter().all(|w| w.used == 50 && w.percentage == 0.0));
}

#[tokio::test]
async fn test_zero_budget_window_rejects_without_increment() {
    let harness = Harness::new();
    let config = harness.insert_config(ProviderKind::Apify, daily(0)).await;

    let result = harness.services.quota.record_usage(&config.id).await;
    assert!(matches!(
        result,
        Err(PipelineError::QuotaExceeded {
            window: TimeFrame::Day,
            ..
        })
    ));

    let report = harness.services.quota.get_status(&config.id).await.unwrap();
    assert!(report.windows.iter().all(|w| w.used == 0));
    assert!(report
        .windows
        .iter()
        .all(|w| w.limit.map_or(true, |limit| w.used <= limit)));
    assert_eq!(report.overall_status, QuotaStatus::Critical);
}

#[tokio::test]
async fn test_unknown_config_is_not_found() {
    let harness = Harness::new();
    let result = harness.services.quota.record_usage("missing").await;
    assert!(matches!(result, Err(PipelineError::ConfigNotFound { .. })));
}
