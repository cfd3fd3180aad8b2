mod common;

use std::time::Duration;

use pipeline_core::{config::LedgerConfig, JobStatus, JobType};
use pipeline_domain::{ProviderKind, QuotaLimits};
use pipeline_dispatcher::{StageOutcome, SystemAction};

use common::Harness;

fn fast_drain() -> LedgerConfig {
    LedgerConfig {
        drain_interval_seconds: 1,
        drain_batch_size: 10,
        autostart: false,
        ..LedgerConfig::default()
    }
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let harness = Harness::with_ledger(fast_drain());
    let drain = &harness.services.drain;

    assert!(!drain.is_running());
    assert!(drain.start().await);
    assert!(!drain.start().await);
    assert!(drain.is_running());

    assert!(drain.stop().await);
    assert!(!drain.stop().await);
    assert!(!drain.is_running());
}

#[tokio::test]
async fn test_control_reports_running_state() {
    let harness = Harness::with_ledger(fast_drain());
    let drain = &harness.services.drain;

    assert!(drain.control(SystemAction::Start).await.unwrap());
    assert!(harness.services.status().await.unwrap().drain_running);
    assert!(!drain.control(SystemAction::Stop).await.unwrap());
    assert!(!harness.services.status().await.unwrap().drain_running);

    assert_eq!("start".parse::<SystemAction>().unwrap(), SystemAction::Start);
    assert!("pause".parse::<SystemAction>().is_err());
}

#[tokio::test]
async fn test_running_loop_executes_deferred_job() {
    let harness = Harness::with_ledger(fast_drain());
    harness
        .active_config(
            ProviderKind::Apify,
            QuotaLimits {
                per_hour: Some(1),
                per_day: None,
                per_month: None,
            },
        )
        .await;
    let first = harness.seed_website().await;
    let second = harness.seed_website().await;
    let orchestrator = &harness.services.orchestrator;

    orchestrator.extract_urls(&first.id).await.unwrap();
    let StageOutcome::Deferred { job: Some(job), .. } =
        orchestrator.extract_urls(&second.id).await.unwrap()
    else {
        panic!("expected deferral");
    };

    harness.clock.advance(chrono::Duration::hours(1));
    harness.services.drain.start().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let current = harness.services.ledger.get(&job.id).await.unwrap();
        if current.status == JobStatus::Completed {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "排空循环未执行任务");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    harness.services.drain.stop().await;

    let status = harness.services.status().await.unwrap();
    let depth = status
        .queues
        .iter()
        .find(|q| q.job_type == JobType::ExtractUrls)
        .unwrap();
    assert_eq!(depth.pending, 0);
    assert_eq!(status.jobs["completed"], 2);
}

#[tokio::test]
async fn test_dashboard_stats_summarise_active_configs() {
    let harness = Harness::new();
    let config = harness
        .active_config(
            ProviderKind::Openai,
            QuotaLimits {
                per_hour: None,
                per_day: Some(100),
                per_month: None,
            },
        )
        .await;
    harness.seed_website().await;

    let stats = harness.services.dashboard_stats().await.unwrap();
    assert_eq!(stats.artifacts.websites, 1);
    assert_eq!(stats.queues.len(), 5);
    assert_eq!(stats.quotas.len(), 3);

    let generation = stats
        .quotas
        .iter()
        .find(|q| q.config_id.as_deref() == Some(config.id.as_str()))
        .unwrap();
    assert!(generation.quota.is_some());
    assert_eq!(
        stats.quotas.iter().filter(|q| q.config_id.is_none()).count(),
        2
    );
}

#[tokio::test]
async fn test_exhausted_config_does_not_starve_later_jobs() {
    let harness = Harness::new();
    harness
        .active_config(
            ProviderKind::Apify,
            QuotaLimits {
                per_hour: None,
                per_day: Some(1),
                per_month: None,
            },
        )
        .await;
    harness
        .active_config(
            ProviderKind::Openai,
            QuotaLimits {
                per_hour: Some(1),
                per_day: None,
                per_month: None,
            },
        )
        .await;
    let orchestrator = &harness.services.orchestrator;

    // 抽取配置当天额度用尽，两个正文任务排在队首
    let first_url = harness.seed_url().await;
    assert!(orchestrator
        .extract_content(&first_url.id)
        .await
        .unwrap()
        .is_completed());
    for _ in 0..2 {
        harness.clock.advance(chrono::Duration::seconds(1));
        let url = harness.seed_url().await;
        let outcome = orchestrator.extract_content(&url.id).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Deferred { job: Some(_), .. }));
    }

    let agent = harness.seed_agent().await;
    let content = harness.seed_content().await;
    assert!(orchestrator
        .generate_content(&content.id, &agent.id, None)
        .await
        .unwrap()
        .is_completed());
    harness.clock.advance(chrono::Duration::seconds(1));
    let other = harness.seed_content().await;
    let StageOutcome::Deferred { job: Some(generation), .. } = orchestrator
        .generate_content(&other.id, &agent.id, None)
        .await
        .unwrap()
    else {
        panic!("expected deferral");
    };

    // 生成配置的小时窗口滚动，抽取配置仍然超额
    harness.clock.advance(chrono::Duration::hours(1));
    let report = orchestrator.drain_pending(2).await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        harness.services.ledger.get(&generation.id).await.unwrap().status,
        JobStatus::Completed
    );
    let status = harness.services.status().await.unwrap();
    let extraction = status
        .queues
        .iter()
        .find(|q| q.job_type == JobType::ExtractContent)
        .unwrap();
    assert_eq!(extraction.pending, 2);
}
