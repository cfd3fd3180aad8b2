mod common;

use std::time::Duration;

use chrono::NaiveDate;
use pipeline_core::{JobStatus, JobType, PipelineError, PublishingBlockReason};
use pipeline_domain::{
    ArtifactRepository, ArtifactStatus, Delivery, EventChannel, EventPhase, JobRepository,
    PageRequest, PostingSchedule, ProviderKind, ProviderScope, PublishingPolicy, QuotaLimits,
};
use pipeline_dispatcher::{StageArtifact, StageOutcome};

use common::Harness;

fn hourly(limit: u64) -> QuotaLimits {
    QuotaLimits {
        per_hour: Some(limit),
        per_day: None,
        per_month: None,
    }
}

#[tokio::test]
async fn test_full_pipeline_from_website_to_engagement() {
    let harness = Harness::new();
    let (_, _, facebook) = harness.activate_all().await;
    let orchestrator = &harness.services.orchestrator;
    let website = harness.seed_website().await;
    let agent = harness.seed_agent().await;
    let target = harness
        .seed_target(&facebook.id, PublishingPolicy::default())
        .await;

    // URL抓取
    let StageOutcome::Completed {
        job,
        artifact: StageArtifact::Urls(urls),
    } = orchestrator.extract_urls(&website.id).await.unwrap()
    else {
        panic!("expected urls");
    };
    assert_eq!(urls.len(), 2);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.as_ref().unwrap()["postsExtracted"], 2);
    assert!(urls.iter().all(|u| u.produced_by_job_id == job.id));

    // 内容抓取
    let StageOutcome::Completed {
        artifact: StageArtifact::Content(content),
        ..
    } = orchestrator.extract_content(&urls[0].id).await.unwrap()
    else {
        panic!("expected content");
    };
    assert_eq!(content.url_id, urls[0].id);

    // 生成
    let StageOutcome::Completed {
        job,
        artifact: StageArtifact::Generated(generated),
    } = orchestrator
        .generate_content(&content.id, &agent.id, Some("参考语气".to_string()))
        .await
        .unwrap()
    else {
        panic!("expected generated content");
    };
    assert_eq!(generated.agent_id, agent.id);
    assert_eq!(generated.metadata.tokens_used, 800);
    assert_eq!(job.result.as_ref().unwrap()["metadata"]["processingTime"], 1200);
    assert_eq!(job.payload["referenceContent"], "参考语气");

    // 发布
    let StageOutcome::Completed {
        artifact: StageArtifact::Post(post),
        ..
    } = orchestrator.publish(&generated.id, &target.id).await.unwrap()
    else {
        panic!("expected post");
    };
    assert_eq!(post.external_post_id, format!("fb_{}", generated.id));
    let stored_target = harness.artifacts.find_target(&target.id).await.unwrap().unwrap();
    assert_eq!(stored_target.policy.posts_today, 1);
    assert_eq!(stored_target.last_published_at, Some(common::start_time()));

    // 互动同步
    let StageOutcome::Completed {
        artifact: StageArtifact::Post(synced),
        ..
    } = orchestrator.sync_engagement(&post.id).await.unwrap()
    else {
        panic!("expected synced post");
    };
    assert_eq!(synced.engagement.likes, 3);
    assert_eq!(synced.engagement.comments, 1);
    assert!(synced.engagement.synced_at.is_some());

    assert_eq!(harness.apify.calls(), 2);
    assert_eq!(harness.openai.calls(), 1);
    assert_eq!(harness.facebook.calls(), 2);

    let counts = harness.services.catalog.counts().await.unwrap();
    assert_eq!(counts.websites, 1);
    assert_eq!(counts.urls, 2);
    assert_eq!(counts.contents, 1);
    assert_eq!(counts.generated, 1);
    assert_eq!(counts.posts, 1);
}

#[tokio::test]
async fn test_repeated_url_extraction_skips_known_addresses() {
    let harness = Harness::new();
    harness.activate_all().await;
    let website = harness.seed_website().await;
    let orchestrator = &harness.services.orchestrator;

    orchestrator.extract_urls(&website.id).await.unwrap();
    let StageOutcome::Completed {
        job,
        artifact: StageArtifact::Urls(urls),
    } = orchestrator.extract_urls(&website.id).await.unwrap()
    else {
        panic!("expected urls");
    };

    assert!(urls.is_empty());
    assert_eq!(job.result.as_ref().unwrap()["postsExtracted"], 0);
    assert_eq!(job.result.as_ref().unwrap()["discovered"], 2);
    assert_eq!(harness.services.catalog.counts().await.unwrap().urls, 2);
}

#[tokio::test]
async fn test_publish_at_daily_limit_is_blocked_without_job() {
    let harness = Harness::new();
    let (_, _, facebook) = harness.activate_all().await;
    let generated = harness.seed_generated().await;
    let target = harness
        .seed_target(
            &facebook.id,
            PublishingPolicy {
                max_posts_per_day: 2,
                posts_today: 2,
                posts_today_date: NaiveDate::from_ymd_opt(2024, 3, 15),
                ..PublishingPolicy::default()
            },
        )
        .await;

    let outcome = harness
        .services
        .orchestrator
        .publish(&generated.id, &target.id)
        .await
        .unwrap();

    match outcome {
        StageOutcome::Deferred {
            job: None,
            reason:
                PipelineError::PublishingBlocked {
                    reason: PublishingBlockReason::DailyLimit,
                },
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(harness
        .jobs
        .find_by_key(JobType::Publish, &generated.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.facebook.calls(), 0);
    let report = harness.services.quota.get_status(&facebook.id).await.unwrap();
    assert!(report.windows.iter().all(|w| w.used == 0));
}

#[tokio::test]
async fn test_daily_post_count_resets_on_new_day() {
    let harness = Harness::new();
    let (_, _, facebook) = harness.activate_all().await;
    let generated = harness.seed_generated().await;
    let target = harness
        .seed_target(
            &facebook.id,
            PublishingPolicy {
                max_posts_per_day: 1,
                posts_today: 1,
                posts_today_date: NaiveDate::from_ymd_opt(2024, 3, 14),
                ..PublishingPolicy::default()
            },
        )
        .await;

    let outcome = harness
        .services
        .orchestrator
        .publish(&generated.id, &target.id)
        .await
        .unwrap();
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_publish_outside_schedule_and_during_cooldown() {
    let harness = Harness::new();
    let (_, _, facebook) = harness.activate_all().await;
    let orchestrator = &harness.services.orchestrator;

    let afternoon_only = harness
        .seed_target(
            &facebook.id,
            PublishingPolicy {
                posting_schedule: PostingSchedule {
                    enabled: true,
                    start_time: "12:00".to_string(),
                    end_time: "18:00".to_string(),
                    weekdays: vec![],
                    timezone: "UTC".to_string(),
                },
                ..PublishingPolicy::default()
            },
        )
        .await;
    let generated = harness.seed_generated().await;
    match orchestrator.publish(&generated.id, &afternoon_only.id).await.unwrap() {
        StageOutcome::Deferred {
            reason:
                PipelineError::PublishingBlocked {
                    reason: PublishingBlockReason::OutsideSchedule,
                },
            ..
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }

    let cooling = harness
        .seed_target(
            &facebook.id,
            PublishingPolicy {
                cooldown_period: 30,
                ..PublishingPolicy::default()
            },
        )
        .await;
    assert!(orchestrator
        .publish(&generated.id, &cooling.id)
        .await
        .unwrap()
        .is_completed());

    let another = harness.seed_generated().await;
    harness.clock.advance(chrono::Duration::minutes(10));
    match orchestrator.publish(&another.id, &cooling.id).await.unwrap() {
        StageOutcome::Deferred {
            reason:
                PipelineError::PublishingBlocked {
                    reason: PublishingBlockReason::Cooldown,
                },
            ..
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }

    harness.clock.advance(chrono::Duration::minutes(20));
    assert!(orchestrator
        .publish(&another.id, &cooling.id)
        .await
        .unwrap()
        .is_completed());
}

#[tokio::test]
async fn test_provider_failure_marks_job_failed_then_retry_drains() {
    let harness = Harness::new();
    harness.activate_all().await;
    let content = harness.seed_content().await;
    let agent = harness.seed_agent().await;
    let orchestrator = &harness.services.orchestrator;

    harness
        .openai
        .fail_with(PipelineError::provider("HTTP 500: upstream down"));
    let result = orchestrator.generate_content(&content.id, &agent.id, None).await;
    assert!(matches!(result, Err(PipelineError::ProviderError { .. })));

    let failed = harness
        .services
        .ledger
        .latest_for_key(JobType::GenerateContent, &content.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("upstream down"));
    assert_eq!(
        harness
            .services
            .catalog
            .status_of(JobType::GenerateContent, &content.id)
            .await
            .unwrap(),
        ArtifactStatus::Failed
    );

    harness.openai.recover();
    harness.services.ledger.retry(&failed.id).await.unwrap();
    let report = orchestrator.drain_pending(10).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.completed, 1);

    let done = harness.services.ledger.get(&failed.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.retry_count, 1);
    assert_eq!(harness.services.catalog.counts().await.unwrap().generated, 1);
}

#[tokio::test]
async fn test_network_failure_is_surfaced() {
    let harness = Harness::new();
    harness.activate_all().await;
    let website = harness.seed_website().await;
    harness
        .apify
        .fail_with(PipelineError::Network("connection refused".to_string()));

    let result = harness.services.orchestrator.extract_urls(&website.id).await;
    assert!(matches!(result, Err(PipelineError::Network(_))));
    let job = harness
        .services
        .ledger
        .latest_for_key(JobType::ExtractUrls, &website.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_missing_predecessor_creates_no_job() {
    let harness = Harness::new();
    harness.activate_all().await;
    let agent = harness.seed_agent().await;

    let result = harness
        .services
        .orchestrator
        .generate_content("missing-content", &agent.id, None)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::ArtifactNotFound { ref kind, .. }) if kind == "content"
    ));

    let content = harness.seed_content().await;
    let result = harness
        .services
        .orchestrator
        .generate_content(&content.id, "missing-agent", None)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::ArtifactNotFound { ref kind, .. }) if kind == "agent"
    ));

    let counts = harness.services.ledger.status_counts().await.unwrap();
    assert!(counts.values().all(|c| *c == 0));
}

#[tokio::test]
async fn test_stage_without_active_config() {
    let harness = Harness::new();
    let website = harness.seed_website().await;

    let result = harness.services.orchestrator.extract_urls(&website.id).await;
    assert!(matches!(result, Err(PipelineError::NoActiveConfig { .. })));
}

#[tokio::test]
async fn test_publish_with_config_from_wrong_scope() {
    let harness = Harness::new();
    let (apify, _, _) = harness.activate_all().await;
    let generated = harness.seed_generated().await;
    let target = harness.seed_target(&apify.id, PublishingPolicy::default()).await;

    let result = harness
        .services
        .orchestrator
        .publish(&generated.id, &target.id)
        .await;
    assert!(matches!(result, Err(PipelineError::ValidationError { .. })));
}

#[tokio::test]
async fn test_concurrent_generation_on_same_content() {
    let harness = Harness::new();
    harness.activate_all().await;
    let content = harness.seed_content().await;
    let agent = harness.seed_agent().await;
    harness.openai.set_delay(Duration::from_millis(200));

    let orchestrator = &harness.services.orchestrator;
    let (first, second) = tokio::join!(
        orchestrator.generate_content(&content.id, &agent.id, None),
        orchestrator.generate_content(&content.id, &agent.id, None),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let duplicates = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                StageOutcome::Deferred {
                    reason: PipelineError::DuplicateGeneration { .. },
                    ..
                }
            )
        })
        .count();

    assert_eq!(completed, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(harness.openai.calls(), 1);
}

#[tokio::test]
async fn test_quota_deferred_job_runs_after_window_reset() {
    let harness = Harness::new();
    harness.active_config(ProviderKind::Openai, hourly(1)).await;
    let agent = harness.seed_agent().await;
    let first = harness.seed_content().await;
    let second = harness.seed_content().await;
    let orchestrator = &harness.services.orchestrator;

    assert!(orchestrator
        .generate_content(&first.id, &agent.id, None)
        .await
        .unwrap()
        .is_completed());

    let pending = match orchestrator
        .generate_content(&second.id, &agent.id, None)
        .await
        .unwrap()
    {
        StageOutcome::Deferred {
            job: Some(job),
            reason: PipelineError::QuotaExceeded { .. },
        } => job,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(
        harness
            .services
            .catalog
            .status_of(JobType::GenerateContent, &second.id)
            .await
            .unwrap(),
        ArtifactStatus::Queued
    );

    let report = orchestrator.drain_pending(10).await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.completed, 0);

    harness.clock.advance(chrono::Duration::hours(1));
    let report = orchestrator.drain_pending(10).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(
        harness.services.ledger.get(&pending.id).await.unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(harness.openai.calls(), 2);
}

#[tokio::test]
async fn test_drain_leaves_unpreparable_jobs_pending() {
    let harness = Harness::new();
    let content = harness.seed_content().await;
    let agent = harness.seed_agent().await;
    harness.active_config(ProviderKind::Openai, hourly(1)).await;
    harness
        .services
        .orchestrator
        .generate_content(&content.id, &agent.id, None)
        .await
        .unwrap();
    let other = harness.seed_content().await;
    let StageOutcome::Deferred { job: Some(job), .. } = harness
        .services
        .orchestrator
        .generate_content(&other.id, &agent.id, None)
        .await
        .unwrap()
    else {
        panic!("expected deferral");
    };

    // 删除激活配置后任务无法准备，保持待处理
    let active = harness
        .services
        .selector
        .active_for(ProviderScope::Generation)
        .await
        .unwrap();
    harness.services.selector.delete(&active.id).await.unwrap();

    let report = harness.services.orchestrator.drain_pending(10).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(
        harness.services.ledger.get(&job.id).await.unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn test_generation_events_carry_metadata() {
    let harness = Harness::new();
    harness.activate_all().await;
    let content = harness.seed_content().await;
    let agent = harness.seed_agent().await;
    let mut events = harness.bus.subscribe();

    harness
        .services
        .orchestrator
        .generate_content(&content.id, &agent.id, None)
        .await
        .unwrap();

    let mut names = Vec::new();
    let mut completed = None;
    for _ in 0..3 {
        let delivery = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap();
        let Delivery::Event(event) = delivery else {
            panic!("expected event");
        };
        names.push(event.name());
        if event.phase == EventPhase::Completed {
            completed = Some(event);
        }
    }

    assert_eq!(
        names,
        vec![
            "generation-started",
            "generation-progress",
            "generation-completed"
        ]
    );
    let completed = completed.unwrap();
    assert_eq!(completed.source_entity_id, content.id);
    let metadata = completed.metadata.unwrap();
    assert_eq!(metadata["processingTime"], 1200);
    assert_eq!(metadata["tokensUsed"], 800);
}

#[tokio::test]
async fn test_catalog_lists_derive_status_from_ledger() {
    let harness = Harness::new();
    harness.activate_all().await;
    let website = harness.seed_website().await;

    let listed = harness.services.catalog.list_websites().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ArtifactStatus::NotStarted);

    harness
        .services
        .orchestrator
        .extract_urls(&website.id)
        .await
        .unwrap();

    let listed = harness.services.catalog.list_websites().await.unwrap();
    assert_eq!(listed[0].status, ArtifactStatus::Succeeded);

    let urls = harness
        .services
        .catalog
        .list_urls(PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(urls.total, 2);
    assert!(urls
        .items
        .iter()
        .all(|u| u.status == ArtifactStatus::NotStarted));
}
