//! End-to-end pipeline scenarios against the in-process store.

mod common;

use std::sync::Arc;

use challenge_worker::error::PipelineError;
use challenge_worker::pipeline::{PoolHealth, PublicationService, SYSTEM_REVIEWER};
use challenge_worker::store::dao::ContentStore;
use challenge_worker::store::models::QuestionStatus;
use common::{CountingGateway, Harness, date};

#[tokio::test]
async fn high_confidence_generation_is_approved_immediately() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    let control = harness.seed_prompt_control("cardiology");

    let outcome = harness
        .orchestrator
        .generate_one(control.id)
        .await
        .expect("generation succeeds");

    assert!(outcome.auto_approved);
    assert_eq!(outcome.question.status, QuestionStatus::Approved);
    assert_eq!(outcome.question.reviewed_by.as_deref(), Some(SYSTEM_REVIEWER));
    assert_eq!(outcome.question.prompt_control_id, Some(control.id));
    assert!(outcome.question.provenance.generated_by_ai());
    assert_eq!(harness.gateway.calls(), 1);
}

#[tokio::test]
async fn concurrent_publication_for_one_date_has_a_single_winner() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    let first = harness.seed_approved(Some(0.95)).await;
    let second = harness.seed_approved(Some(0.92)).await;
    let publication = Arc::new(PublicationService::new(
        Arc::clone(&harness.store) as Arc<dyn ContentStore>,
        harness.telemetry.metrics_arc(),
    ));
    let day = date(2024, 6, 20);

    let tasks = [first.id, second.id].map(|question_id| {
        let publication = Arc::clone(&publication);
        tokio::spawn(async move { publication.publish_for_date(question_id, day).await })
    });
    let results = futures::future::join_all(tasks).await;

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for result in results {
        match result.expect("task joins") {
            Ok(publication) => winners.push(publication),
            Err(PipelineError::DuplicateDate { date, .. }) => {
                assert_eq!(date, day);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);

    let active = harness
        .store
        .active_challenges_between(day, day)
        .await
        .expect("list");
    assert_eq!(active.len(), 1);

    let winner = &winners[0];
    let repeated = publication
        .publish_for_date(winner.challenge.question_id, day)
        .await
        .expect("idempotent repeat");
    assert!(!repeated.created);
    assert_eq!(repeated.challenge.id, winner.challenge.id);
}

#[tokio::test]
async fn maintain_pool_tops_up_to_target_buffer() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    harness.seed_prompt_control("nephrology");
    harness.seed_prompt_control("pharmacology");
    harness.seed_approved(Some(0.91)).await;

    let report = harness.orchestrator.maintain_pool().await.expect("maintain");

    assert_eq!(report.before.available, 1);
    assert_eq!(report.before.health, PoolHealth::Critical);
    assert_eq!(report.top_up.generation_calls, 4);
    assert_eq!(harness.gateway.calls(), 4);
    assert_eq!(report.after.available, 5);
    assert!(report.after.health >= PoolHealth::Good);
}

#[tokio::test]
async fn weekly_batch_schedules_what_the_pool_allows() {
    // No prompt controls: top-up cannot generate anything.
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    for confidence in [0.99, 0.95, 0.93] {
        harness.seed_approved(Some(confidence)).await;
    }
    let start = date(2024, 7, 1);

    let report = harness
        .orchestrator
        .schedule_weekly_batch_from(start)
        .await
        .expect("partial schedule is not an error");

    assert_eq!(harness.gateway.calls(), 0);
    assert_eq!(report.schedule.requested_days, 7);
    assert_eq!(report.schedule.scheduled_count, 3);
    assert_eq!(report.schedule.unfilled_dates.len(), 4);
    let scheduled_dates: Vec<_> = report.schedule.scheduled.iter().map(|slot| slot.date).collect();
    assert_eq!(
        scheduled_dates,
        vec![date(2024, 7, 1), date(2024, 7, 2), date(2024, 7, 3)]
    );
    assert_eq!(report.pool_after.available, 0);
}

#[tokio::test]
async fn weekly_batch_survives_generation_failures() {
    let harness = Harness::new(CountingGateway::failing());
    harness.seed_prompt_control("oncology");
    harness.seed_approved(Some(0.97)).await;

    let report = harness
        .orchestrator
        .schedule_weekly_batch_from(date(2024, 7, 8))
        .await
        .expect("failures during top-up do not abort the batch");

    let cap = harness.orchestrator.tuning().max_generation_attempts;
    assert_eq!(report.top_up.generation_calls, cap);
    assert_eq!(report.top_up.failures, cap);
    // One retry per generation call.
    assert_eq!(harness.gateway.calls(), cap * 2);
    assert_eq!(report.schedule.scheduled_count, 1);
}

#[tokio::test]
async fn weekly_batch_with_empty_pool_reports_insufficient_pool() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));

    let error = harness
        .orchestrator
        .schedule_weekly_batch_from(date(2024, 7, 15))
        .await
        .expect_err("nothing to schedule");

    assert!(matches!(
        error,
        PipelineError::InsufficientPool { open_dates: 7, .. }
    ));
}

#[tokio::test]
async fn community_stats_fold_responses() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    let question = harness.seed_approved(Some(0.95)).await;
    let publication = harness
        .orchestrator
        .publish_question(question.id, date(2024, 6, 21))
        .await
        .expect("publish");
    let challenge_id = publication.challenge.id;

    for was_correct in std::iter::repeat_n(true, 7).chain(std::iter::repeat_n(false, 3)) {
        harness
            .orchestrator
            .record_response(challenge_id, was_correct)
            .await
            .expect("record");
    }

    let stats = harness
        .orchestrator
        .get_stats(challenge_id)
        .await
        .expect("stats");
    assert_eq!(stats.total_responses, 10);
    assert_eq!(stats.correct_responses, 7);
    assert!((stats.correct_percentage - 70.0).abs() < 1e-9);
    assert!((stats.incorrect_percentage - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn publish_today_is_idempotent_for_the_day() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    harness.seed_approved(Some(0.95)).await;
    harness.seed_approved(Some(0.96)).await;
    let today = date(2024, 6, 22);

    let first = harness
        .orchestrator
        .publish_todays_challenge_on(today)
        .await
        .expect("first publish");
    let second = harness
        .orchestrator
        .publish_todays_challenge_on(today)
        .await
        .expect("second call");

    assert!(first.publication.created);
    assert!(!second.publication.created);
    assert_eq!(first.publication.challenge.id, second.publication.challenge.id);
    assert_eq!(harness.store.count_pool().await.expect("count"), 1);
}

#[tokio::test]
async fn deactivated_challenge_frees_the_date_for_a_replacement() {
    let harness = Harness::new(CountingGateway::with_confidence(0.95));
    let original = harness.seed_approved(Some(0.95)).await;
    let replacement = harness.seed_approved(Some(0.90)).await;
    let day = date(2024, 6, 23);

    let published = harness
        .orchestrator
        .publish_question(original.id, day)
        .await
        .expect("publish");
    harness
        .orchestrator
        .deactivate_challenge(published.challenge.id)
        .await
        .expect("deactivate");

    let rejected = harness
        .orchestrator
        .record_response(published.challenge.id, true)
        .await
        .expect_err("inactive challenge");
    assert!(matches!(rejected, PipelineError::InvalidState { .. }));

    let today = harness
        .orchestrator
        .publish_todays_challenge_on(day)
        .await
        .expect("replacement published");
    assert!(today.publication.created);
    assert_eq!(today.publication.challenge.question_id, replacement.id);
}
