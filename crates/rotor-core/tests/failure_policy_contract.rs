//! Contract: failure classification and retry policy
//!
//! Transient provider failures leave rotation state untouched apart from
//! the failure streak and retry at the next tick; auth faults quarantine
//! the whole account for the tick; independent jobs are unaffected by a
//! neighbor's failure.

mod common;

use common::*;
use rotor_core::RecordKind;

#[tokio::test]
async fn transient_failure_keeps_state_and_retries_next_tick() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["1.1.1.1", "2.2.2.2"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "1.1.1.1");
    world.provider.fail_updates_with(FailKind::Transient);

    // Provider 502s the update.
    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.failed, vec!["job-1"]);

    let state = world.job_state("job-1").await;
    assert_eq!(state.last_fired_at, None);
    assert_eq!(state.cursor, 0);
    assert_eq!(state.consecutive_failures, 1);
    assert_eq!(world.provider.record_value("rec-1"), ip("1.1.1.1"));

    // Next tick retries; success resets the streak.
    world.provider.clear_failures();
    world.clock.advance_minutes(1);
    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.fired, vec!["job-1"]);

    let state = world.job_state("job-1").await;
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(world.provider.record_value("rec-1"), ip("2.2.2.2"));
}

#[tokio::test]
async fn failure_streak_accumulates_across_ticks() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["1.1.1.1", "2.2.2.2"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "1.1.1.1");
    world.provider.fail_updates_with(FailKind::Transient);

    for expected in 1..=4u32 {
        world.engine.tick().await.unwrap();
        assert_eq!(
            world.job_state("job-1").await.consecutive_failures,
            expected
        );
        world.clock.advance_minutes(1);
    }
}

#[tokio::test]
async fn auth_fault_poisons_the_account_for_the_tick() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["1.1.1.1", "2.2.2.2"]));
    config.upsert_job(single_job("job-2", "rec-2", 5, &["3.3.3.3", "4.4.4.4"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "1.1.1.1");
    world.provider.seed_record("rec-2", RecordKind::A, "3.3.3.3");
    world.provider.fail_updates_with(FailKind::Auth);

    let report = world.engine.tick().await.unwrap();
    let mut quarantined = report.quarantined.clone();
    quarantined.sort();
    assert_eq!(quarantined, vec!["job-1", "job-2"]);

    // Only the first job was evaluated at all; the second was cut off
    // by the poisoned account before its record was even read.
    assert!(world.provider.reads().contains(&"rec-1".to_string()));
    assert!(!world.provider.reads().contains(&"rec-2".to_string()));
    assert_eq!(world.provider.updates().len(), 0);
    assert_eq!(world.job_state("job-1").await.consecutive_failures, 0);
    assert_eq!(world.job_state("job-2").await.consecutive_failures, 0);
}

#[tokio::test]
async fn record_scope_fault_does_not_take_down_other_jobs() {
    let mut config = base_config();
    config.upsert_job(single_job("job-bad", "rec-gone", 5, &["1.1.1.1", "2.2.2.2"]));
    config.upsert_job(single_job("job-good", "rec-2", 5, &["3.3.3.3", "4.4.4.4"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-2", RecordKind::A, "3.3.3.3");

    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.quarantined, vec!["job-bad"]);
    assert_eq!(report.fired, vec!["job-good"]);
    assert_eq!(world.provider.record_value("rec-2"), ip("4.4.4.4"));
}

#[tokio::test]
async fn state_persists_per_job_not_per_tick() {
    // Two jobs: the first fires, the second fails transiently. The
    // first job's state must already be durable.
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["1.1.1.1", "2.2.2.2"]));
    config.upsert_job(single_job("job-2", "rec-2", 5, &["3.3.3.3", "4.4.4.4"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "1.1.1.1");
    world.provider.seed_record("rec-2", RecordKind::A, "3.3.3.3");
    world.provider.fail_record("rec-2");

    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.fired, vec!["job-1"]);
    assert_eq!(report.failed, vec!["job-2"]);

    assert_eq!(world.job_state("job-1").await.last_fired_at, Some(t0()));
    assert_eq!(world.job_state("job-2").await.last_fired_at, None);
}
