//! Contract: single-record rotation
//!
//! The pick never lands on the live value while a distinct alternative
//! exists in the pool, and a one-entry pool still fires as a permitted
//! no-op.

mod common;

use common::*;
use rotor_core::RecordKind;

#[tokio::test]
async fn never_rotates_to_the_live_value() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["9.9.9.9", "8.8.8.8"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "9.9.9.9");

    // Candidate after cursor 0 is 8.8.8.8, distinct from live.
    world.engine.tick().await.unwrap();
    assert_eq!(world.provider.record_value("rec-1"), ip("8.8.8.8"));
    assert_eq!(world.job_state("job-1").await.cursor, 1);

    // Next firing wraps back to 9.9.9.9.
    world.clock.advance_minutes(5);
    world.engine.tick().await.unwrap();
    assert_eq!(world.provider.record_value("rec-1"), ip("9.9.9.9"));
    assert_eq!(world.job_state("job-1").await.cursor, 0);

    // No update ever wrote the value that was already live.
    let mut live = ip("9.9.9.9");
    for (_, written) in world.provider.updates() {
        assert_ne!(written, live);
        live = written;
    }
}

#[tokio::test]
async fn advances_past_a_candidate_equal_to_live() {
    let mut config = base_config();
    config.upsert_job(single_job(
        "job-1",
        "rec-1",
        5,
        &["1.0.0.1", "2.0.0.2", "3.0.0.3"],
    ));

    let world = TestWorld::new(config).await;
    // Live value happens to equal the entry the cursor points at next.
    world.provider.seed_record("rec-1", RecordKind::A, "2.0.0.2");

    world.engine.tick().await.unwrap();
    assert_eq!(world.provider.record_value("rec-1"), ip("3.0.0.3"));
    assert_eq!(world.job_state("job-1").await.cursor, 2);
}

#[tokio::test]
async fn one_entry_pool_fires_as_noop() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-1", 5, &["7.7.7.7"]));

    let world = TestWorld::new(config).await;
    world.provider.seed_record("rec-1", RecordKind::A, "7.7.7.7");

    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.fired, vec!["job-1"]);
    assert_eq!(world.provider.record_value("rec-1"), ip("7.7.7.7"));
    assert_eq!(world.job_state("job-1").await.last_fired_at, Some(t0()));
}

#[tokio::test]
async fn missing_record_quarantines_the_job() {
    let mut config = base_config();
    config.upsert_job(single_job("job-1", "rec-gone", 5, &["1.1.1.1", "2.2.2.2"]));

    let world = TestWorld::new(config).await;

    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.quarantined, vec!["job-1"]);

    // State untouched: no firing, no failure streak.
    let state = world.job_state("job-1").await;
    assert_eq!(state.last_fired_at, None);
    assert_eq!(state.consecutive_failures, 0);

    // The job is retried on the next tick once the record exists.
    world.provider.seed_record("rec-gone", RecordKind::A, "1.1.1.1");
    world.clock.advance_minutes(1);
    let report = world.engine.tick().await.unwrap();
    assert_eq!(report.fired, vec!["job-1"]);
}
