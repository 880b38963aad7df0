//! Test: failure containment across phases
//!
//! Pre and test short-circuit on failure; post is the cleanup phase and
//! always runs.

use crate::helpers::*;
use stagerun::core::{Phase, RunContext};
use stagerun::execution::sequencer::SequencerError;
use stagerun::execution::PhaseState;
use std::sync::Arc;

fn assert_steps_failed(outcome: &RunOutcome, expected: &[&str]) {
    match &outcome.result {
        Err(SequencerError::StepsFailed { run, steps }) => {
            assert_eq!(run, "test");
            assert_eq!(steps, expected);
        }
        other => panic!("expected StepsFailed, got {other:?}"),
    }
}

/// A pre failure skips the rest of pre and the whole test phase; post
/// still runs, including steps that are only optional on success
#[tokio::test]
async fn test_pre_failure_skips_test_phase() {
    let client = Arc::new(FakePodClient::failing(["test-pre0"]));
    let outcome = run_phases(
        client.clone(),
        two_step_phases(),
        RunContext::new("ns", "test"),
    )
    .await;

    assert_steps_failed(&outcome, &["pre0"]);
    assert_pod_order(&client, &["test-pre0", "test-post0", "test-post1"]);
    assert_result_order(&outcome.results, &["pre0", "post0", "post1"]);
    assert_step_failed(&outcome.results, "pre0");
    assert_step_succeeded(&outcome.results, "post0");
    assert_step_succeeded(&outcome.results, "post1");

    // No pod ever existed for the test phase.
    assert_eq!(outcome.states[&Phase::Pre], PhaseState::Completed { failed: true });
    assert_eq!(outcome.states[&Phase::Test], PhaseState::NotStarted);
    assert_eq!(outcome.states[&Phase::Post], PhaseState::Completed { failed: false });
}

/// A test failure short-circuits the test phase but not post
#[tokio::test]
async fn test_test_failure_still_runs_post() {
    let client = Arc::new(FakePodClient::failing(["test-test0"]));
    let outcome = run_phases(
        client.clone(),
        two_step_phases(),
        RunContext::new("ns", "test"),
    )
    .await;

    assert_steps_failed(&outcome, &["test0"]);
    assert_pod_order(
        &client,
        &[
            "test-pre0",
            "test-pre1",
            "test-test0",
            "test-post0",
            "test-post1",
        ],
    );
    assert_step_failed(&outcome.results, "test0");
    assert_step_succeeded(&outcome.results, "post1");
}

/// A post failure does not stop the remaining post steps, and does not
/// revive optional steps already deemed skippable at post entry
#[tokio::test]
async fn test_post_failure_runs_remaining_post_steps() {
    let mut phases = two_step_phases();
    phases.allow_skip_on_success = true;

    let client = Arc::new(FakePodClient::failing(["test-post0"]));
    let outcome = run_phases(client.clone(), phases, RunContext::new("ns", "test")).await;

    assert_steps_failed(&outcome, &["post0"]);
    // With skipping allowed, post1 is optional on success; pre and test
    // succeeded, so it was skipped before post0's failure was known.
    assert_pod_order(
        &client,
        &[
            "test-pre0",
            "test-pre1",
            "test-test0",
            "test-test1",
            "test-post0",
        ],
    );
    assert_step_failed(&outcome.results, "post0");
    assert_eq!(outcome.states[&Phase::Post], PhaseState::Completed { failed: true });
}

/// Consecutive post failures are all collected into the aggregate error
#[tokio::test]
async fn test_multiple_post_failures_aggregate() {
    let client = Arc::new(FakePodClient::failing(["test-post0", "test-post1"]));
    let mut phases = two_step_phases();
    phases.post[1].optional_on_success = false;
    let outcome = run_phases(client, phases, RunContext::new("ns", "test")).await;

    assert_steps_failed(&outcome, &["post0", "post1"]);
}
