//! Test utility functions for stagerun

use async_trait::async_trait;
use stagerun::core::step::{Phase, PhaseList, StepDefinition};
use stagerun::core::RunContext;
use stagerun::execution::pod::{ClientError, PodClient, PodExecutor};
use stagerun::execution::sequencer::{PhaseSequencer, SequencerError};
use stagerun::execution::{PhaseState, StepResult, SystemClock};
use stagerun::k8s::{ObjectMeta, Pod, PodPhase, PodStatus, Secret};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake cluster client where every pod reaches a terminal phase on the
/// first poll
///
/// Pods named in `failures` report `Failed`; everything else succeeds.
/// Created objects are recorded in order for assertions.
#[derive(Default)]
pub struct FakePodClient {
    failures: BTreeSet<String>,
    fail_artifacts: bool,
    abort_during: Option<(String, Arc<AtomicBool>)>,
    created_pods: Mutex<Vec<Pod>>,
    created_secrets: Mutex<Vec<Secret>>,
}

impl FakePodClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose named pods report failure
    pub fn failing<'a, I: IntoIterator<Item = &'a str>>(pods: I) -> Self {
        Self {
            failures: pods.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    /// Client that raises the abort flag while the named pod is polled,
    /// leaving the pod pending forever
    pub fn aborting_during(pod: &str, flag: Arc<AtomicBool>) -> Self {
        Self {
            abort_during: Some((pod.to_string(), flag)),
            ..Default::default()
        }
    }

    /// Client whose artifact retrieval always errors
    pub fn with_artifact_errors(mut self) -> Self {
        self.fail_artifacts = true;
        self
    }

    pub fn created_pods(&self) -> Vec<Pod> {
        self.created_pods.lock().unwrap().clone()
    }

    pub fn created_pod_names(&self) -> Vec<String> {
        self.created_pods
            .lock()
            .unwrap()
            .iter()
            .map(|pod| pod.metadata.name.clone())
            .collect()
    }

    pub fn created_secret_names(&self) -> Vec<String> {
        self.created_secrets
            .lock()
            .unwrap()
            .iter()
            .map(|secret| secret.metadata.name.clone())
            .collect()
    }
}

#[async_trait]
impl PodClient for FakePodClient {
    async fn create_pod(&self, pod: &Pod) -> Result<(), ClientError> {
        self.created_pods.lock().unwrap().push(pod.clone());
        Ok(())
    }

    async fn get_pod(&self, name: &str) -> Result<Pod, ClientError> {
        let phase = match &self.abort_during {
            Some((pod, flag)) if pod == name => {
                flag.store(true, Ordering::SeqCst);
                PodPhase::Pending
            }
            _ if self.failures.contains(name) => PodPhase::Failed,
            _ => PodPhase::Succeeded,
        };
        Ok(Pod {
            metadata: ObjectMeta {
                name: name.to_string(),
                ..Default::default()
            },
            status: PodStatus { phase },
            ..Default::default()
        })
    }

    async fn delete_pod(&self, _name: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), ClientError> {
        self.created_secrets.lock().unwrap().push(secret.clone());
        Ok(())
    }

    async fn pod_logs(&self, name: &str) -> Result<String, ClientError> {
        Ok(format!("logs of {name}"))
    }

    async fn retrieve_artifacts(
        &self,
        pod_name: &str,
        source_dir: &str,
        dest: &Path,
    ) -> Result<(), ClientError> {
        if self.fail_artifacts {
            return Err(ClientError::Api(format!(
                "could not copy {source_dir} out of {pod_name}"
            )));
        }
        std::fs::write(dest.join("artifacts.txt"), source_dir)?;
        Ok(())
    }
}

/// Everything a scenario needs to assert on after a run
pub struct RunOutcome {
    pub result: Result<(), SequencerError>,
    pub results: Vec<StepResult>,
    pub states: BTreeMap<Phase, PhaseState>,
}

/// Run the phase list against a fake client with fast polling
pub async fn run_phases(client: Arc<FakePodClient>, phases: PhaseList, ctx: RunContext) -> RunOutcome {
    run_phases_with_abort(client, phases, ctx, Arc::new(AtomicBool::new(false))).await
}

/// Like `run_phases`, with a caller-owned abort flag
pub async fn run_phases_with_abort(
    client: Arc<FakePodClient>,
    phases: PhaseList,
    ctx: RunContext,
    abort: Arc<AtomicBool>,
) -> RunOutcome {
    let executor = PodExecutor::new(client.clone(), Arc::new(SystemClock))
        .with_poll_interval(Duration::from_millis(1))
        .with_step_timeout(Duration::from_secs(5));
    let mut sequencer = PhaseSequencer::new(client, executor, phases, ctx);

    let result = sequencer.run(abort, None).await;
    let states = [Phase::Pre, Phase::Test, Phase::Post]
        .into_iter()
        .map(|phase| (phase, sequencer.phase_state(phase)))
        .collect();

    RunOutcome {
        result,
        results: sequencer.into_results(),
        states,
    }
}

/// A minimal step running from a pipeline image
pub fn step(name: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        from: "src".to_string(),
        commands: format!("commands of {name}"),
        ..Default::default()
    }
}

/// Two steps per phase, with the last post step optional on success
pub fn two_step_phases() -> PhaseList {
    let mut post1 = step("post1");
    post1.optional_on_success = true;
    PhaseList {
        pre: vec![step("pre0"), step("pre1")],
        test: vec![step("test0"), step("test1")],
        post: vec![step("post0"), post1],
        ..Default::default()
    }
}

/// Assert the exact, ordered pod names a run created
pub fn assert_pod_order(client: &FakePodClient, expected: &[&str]) {
    assert_eq!(client.created_pod_names(), expected);
}

/// Assert the exact, ordered step names in the result list
pub fn assert_result_order(results: &[StepResult], expected: &[&str]) {
    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, expected);
}

pub fn find_result<'a>(results: &'a [StepResult], name: &str) -> &'a StepResult {
    results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for step {name:?}"))
}

pub fn assert_step_succeeded(results: &[StepResult], name: &str) {
    let result = find_result(results, name);
    assert!(result.succeeded(), "step {name:?} did not succeed: {result:?}");
}

pub fn assert_step_failed(results: &[StepResult], name: &str) {
    let result = find_result(results, name);
    assert!(!result.succeeded(), "step {name:?} unexpectedly succeeded");
}
