//! Pod executor - runs one step as one pod
//!
//! Submits the pod through an injected client, waits for a terminal
//! phase with deadline and abort checks at every poll interval, then
//! captures logs and artifacts best-effort.

use crate::core::context::RunContext;
use crate::core::step::StepDefinition;
use crate::core::template;
use crate::execution::clock::Clock;
use crate::execution::mounts;
use crate::k8s::{Container, EnvVar, ObjectMeta, Pod, PodPhase, PodSpec, Secret};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Environment variable pointing steps at their artifact directory
pub const ARTIFACT_DIR_ENV: &str = "ARTIFACT_DIR";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Errors surfaced by the cluster-facing client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("api error: {0}")]
    Api(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pod-creation/get/delete interface bound to one namespace
///
/// Implemented by the invoking pipeline driver; tests use a fake.
#[async_trait]
pub trait PodClient: Send + Sync {
    async fn create_pod(&self, pod: &Pod) -> Result<(), ClientError>;

    async fn get_pod(&self, name: &str) -> Result<Pod, ClientError>;

    async fn delete_pod(&self, name: &str) -> Result<(), ClientError>;

    async fn create_secret(&self, secret: &Secret) -> Result<(), ClientError>;

    async fn pod_logs(&self, name: &str) -> Result<String, ClientError>;

    /// Copy a directory out of a terminated pod into a local destination
    async fn retrieve_artifacts(
        &self,
        pod_name: &str,
        source_dir: &str,
        dest: &Path,
    ) -> Result<(), ClientError>;
}

/// Why a step failed; identical for phase control flow, distinguishable
/// for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Non-zero container exit reported by the pod
    PodFailed,

    /// The pod could not be created at all
    CreationFailed,

    /// The deadline elapsed before the pod reached a terminal phase
    Timeout,

    /// The caller requested cancellation during the wait
    Aborted,
}

/// Terminal status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed(FailureReason),
    Skipped,
}

/// Outcome of one executed step, consumed by the sequencer for reporting
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub pod_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: StepStatus,

    /// Set when artifact retrieval failed; never fails the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_warning: Option<String>,

    /// Pod logs, captured best-effort
    #[serde(skip)]
    pub logs: Option<String>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, StepStatus::Succeeded)
    }
}

enum WaitOutcome {
    Succeeded,
    PodFailed,
    Timeout,
    Aborted,
}

/// Executes a single step as a pod
pub struct PodExecutor<C> {
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    step_timeout: Duration,
}

impl<C: PodClient> PodExecutor<C> {
    pub fn new(client: Arc<C>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Run one step to a terminal state
    ///
    /// Never returns an error: every failure mode is captured in the
    /// step result so the sequencer can decide how the phase continues.
    pub async fn run_step(
        &self,
        step: &StepDefinition,
        ctx: &RunContext,
        bindings: &BTreeMap<String, String>,
        abort: &AtomicBool,
        deadline: Option<DateTime<Utc>>,
    ) -> StepResult {
        let pod = build_pod(step, ctx, bindings);
        let pod_name = pod.metadata.name.clone();
        let started_at = self.clock.now();

        info!("Executing step {} as pod {}", step.name, pod_name);

        if let Err(e) = self.client.create_pod(&pod).await {
            error!("Could not create pod {}: {}", pod_name, e);
            let finished_at = self.clock.now();
            return StepResult {
                name: step.name.clone(),
                pod_name,
                started_at,
                finished_at,
                status: StepStatus::Failed(FailureReason::CreationFailed),
                artifact_warning: None,
                logs: None,
            };
        }

        let outcome = self.wait_for_pod(&pod_name, abort, deadline).await;

        let logs = match self.client.pod_logs(&pod_name).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!("Could not retrieve logs for pod {}: {}", pod_name, e);
                None
            }
        };

        // Artifacts are collected once the pod is terminal, regardless of
        // how it exited; on timeout or abort there is nothing stable to
        // copy.
        let artifact_warning = match outcome {
            WaitOutcome::Succeeded | WaitOutcome::PodFailed => {
                self.gather_artifacts(step, ctx, &pod_name).await
            }
            _ => None,
        };

        let status = match outcome {
            WaitOutcome::Succeeded => {
                info!("Step {} succeeded", step.name);
                StepStatus::Succeeded
            }
            WaitOutcome::PodFailed => {
                error!("Step {} failed: pod {} reported failure", step.name, pod_name);
                StepStatus::Failed(FailureReason::PodFailed)
            }
            WaitOutcome::Timeout => {
                error!("Step {} timed out waiting for pod {}", step.name, pod_name);
                StepStatus::Failed(FailureReason::Timeout)
            }
            WaitOutcome::Aborted => {
                warn!("Step {} aborted while waiting for pod {}", step.name, pod_name);
                StepStatus::Failed(FailureReason::Aborted)
            }
        };

        StepResult {
            name: step.name.clone(),
            pod_name,
            started_at,
            finished_at: self.clock.now(),
            status,
            artifact_warning,
            logs,
        }
    }

    /// Poll until the pod reaches a terminal phase, the deadline elapses,
    /// or the caller aborts
    async fn wait_for_pod(
        &self,
        pod_name: &str,
        abort: &AtomicBool,
        deadline: Option<DateTime<Utc>>,
    ) -> WaitOutcome {
        let step_deadline = self.clock.now()
            + chrono::Duration::from_std(self.step_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(2));
        let deadline = match deadline {
            Some(overall) => overall.min(step_deadline),
            None => step_deadline,
        };

        loop {
            if abort.load(Ordering::SeqCst) {
                return WaitOutcome::Aborted;
            }
            if self.clock.now() >= deadline {
                return WaitOutcome::Timeout;
            }
            match self.client.get_pod(pod_name).await {
                Ok(pod) if pod.status.phase.is_terminal() => {
                    return if pod.status.phase == PodPhase::Succeeded {
                        WaitOutcome::Succeeded
                    } else {
                        WaitOutcome::PodFailed
                    };
                }
                Ok(_) => {}
                // Transient API errors do not fail the wait; the deadline
                // bounds how long we keep retrying.
                Err(e) => warn!("Could not get pod {}: {}", pod_name, e),
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }

    /// Copy the declared artifact directory under
    /// `{artifact_root}/{run}/{step}`; failures are reported, never fatal
    async fn gather_artifacts(
        &self,
        step: &StepDefinition,
        ctx: &RunContext,
        pod_name: &str,
    ) -> Option<String> {
        let source_dir = step.artifact_dir.as_deref()?;
        let root = ctx.artifact_root.as_deref()?;
        let dest = root.join(&ctx.run_name).join(&step.name);

        if let Err(e) = std::fs::create_dir_all(&dest) {
            let msg = format!("could not create artifact directory {}: {}", dest.display(), e);
            warn!("{}", msg);
            return Some(msg);
        }
        match self
            .client
            .retrieve_artifacts(pod_name, source_dir, &dest)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                let msg = format!("could not retrieve artifacts from pod {}: {}", pod_name, e);
                warn!("{}", msg);
                Some(msg)
            }
        }
    }
}

/// Construct the pod for one step
///
/// Host aliases are template-resolved here, immediately before pod
/// construction, against the step's live environment.
pub fn build_pod(step: &StepDefinition, ctx: &RunContext, bindings: &BTreeMap<String, String>) -> Pod {
    let mut env = ctx.release_env();
    if !ctx.job.is_empty() {
        env.push(EnvVar {
            name: "JOB_NAME".to_string(),
            value: ctx.job.clone(),
        });
    }
    if !ctx.build_id.is_empty() {
        env.push(EnvVar {
            name: "BUILD_ID".to_string(),
            value: ctx.build_id.clone(),
        });
    }
    env.push(EnvVar {
        name: "NAMESPACE".to_string(),
        value: ctx.namespace.clone(),
    });
    env.extend(template::resolve_parameters(&step.environment, bindings));
    if let Some(dir) = &step.artifact_dir {
        env.push(EnvVar {
            name: ARTIFACT_DIR_ENV.to_string(),
            value: dir.clone(),
        });
    }

    let host_aliases = template::resolve_host_aliases(&step.host_aliases, &env);

    let mut pod = Pod {
        metadata: ObjectMeta {
            name: ctx.pod_name(&step.name),
            namespace: ctx.namespace.clone(),
            labels: BTreeMap::from([
                ("stagerun/run".to_string(), ctx.run_name.clone()),
                ("stagerun/step".to_string(), step.name.clone()),
            ]),
        },
        spec: PodSpec {
            containers: vec![Container {
                name: "test".to_string(),
                image: step.from.clone(),
                command: vec![
                    "/bin/bash".to_string(),
                    "-c".to_string(),
                    format!("#!/bin/bash\nset -eu\n{}", step.commands),
                ],
                env,
                volume_mounts: Vec::new(),
            }],
            restart_policy: "Never".to_string(),
            volumes: Vec::new(),
            host_aliases,
        },
        ..Default::default()
    };

    mounts::add_shared_dir(&mut pod, &ctx.run_name, step.readonly_shared_dir);
    mounts::add_credentials(&step.credentials, &mut pod);
    pod
}
