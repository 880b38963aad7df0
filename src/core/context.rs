//! Run context - identity and bindings for one invocation

use crate::k8s::EnvVar;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Everything the sequencer needs to know about the invocation itself
///
/// Created once per run; its lifetime equals the invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Target namespace for pods and the shared-directory secret
    pub namespace: String,

    /// Run name; pods are named `{run}-{step}` and the shared secret is
    /// named after the run
    pub run_name: String,

    /// Owning CI job name
    pub job: String,

    /// Build identifier assigned by the CI system
    pub build_id: String,

    /// Unique execution id for this invocation
    pub execution_id: Uuid,

    /// Release-image and leased-resource bindings injected into every
    /// step's environment (`RELEASE_IMAGE_INITIAL`, `RELEASE_IMAGE_LATEST`,
    /// lease values)
    pub env: BTreeMap<String, String>,

    /// Local filesystem root for artifact capture; `None` disables
    /// artifact collection
    pub artifact_root: Option<PathBuf>,
}

impl RunContext {
    pub fn new(namespace: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            run_name: run_name.into(),
            job: String::new(),
            build_id: String::new(),
            execution_id: Uuid::new_v4(),
            env: BTreeMap::new(),
            artifact_root: None,
        }
    }

    /// Pod name for one step of this run
    pub fn pod_name(&self, step_name: &str) -> String {
        format!("{}-{}", self.run_name, step_name)
    }

    /// Run-level bindings as container environment variables
    pub fn release_env(&self) -> Vec<EnvVar> {
        self.env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: value.clone(),
            })
            .collect()
    }
}
