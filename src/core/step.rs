//! Step and phase domain model

use crate::k8s::HostAlias;
use std::fmt;

/// A declared environment parameter of a step
///
/// The value is resolved at run time: a live binding wins over the
/// declared default, and a parameter with neither is simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepParameter {
    pub name: String,
    pub default: Option<String>,
}

/// A reference to a source secret mounted into a step's pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReference {
    /// Namespace holding the source secret
    pub namespace: String,

    /// Name of the source secret
    pub name: String,

    /// Where the secret is mounted inside the container
    pub mount_path: String,
}

impl CredentialReference {
    /// Synthetic volume/mount name, unique per (namespace, name)
    pub fn volume_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }
}

/// One unit of work, executed as exactly one pod
///
/// Immutable once constructed; owned by the phase list that contains it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepDefinition {
    /// Unique step name within its phase
    pub name: String,

    /// Source image reference: a pipeline-internal tag, a `stream:tag`
    /// pair, or a named image resolved from the release namespace
    pub from: String,

    /// Shell command body run in the container
    pub commands: String,

    /// Declared environment parameters
    pub environment: Vec<StepParameter>,

    /// Directory inside the container whose contents are collected
    /// after the pod terminates
    pub artifact_dir: Option<String>,

    /// Host aliases attached to the pod spec; IPs and hostnames may
    /// embed `${VAR}` / `$VAR` references resolved against the step's
    /// live environment
    pub host_aliases: Vec<HostAlias>,

    /// Credentials mounted into the pod
    pub credentials: Vec<CredentialReference>,

    /// Mount the shared directory read-only for this step
    pub readonly_shared_dir: bool,

    /// Skip this step when every phase run so far succeeded; it still
    /// runs after any failure, since post steps are frequently cleanup
    pub optional_on_success: bool,
}

/// One of the three phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Pre,
    Test,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Test => "test",
            Phase::Post => "post",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved, flattened phase list consumed by the sequencer
#[derive(Debug, Clone, Default)]
pub struct PhaseList {
    pub pre: Vec<StepDefinition>,
    pub test: Vec<StepDefinition>,
    pub post: Vec<StepDefinition>,

    /// Cluster profile declared for the whole run, when the workload
    /// needs externally leased resources
    pub cluster_profile: Option<String>,

    /// Test-level environment bindings, the live source for parameter
    /// resolution
    pub environment: std::collections::BTreeMap<String, String>,

    /// Permit omitting the whole post phase when nothing failed and
    /// every post step is individually optional-on-success
    pub allow_skip_on_success: bool,
}

impl PhaseList {
    /// Steps of one phase, in declared order
    pub fn steps(&self, phase: Phase) -> &[StepDefinition] {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Test => &self.test,
            Phase::Post => &self.post,
        }
    }

    /// All steps across all phases, in phase order
    pub fn all_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.pre.iter().chain(self.test.iter()).chain(self.post.iter())
    }
}
