//! Run configuration from YAML
//!
//! Serde-facing config structs are converted into the domain `PhaseList`
//! after validation; every configuration error is detected here, before
//! any pod is created.

use crate::core::step::{CredentialReference, Phase, PhaseList, StepDefinition, StepParameter};
use crate::core::template;
use crate::k8s::HostAlias;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Configuration errors, all detected before pod creation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate step name {name:?} in {phase} phase")]
    DuplicateStepName { phase: Phase, name: String },

    #[error("step name {0:?} is not a valid pod name fragment")]
    InvalidStepReference(String),

    #[error("step {step:?}: parameter {name:?} has no binding and no default")]
    UnresolvedParameter { step: String, name: String },

    #[error("step {step:?}: credentials {first} and {second} both mount as {name:?}")]
    CredentialCollision {
        step: String,
        name: String,
        first: String,
        second: String,
    },
}

/// Top-level run configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run name
    pub name: String,

    /// Cluster profile, when the workload needs leased resources
    #[serde(default)]
    pub cluster_profile: Option<String>,

    /// Test-level environment bindings
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Images the internal pipeline builds, for dependency analysis
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub pre: Vec<StepConfig>,

    #[serde(default)]
    pub test: Vec<StepConfig>,

    #[serde(default)]
    pub post: Vec<StepConfig>,

    /// Skip the whole post phase when nothing failed and every post step
    /// is individually optional-on-success
    #[serde(default)]
    pub allow_skip_on_success: bool,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within its phase
    #[serde(rename = "as")]
    pub name: String,

    /// Source image reference
    pub from: String,

    /// Shell command body
    #[serde(default)]
    pub commands: String,

    /// Declared environment parameters
    #[serde(default)]
    pub environment: Vec<ParameterConfig>,

    /// Container directory collected as artifacts after the pod ends
    #[serde(default)]
    pub artifact_dir: Option<String>,

    #[serde(default)]
    pub host_aliases: Vec<HostAliasConfig>,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default)]
    pub readonly_shared_dir: bool,

    #[serde(default)]
    pub optional_on_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,

    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostAliasConfig {
    pub ip: String,
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub namespace: String,
    pub name: String,
    pub mount_path: String,
}

impl RunConfig {
    /// Parse a run configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a run configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Validate and convert into the domain phase list
    pub fn to_phase_list(&self) -> Result<PhaseList, ConfigError> {
        let phases = PhaseList {
            pre: convert_phase(Phase::Pre, &self.pre)?,
            test: convert_phase(Phase::Test, &self.test)?,
            post: convert_phase(Phase::Post, &self.post)?,
            cluster_profile: self.cluster_profile.clone(),
            environment: self.environment.clone(),
            allow_skip_on_success: self.allow_skip_on_success,
        };
        for step in phases.all_steps() {
            check_credentials(step)?;
        }
        Ok(phases)
    }
}

fn convert_phase(phase: Phase, configs: &[StepConfig]) -> Result<Vec<StepDefinition>, ConfigError> {
    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(configs.len());
    for config in configs {
        if !is_valid_name(&config.name) {
            return Err(ConfigError::InvalidStepReference(config.name.clone()));
        }
        if !seen.insert(config.name.clone()) {
            return Err(ConfigError::DuplicateStepName {
                phase,
                name: config.name.clone(),
            });
        }
        steps.push(StepDefinition {
            name: config.name.clone(),
            from: config.from.clone(),
            commands: config.commands.clone(),
            environment: config
                .environment
                .iter()
                .map(|p| StepParameter {
                    name: p.name.clone(),
                    default: p.default.clone(),
                })
                .collect(),
            artifact_dir: config.artifact_dir.clone(),
            host_aliases: config
                .host_aliases
                .iter()
                .map(|a| HostAlias {
                    ip: a.ip.clone(),
                    hostnames: a.hostnames.clone(),
                })
                .collect(),
            credentials: config
                .credentials
                .iter()
                .map(|c| CredentialReference {
                    namespace: c.namespace.clone(),
                    name: c.name.clone(),
                    mount_path: c.mount_path.clone(),
                })
                .collect(),
            readonly_shared_dir: config.readonly_shared_dir,
            optional_on_success: config.optional_on_success,
        });
    }
    Ok(steps)
}

/// Pod names are DNS labels; step names become their suffix
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Two distinct source secrets may still collide after the
/// namespace-dash-name disambiguation (e.g. `a-b/c` and `a/b-c`)
fn check_credentials(step: &StepDefinition) -> Result<(), ConfigError> {
    let mut seen: Vec<&CredentialReference> = Vec::new();
    for cred in &step.credentials {
        if let Some(prev) = seen.iter().find(|prev| {
            prev.volume_name() == cred.volume_name()
                && (prev.namespace != cred.namespace || prev.name != cred.name)
        }) {
            return Err(ConfigError::CredentialCollision {
                step: step.name.clone(),
                name: cred.volume_name(),
                first: format!("{}/{}", prev.namespace, prev.name),
                second: format!("{}/{}", cred.namespace, cred.name),
            });
        }
        seen.push(cred);
    }
    Ok(())
}

/// Check that every declared parameter of every step resolves against
/// the given bindings plus the test-level environment
///
/// Run this before execution; an unresolvable parameter is a
/// configuration error, caught while no pod exists yet.
pub fn validate_bindings(
    phases: &PhaseList,
    bindings: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    let mut merged = phases.environment.clone();
    merged.extend(bindings.clone());
    for step in phases.all_steps() {
        let resolved = template::resolve_parameters(&step.environment, &merged);
        for param in &step.environment {
            if !resolved.iter().any(|var| var.name == param.name) {
                return Err(ConfigError::UnresolvedParameter {
                    step: step.name.clone(),
                    name: param.name.clone(),
                });
            }
        }
    }
    Ok(())
}
