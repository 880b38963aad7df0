//! stagerun - a multi-phase CI test sequencer
//!
//! Runs an ordered pre/test/post sequence of test workloads as
//! Kubernetes pods: dependency-link analysis, environment templating,
//! credential and shared-storage mounting, pod execution, and structured
//! reporting of partial results.

pub mod cli;
pub mod core;
pub mod execution;
pub mod k8s;
pub mod report;

// Re-export commonly used types
pub use crate::core::{Phase, PhaseList, PipelineInventory, RunContext, StepDefinition, StepLink};
pub use crate::execution::{
    Clock, FailureReason, PhaseSequencer, PhaseState, PodClient, PodExecutor, SequencerError,
    StepResult, StepStatus, SystemClock,
};
pub use crate::report::RunReport;
