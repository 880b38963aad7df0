//! Execution engine for stagerun

pub mod clock;
pub mod mounts;
pub mod pod;
pub mod sequencer;

pub use clock::{Clock, SystemClock};
pub use pod::{ClientError, FailureReason, PodClient, PodExecutor, StepResult, StepStatus};
pub use sequencer::{PhaseSequencer, PhaseState, SequencerError};
