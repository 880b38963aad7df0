//! Core domain models for stagerun
//!
//! This module defines the fundamental data structures that represent
//! phases, steps, dependency links, and the run context.

pub mod config;
pub mod context;
pub mod link;
pub mod step;
pub mod template;

pub use context::*;
pub use link::{PipelineInventory, StepLink};
pub use step::*;
