//! rigcfg Bring-up - drives hardware from a rig model
//!
//! This crate provides:
//! - The staged bring-up orchestrator with recoverable initialization failures
//! - Helpers that refresh the model from hardware and push model state back

pub mod error;
pub mod orchestrator;
pub mod sync;

pub use error::{BringupError, Result};
pub use orchestrator::{BringupReport, InitFailure, InitStep, Orchestrator, Stage};
