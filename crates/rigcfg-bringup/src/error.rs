use rigcfg_core::ModelError;
use rigcfg_hal::HardwareError;
use thiserror::Error;

use crate::orchestrator::Stage;

#[derive(Error, Debug)]
pub enum BringupError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Initialization of {0} failed and awaits a decision")]
    PendingDecision(String),
    #[error("No initialization failure to resolve")]
    NothingToResolve,
    #[error("Cannot {action} while bring-up is {stage:?}")]
    InvalidStage { action: &'static str, stage: Stage },
}

pub type Result<T> = std::result::Result<T, BringupError>;
