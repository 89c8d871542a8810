use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::pfs::SaveError;
use crate::core::models::constraints::ConstraintError;
use crate::core::models::sequence::SequenceError;

/// Failure taxonomy of the fold engine.
///
/// `Usage` and `Consistency` follow the split the numerical core needs:
/// usage errors are caller mistakes and fatal to the current call;
/// consistency errors indicate a defect in the recurrence or rescaling
/// logic and are never silently corrected. Floating-point drift is not an
/// error: it is prevented proactively by the rescaling controller, and only
/// surfaces here as `ScalingExhausted` when repeated correction cannot keep
/// magnitudes in range.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Fold cancelled at span {span}")]
    Cancelled { span: usize },

    #[error(
        "Rescaling could not keep magnitudes in range (factor {factor:e} at span {span}); \
         re-run with a different initial scaling factor"
    )]
    ScalingExhausted { span: usize, factor: f64 },

    #[error("Invalid sequence: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Invalid constraints: {0}")]
    Constraints(#[from] ConstraintError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Save file error: {0}")]
    Save(#[from] SaveError),
}

impl EngineError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        EngineError::Usage(message.into())
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        EngineError::Consistency(message.into())
    }
}
