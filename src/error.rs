//! Fault taxonomy for the capture loop.
//!
//! Faults travel inside `anyhow::Error`; callers that need to distinguish a
//! startup failure from an in-loop failure downcast to [`LoopFault`].

use std::fmt;

use crate::capture::Stage;

/// Classification of a fatal loop fault.
///
/// Capture misses are not listed here: a missing frame is absorbed by the loop
/// and never surfaces as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// The loop configuration failed validation.
    Config,
    /// The frame source could not be opened.
    Open,
    /// The model could not be loaded onto the backend.
    Load,
    /// A captured frame could not be turned into a tensor.
    Preprocess,
    /// The backend rejected or failed an invocation.
    Invoke,
    /// The backend output did not match the decoder's schema.
    Decode,
}

impl FaultKind {
    /// Startup faults happen before the loop enters `Running`.
    pub fn is_startup(self) -> bool {
        matches!(self, FaultKind::Config | FaultKind::Open | FaultKind::Load)
    }

    fn code(self) -> &'static str {
        match self {
            FaultKind::Config => "CONFIG_ERROR",
            FaultKind::Open => "OPEN_ERROR",
            FaultKind::Load => "LOAD_ERROR",
            FaultKind::Preprocess => "PREPROCESS_ERROR",
            FaultKind::Invoke => "INVOKE_ERROR",
            FaultKind::Decode => "DECODE_ERROR",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoopFault {
    pub kind: FaultKind,
    /// Stage the loop was in when the fault escaped, if it was running.
    pub stage: Option<Stage>,
    pub message: String,
}

impl LoopFault {
    pub fn startup(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: None,
            message: message.into(),
        }
    }

    pub fn in_loop(kind: FaultKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: Some(stage),
            message: message.into(),
        }
    }
}

impl fmt::Display for LoopFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} during {}: {}", self.kind.code(), stage, self.message),
            None => write!(f, "{}: {}", self.kind.code(), self.message),
        }
    }
}

impl std::error::Error for LoopFault {}

/// Extract the fault kind from an error returned by the loop, if any.
pub fn fault_kind(err: &anyhow::Error) -> Option<FaultKind> {
    err.downcast_ref::<LoopFault>().map(|fault| fault.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_faults_are_classified() {
        assert!(FaultKind::Config.is_startup());
        assert!(FaultKind::Open.is_startup());
        assert!(FaultKind::Load.is_startup());
        assert!(!FaultKind::Invoke.is_startup());
        assert!(!FaultKind::Preprocess.is_startup());
    }

    #[test]
    fn fault_survives_anyhow_round_trip() {
        let err: anyhow::Error =
            LoopFault::in_loop(FaultKind::Invoke, Stage::Inferring, "shape mismatch").into();
        assert_eq!(fault_kind(&err), Some(FaultKind::Invoke));
        assert_eq!(err.to_string(), "INVOKE_ERROR during inferring: shape mismatch");
    }
}
