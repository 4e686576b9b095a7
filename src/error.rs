//! Custom error types for the control client.
//!
//! This module defines `CliError`, the single error type returned by every core
//! operation. Using the `thiserror` crate, it gives a centralized taxonomy for
//! everything that can go wrong between the command line and the backend.
//!
//! ## Error Hierarchy
//!
//! - **Reachability**: `BackendUnreachable`, `BackendDead`, `BackendStopped` describe
//!   whether the backend can be talked to at all.
//! - **Resolution**: `NotFound`, `NotAttribute`, `NotDataFlow`, `InvalidAxis` are raised
//!   locally, before any remote mutation is attempted.
//! - **Input**: `Conversion`, `UnsupportedType`, `OutOfBounds`, `Usage` reject what the
//!   user typed.
//! - **Remote outcome**: `RemoteRejected`, `MotionFailed`, `AcquisitionFailed` re-classify
//!   failures reported by the backend.
//! - **Aggregate**: `PartialFailure` collects per-target errors of best-effort operations.
//!
//! Every variant maps to an exit-code class through [`CliError::exit_code`], so scripted
//! callers can branch on the status without parsing text.

use std::fmt;
use thiserror::Error;

use crate::backend::RemoteError;

/// Convenience alias for results using the client error type.
pub type CliResult<T> = std::result::Result<T, CliError>;

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for "not found", unreachable backend, and generic failures.
pub const EXIT_FAILURE: i32 = 127;
/// Exit code for action-specific invalid input (bad attribute, axis, distance).
pub const EXIT_INVALID_INPUT: i32 = 129;

/// Kind of remote object a lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Component,
    Actuator,
    Detector,
    Attribute,
    DataFlow,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Component => "component",
            ObjectKind::Actuator => "actuator",
            ObjectKind::Detector => "detector",
            ObjectKind::Attribute => "attribute",
            ObjectKind::DataFlow => "data-flow",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to contact the back-end: {0}")]
    BackendUnreachable(String),

    #[error("Back-end appears to be non-responsive")]
    BackendDead,

    #[error("No running back-end")]
    BackendStopped,

    #[error("Failed to find {kind} '{name}'")]
    NotFound { kind: ObjectKind, name: String },

    #[error("'{attribute}' is not a vigilant attribute of component '{component}'")]
    NotAttribute { component: String, attribute: String },

    #[error("'{dataflow}' is not a data-flow of component '{component}'")]
    NotDataFlow { component: String, dataflow: String },

    #[error("Actuator '{actuator}' has no axis '{axis}'")]
    InvalidAxis { actuator: String, axis: String },

    #[error("Impossible to convert '{text}' to {target}")]
    Conversion { text: String, target: String },

    #[error("Type {type_name} is not supported to convert '{text}'")]
    UnsupportedType { type_name: String, text: String },

    #[error("Distance of {distance_m} m is too big (> {max_m} m)")]
    OutOfBounds { distance_m: f64, max_m: f64 },

    #[error("Back-end rejected {target}: {reason}")]
    RemoteRejected { target: String, reason: String },

    #[error("Failed to move axis '{axis}' of '{actuator}': {reason}")]
    MotionFailed {
        actuator: String,
        axis: String,
        reason: String,
    },

    #[error("Failed to acquire from '{component}.{dataflow}': {reason}")]
    AcquisitionFailed {
        component: String,
        dataflow: String,
        reason: String,
    },

    #[error("{} of {attempted} targets failed", .failures.len())]
    PartialFailure {
        attempted: usize,
        failures: Vec<CliError>,
    },

    #[error("Failed to save frame: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    pub(crate) fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        CliError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Classify a backend failure raised while talking to `target`.
    ///
    /// Transport-level failures become `BackendUnreachable`; everything else the
    /// backend refused is a `RemoteRejected`.
    pub fn from_remote(target: impl Into<String>, err: RemoteError) -> Self {
        match err {
            RemoteError::Disconnected(msg) => CliError::BackendUnreachable(msg),
            other => CliError::RemoteRejected {
                target: target.into(),
                reason: other.to_string(),
            },
        }
    }

    /// Status code handed back to the operating system for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::NotAttribute { .. }
            | CliError::NotDataFlow { .. }
            | CliError::InvalidAxis { .. }
            | CliError::OutOfBounds { .. } => EXIT_INVALID_INPUT,
            CliError::NotFound { kind, .. }
                if matches!(kind, ObjectKind::Attribute | ObjectKind::DataFlow) =>
            {
                EXIT_INVALID_INPUT
            }
            _ => EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_offender() {
        let err = CliError::not_found(ObjectKind::Actuator, "stage");
        assert_eq!(err.to_string(), "Failed to find actuator 'stage'");

        let err = CliError::InvalidAxis {
            actuator: "stage".into(),
            axis: "z".into(),
        };
        assert!(err.to_string().contains("'z'"));
    }

    #[test]
    fn test_exit_code_classes() {
        assert_eq!(
            CliError::not_found(ObjectKind::Component, "cam").exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            CliError::not_found(ObjectKind::Attribute, "gain").exit_code(),
            EXIT_INVALID_INPUT
        );
        assert_eq!(
            CliError::OutOfBounds {
                distance_m: 0.2,
                max_m: 0.1
            }
            .exit_code(),
            EXIT_INVALID_INPUT
        );
        assert_eq!(CliError::BackendDead.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_partial_failure_display() {
        let err = CliError::PartialFailure {
            attempted: 3,
            failures: vec![CliError::RemoteRejected {
                target: "stage".into(),
                reason: "stuck".into(),
            }],
        };
        assert_eq!(err.to_string(), "1 of 3 targets failed");
    }

    #[test]
    fn test_remote_disconnect_is_unreachable() {
        let err = CliError::from_remote("cam.gain", RemoteError::Disconnected("eof".into()));
        assert!(matches!(err, CliError::BackendUnreachable(_)));

        let err = CliError::from_remote("cam.gain", RemoteError::OutOfRange("12".into()));
        assert!(matches!(err, CliError::RemoteRejected { .. }));
    }
}
