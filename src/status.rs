//! Backend liveness probe.
//!
//! A failed root lookup alone cannot tell a crashed backend from one that was
//! never started: a backend process that stops answering still leaves its
//! presence marker on disk. The marker check separates the two.

use std::fmt;
use std::path::Path;
use tracing::info;

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    /// The root microscope answered with a non-empty name.
    Running,
    /// The backend does not answer but its presence marker exists.
    Dead,
    /// The backend does not answer and left no presence marker.
    Stopped,
}

impl BackendStatus {
    /// Exit code reported by the status check.
    pub fn exit_code(self) -> i32 {
        match self {
            BackendStatus::Running => 0,
            BackendStatus::Dead => 1,
            BackendStatus::Stopped => 2,
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendStatus::Running => "RUNNING",
            BackendStatus::Dead => "DEAD",
            BackendStatus::Stopped => "STOPPED",
        })
    }
}

/// Determine whether the backend is running, dead or stopped.
pub async fn probe(session: &Session) -> BackendStatus {
    let marker = session.settings().backend.marker_path.as_path();
    match session.backend().microscope().await {
        Ok(microscope) if !microscope.name().is_empty() => BackendStatus::Running,
        Ok(_) => {
            info!("Microscope answered with an empty name");
            BackendStatus::Dead
        }
        Err(e) => {
            info!("Failed to find microscope: {}", e);
            from_marker(marker)
        }
    }
}

fn from_marker(marker: &Path) -> BackendStatus {
    // Existence only: the marker may be a socket we cannot read.
    if marker.symlink_metadata().is_ok() {
        BackendStatus::Dead
    } else {
        info!("Back-end marker {} doesn't exist", marker.display());
        BackendStatus::Stopped
    }
}
