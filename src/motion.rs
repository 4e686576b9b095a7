//! Bounded relative motion and the emergency stop.
//!
//! Distances are typed in micrometers so that a large move needs many extra
//! digits, and any single move beyond `motion.max_distance_m` (at most 0.1 m)
//! is refused before reaching the backend.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{CliError, CliResult};
use crate::resolve::{microscope, resolve_actuator};
use crate::session::Session;

/// Micrometers per meter. Dividing keeps the 0.1 m boundary exact.
const MICRONS_PER_METER: f64 = 1e6;

/// One `actuator axis distance` request, distance in micrometers.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub actuator: String,
    pub axis: String,
    pub distance: String,
}

impl MoveRequest {
    pub fn new(
        actuator: impl Into<String>,
        axis: impl Into<String>,
        distance: impl Into<String>,
    ) -> Self {
        Self {
            actuator: actuator.into(),
            axis: axis.into(),
            distance: distance.into(),
        }
    }
}

/// Parse a micrometer distance and return it in meters.
pub fn parse_microns(text: &str) -> CliResult<f64> {
    let microns: f64 = text.trim().parse().map_err(|_| CliError::Conversion {
        text: text.to_string(),
        target: "a distance in µm".to_string(),
    })?;
    if !microns.is_finite() {
        return Err(CliError::Conversion {
            text: text.to_string(),
            target: "a finite distance in µm".to_string(),
        });
    }
    Ok(microns / MICRONS_PER_METER)
}

/// Move `axis` of `actuator` by `distance` micrometers and wait for the end of
/// the move.
pub async fn move_relative(
    session: &Session,
    actuator: &str,
    axis: &str,
    distance: &str,
) -> CliResult<()> {
    let comp = resolve_actuator(session, actuator).await?;

    let axes = comp
        .axes()
        .await
        .map_err(|e| CliError::from_remote(actuator, e))?;
    if !axes.iter().any(|a| a == axis) {
        return Err(CliError::InvalidAxis {
            actuator: actuator.to_string(),
            axis: axis.to_string(),
        });
    }

    let distance_m = parse_microns(distance)?;
    let max_m = session.settings().motion.max_distance_m;
    if distance_m.abs() > max_m {
        return Err(CliError::OutOfBounds { distance_m, max_m });
    }

    let motion_failed = |reason: String| CliError::MotionFailed {
        actuator: actuator.to_string(),
        axis: axis.to_string(),
        reason,
    };

    info!("Moving {}.{} by {} m", actuator, axis, distance_m);
    let completion = comp
        .move_relative(axis, distance_m)
        .await
        .map_err(|e| motion_failed(e.to_string()))?;

    // Without a configured timeout the backend decides how long a move may take.
    let outcome = match session.settings().motion.move_timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), completion)
            .await
            .map_err(|_| motion_failed(format!("no completion after {} ms", ms)))?,
        None => completion.await,
    };
    outcome.map_err(|e| motion_failed(e.to_string()))
}

/// Run the requests in the order given, stopping at the first failure.
///
/// Moves already completed are not undone.
pub async fn run_moves(session: &Session, requests: &[MoveRequest]) -> CliResult<()> {
    for req in requests {
        move_relative(session, &req.actuator, &req.axis, &req.distance).await?;
    }
    Ok(())
}

/// Ask every actuator of the microscope to stop.
///
/// Each actuator is tried even if an earlier one failed.
pub async fn stop_all(session: &Session) -> CliResult<()> {
    let scope = microscope(session).await?;
    let attempted = scope.actuators.len();

    let mut failures = Vec::new();
    for actuator in &scope.actuators {
        match actuator.stop().await {
            Ok(()) => info!("Stopped actuator {}", actuator.name()),
            Err(e) => {
                error!("Failed to stop actuator {}: {}", actuator.name(), e);
                failures.push(CliError::from_remote(actuator.name(), e));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        warn!("{} of {} actuators failed to stop", failures.len(), attempted);
        Err(CliError::PartialFailure {
            attempted,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimBackend;
    use crate::config::Settings;
    use crate::error::{ObjectKind, EXIT_FAILURE, EXIT_INVALID_INPUT};
    use std::sync::Arc;

    fn session_with(backend: &Arc<SimBackend>, settings: Settings) -> Session {
        Session::new(backend.clone(), settings)
    }

    #[test]
    fn test_parse_microns() {
        assert!((parse_microns("100").unwrap() - 1e-4).abs() < 1e-12);
        assert!((parse_microns(" -2.5 ").unwrap() + 2.5e-6).abs() < 1e-15);
        assert!(matches!(parse_microns("ten"), Err(CliError::Conversion { .. })));
        assert!(matches!(parse_microns("NaN"), Err(CliError::Conversion { .. })));
        assert!(matches!(parse_microns("inf"), Err(CliError::Conversion { .. })));
    }

    #[tokio::test]
    async fn test_move_updates_position() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());
        move_relative(&session, "Stage", "x", "50").await.unwrap();

        let stage = backend.component("Stage").unwrap();
        let pos = stage.sim_axes().unwrap().position("x").unwrap();
        assert!((pos - 50e-6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cap_boundary() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());

        move_relative(&session, "Focus", "z", "100000").await.unwrap();
        move_relative(&session, "Focus", "z", "-100000").await.unwrap();

        let err = move_relative(&session, "Focus", "z", "100001").await.unwrap_err();
        assert!(matches!(err, CliError::OutOfBounds { .. }));
        assert_eq!(err.exit_code(), EXIT_INVALID_INPUT);

        let focus = backend.component("Focus").unwrap();
        assert_eq!(focus.sim_axes().unwrap().completed_moves().len(), 2);
    }

    #[tokio::test]
    async fn test_tighter_configured_cap() {
        let backend = Arc::new(SimBackend::demo());
        let mut settings = Settings::default();
        settings.motion.max_distance_m = 0.001;
        let session = session_with(&backend, settings);
        let err = move_relative(&session, "Stage", "y", "1001").await.unwrap_err();
        assert!(matches!(err, CliError::OutOfBounds { .. }));
    }

    #[tokio::test]
    async fn test_validation_order() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());

        let err = move_relative(&session, "Camera", "x", "1").await.unwrap_err();
        assert!(matches!(err, CliError::NotFound { kind: ObjectKind::Actuator, .. }));
        assert_eq!(err.exit_code(), EXIT_FAILURE);

        // Bad axis is reported before the distance is even parsed.
        let err = move_relative(&session, "Stage", "z", "abc").await.unwrap_err();
        assert!(matches!(err, CliError::InvalidAxis { .. }));

        let err = move_relative(&session, "Stage", "x", "abc").await.unwrap_err();
        assert!(matches!(err, CliError::Conversion { .. }));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_jammed_axis_reports_motion_failure() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());
        let stage = backend.component("Stage").unwrap();
        stage.sim_axes().unwrap().jam("y");

        let err = move_relative(&session, "Stage", "y", "10").await.unwrap_err();
        assert!(matches!(err, CliError::MotionFailed { .. }));
        assert_eq!(stage.sim_axes().unwrap().position("y"), Some(0.0));
    }

    #[tokio::test]
    async fn test_move_timeout() {
        let backend = Arc::new(SimBackend::demo());
        let mut settings = Settings::default();
        settings.motion.move_timeout_ms = Some(5);
        let session = session_with(&backend, settings);

        // 0.05 m at 1 m/s takes 50 ms.
        let err = move_relative(&session, "Stage", "x", "50000").await.unwrap_err();
        match err {
            CliError::MotionFailed { reason, .. } => assert!(reason.contains("5 ms")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_moves_fail_fast() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());
        let requests = vec![
            MoveRequest::new("Stage", "x", "10"),
            MoveRequest::new("Stage", "q", "10"),
            MoveRequest::new("Stage", "y", "10"),
        ];
        let err = run_moves(&session, &requests).await.unwrap_err();
        assert!(matches!(err, CliError::InvalidAxis { .. }));

        let moves = backend
            .component("Stage")
            .unwrap()
            .sim_axes()
            .unwrap()
            .completed_moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, "x");
    }

    #[tokio::test]
    async fn test_stop_all_is_best_effort() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());
        let stage = backend.component("Stage").unwrap();
        let focus = backend.component("Focus").unwrap();
        stage.sim_axes().unwrap().set_stop_fails(true);

        let err = stop_all(&session).await.unwrap_err();
        match err {
            CliError::PartialFailure {
                attempted,
                failures,
            } => {
                assert_eq!(attempted, 2);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failing stage did not prevent the focus from being stopped.
        assert_eq!(focus.sim_axes().unwrap().stop_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_all_succeeds() {
        let backend = Arc::new(SimBackend::demo());
        let session = session_with(&backend, Settings::default());
        stop_all(&session).await.unwrap();
        let stage = backend.component("Stage").unwrap();
        assert_eq!(stage.sim_axes().unwrap().stop_count(), 1);
    }
}
