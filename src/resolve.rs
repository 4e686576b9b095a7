//! Component lookup by exact name, and the component tree walk.
//!
//! Lookups never match by prefix or similarity: acting on the wrong piece of
//! hardware is worse than failing. Actuators and detectors are looked up in
//! the microscope's own subsets rather than by type, as remote proxies do not
//! carry reliable type information.

use crate::backend::{Component, Microscope};
use crate::error::{CliError, CliResult, ObjectKind};
use crate::session::Session;

/// Find the component named `name` in `components`.
pub fn resolve<'a>(
    name: &str,
    components: impl IntoIterator<Item = &'a Component>,
    kind: ObjectKind,
) -> CliResult<Component> {
    components
        .into_iter()
        .find(|c| c.name() == name)
        .cloned()
        .ok_or_else(|| CliError::not_found(kind, name))
}

/// Fetch the root microscope.
pub async fn microscope(session: &Session) -> CliResult<Microscope> {
    session
        .backend()
        .microscope()
        .await
        .map_err(|e| CliError::BackendUnreachable(e.to_string()))
}

/// Find any component known to the backend.
pub async fn resolve_component(session: &Session, name: &str) -> CliResult<Component> {
    let components = session
        .backend()
        .components()
        .await
        .map_err(|e| CliError::BackendUnreachable(e.to_string()))?;
    resolve(name, &components, ObjectKind::Component)
}

/// Find a component among the microscope's actuators.
pub async fn resolve_actuator(session: &Session, name: &str) -> CliResult<Component> {
    let microscope = microscope(session).await?;
    resolve(name, &microscope.actuators, ObjectKind::Actuator)
}

/// Find a component among the microscope's detectors.
pub async fn resolve_detector(session: &Session, name: &str) -> CliResult<Component> {
    let microscope = microscope(session).await?;
    resolve(name, &microscope.detectors, ObjectKind::Detector)
}

/// One line of the component tree.
#[derive(Clone)]
pub struct TreeEntry {
    /// 0 for the microscope, 1 for members of its subsets, deeper for children.
    pub depth: usize,
    pub component: Component,
}

impl std::fmt::Debug for TreeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeEntry")
            .field("depth", &self.depth)
            .field("name", &self.component.name())
            .finish()
    }
}

/// Pre-order walk of the component tree.
///
/// Starts at the microscope, then each detector, emitter and actuator with
/// its descendants. Only `children` links are followed, so cycles through
/// `affects` cannot trap the walk.
pub async fn walk_tree(microscope: &Microscope) -> CliResult<Vec<TreeEntry>> {
    let mut entries = vec![TreeEntry {
        depth: 0,
        component: microscope.root.clone(),
    }];

    let subsets = microscope
        .detectors
        .iter()
        .chain(&microscope.emitters)
        .chain(&microscope.actuators);

    // Explicit stack, pushed in reverse so siblings come out in order.
    let mut stack: Vec<(usize, Component)> = subsets.rev().map(|c| (1, c.clone())).collect();
    while let Some((depth, component)) = stack.pop() {
        let children = component
            .children()
            .await
            .map_err(|e| CliError::from_remote(component.name(), e))?;
        stack.extend(children.into_iter().rev().map(|c| (depth + 1, c)));
        entries.push(TreeEntry { depth, component });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{SimBackend, SimComponent};
    use crate::backend::Backend;
    use crate::config::Settings;
    use std::sync::Arc;

    fn demo_session() -> Session {
        Session::new(Arc::new(SimBackend::demo()), Settings::default())
    }

    #[tokio::test]
    async fn test_exact_name_only() {
        let session = demo_session();
        assert_eq!(resolve_component(&session, "Stage").await.unwrap().name(), "Stage");
        assert!(matches!(
            resolve_component(&session, "Stag").await,
            Err(CliError::NotFound { kind: ObjectKind::Component, .. })
        ));
        assert!(resolve_component(&session, "stage").await.is_err());
    }

    #[tokio::test]
    async fn test_actuator_lookup_is_scoped() {
        let session = demo_session();
        assert!(resolve_actuator(&session, "Focus").await.is_ok());

        // Present in the full component set, but only as a detector.
        assert!(resolve_component(&session, "Camera").await.is_ok());
        assert!(matches!(
            resolve_actuator(&session, "Camera").await,
            Err(CliError::NotFound { kind: ObjectKind::Actuator, .. })
        ));
        assert!(resolve_detector(&session, "Camera").await.is_ok());
        assert!(resolve_detector(&session, "Stage").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let backend = SimBackend::demo();
        backend.set_responsive(false);
        let session = Session::new(Arc::new(backend), Settings::default());
        assert!(matches!(
            resolve_actuator(&session, "Stage").await,
            Err(CliError::BackendUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_walk_is_pre_order() {
        let session = demo_session();
        let scope = microscope(&session).await.unwrap();
        let walk: Vec<(usize, String)> = walk_tree(&scope)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.depth, e.component.name().to_string()))
            .collect();
        assert_eq!(
            walk,
            vec![
                (0, "SimScope".to_string()),
                (1, "Camera".to_string()),
                (1, "Light".to_string()),
                (1, "Stage".to_string()),
                (2, "Stage Controller".to_string()),
                (1, "Focus".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_walk_ignores_affects_cycles() {
        let a = SimComponent::new("A", "x").affecting("B").into_arc();
        let b = SimComponent::new("B", "x").affecting("A").into_arc();
        let backend = SimBackend::new(SimComponent::new("Root", "r"), vec![a], vec![], vec![b]);
        let scope = backend.microscope().await.unwrap();
        assert_eq!(walk_tree(&scope).await.unwrap().len(), 3);
    }
}
