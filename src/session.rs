//! Connection context threaded through every core operation.

use std::sync::Arc;
use tracing::info;

use crate::backend::offline::OfflineBackend;
use crate::backend::simulated::SimBackend;
use crate::backend::Backend;
use crate::config::Settings;

/// A backend connection plus the settings in effect.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn Backend>,
    settings: Arc<Settings>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, settings: Settings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
        }
    }

    /// Open the backend selected by `settings`.
    pub fn open(settings: Settings) -> Self {
        let backend: Arc<dyn Backend> = if settings.backend.simulated {
            info!("Using the simulated microscope");
            Arc::new(SimBackend::demo())
        } else {
            Arc::new(OfflineBackend::new(settings.backend.address.clone()))
        };
        Self::new(backend, settings)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
