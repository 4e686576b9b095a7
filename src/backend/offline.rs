//! Backend used when no transport to a live backend is available.
//!
//! Every call fails with [`RemoteError::Disconnected`], so the status probe
//! falls back to the presence marker to tell a crashed backend from a stopped
//! one.

use async_trait::async_trait;

use super::{Backend, Component, Microscope, RemoteError, RemoteResult, ScannedDevice};

pub struct OfflineBackend {
    address: String,
}

impl OfflineBackend {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    fn unreachable(&self) -> RemoteError {
        RemoteError::Disconnected(format!("no answer from back-end at '{}'", self.address))
    }
}

#[async_trait]
impl Backend for OfflineBackend {
    async fn microscope(&self) -> RemoteResult<Microscope> {
        Err(self.unreachable())
    }

    async fn components(&self) -> RemoteResult<Vec<Component>> {
        Err(self.unreachable())
    }

    async fn terminate(&self) -> RemoteResult<()> {
        Err(self.unreachable())
    }

    async fn scan(&self) -> RemoteResult<Vec<ScannedDevice>> {
        Err(RemoteError::NotSupported(
            "no driver scanner available without a transport".to_string(),
        ))
    }
}
