//! Remote-object handles exposed by the instrument backend.
//!
//! The backend owns the component graph and the hardware behind it; the client
//! only ever holds non-owning handles and calls the operations below. Every call
//! goes to the backend, nothing is cached on this side.
//!
//! # Handle Types
//!
//! - [`Backend`] - connection-level operations (root lookup, component listing,
//!   termination, device scan)
//! - [`RemoteComponent`] - one node of the component graph
//! - [`VigilantAttribute`] - a typed, observable state cell of a component
//! - [`DataFlow`] - a push/pull stream of captured frames
//!
//! A transport implements these traits; [`simulated`] provides an in-process
//! implementation used by the test suite and the `--simulate` mode.

pub mod offline;
pub mod simulated;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::frame::Frame;
use crate::value::Value;

/// Failure reported by the backend (or by the link to it).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("connection to back-end lost: {0}")]
    Disconnected(String),

    #[error("attribute is read-only")]
    ReadOnly,

    #[error("value {0} is out of range")]
    OutOfRange(String),

    #[error("value {0} is not one of the allowed choices")]
    InvalidChoice(String),

    #[error("expected a value of type {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Failed(String),
}

/// Convenience alias for backend call results.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Shared handle on a remote component.
pub type Component = Arc<dyn RemoteComponent>;

/// Completion handle of an asynchronous actuator move.
///
/// Resolves once the backend reports the move finished or failed.
pub type MoveFuture = BoxFuture<'static, RemoteResult<()>>;

/// Callback invoked once per frame produced by a subscribed data-flow.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Registration handle returned by [`DataFlow::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Static description of a vigilant attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeInfo {
    pub readonly: bool,
    pub unit: Option<String>,
    /// Inclusive `(min, max)` bounds.
    pub range: Option<(Value, Value)>,
    pub choices: Option<Vec<Value>>,
}

/// Whatever a component exposes under a given name.
#[derive(Clone)]
pub enum RemoteObject {
    /// A plain read-only attribute.
    Plain(Value),
    Attribute(Arc<dyn VigilantAttribute>),
    DataFlow(Arc<dyn DataFlow>),
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteObject::Plain(v) => f.debug_tuple("Plain").field(v).finish(),
            RemoteObject::Attribute(_) => f.write_str("Attribute(..)"),
            RemoteObject::DataFlow(_) => f.write_str("DataFlow(..)"),
        }
    }
}

/// A typed, mutable-or-read-only remote state cell.
#[async_trait]
pub trait VigilantAttribute: Send + Sync {
    /// Fetch the current value.
    async fn value(&self) -> RemoteResult<Value>;

    /// Write a new value.
    ///
    /// The backend checks the shape against the current value, the range and
    /// the choices; a violation is reported, never clamped.
    async fn set_value(&self, value: Value) -> RemoteResult<()>;

    /// Fetch read-only flag, unit, range and choices.
    async fn info(&self) -> RemoteResult<AttributeInfo>;
}

/// A push/pull stream of frames.
#[async_trait]
pub trait DataFlow: Send + Sync {
    /// Block until one frame is acquired and return it.
    async fn get(&self) -> RemoteResult<Frame>;

    /// Register a callback invoked once per produced frame, in production order.
    ///
    /// If the returned future is dropped early the callback may stay
    /// registered with no id to remove it; callers must make it inert.
    async fn subscribe(&self, callback: FrameCallback) -> RemoteResult<SubscriptionId>;

    /// Remove a registration. Unknown or already removed ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// One node of the remote component graph.
#[async_trait]
pub trait RemoteComponent: Send + Sync {
    /// Unique, backend-assigned name.
    fn name(&self) -> &str;

    fn role(&self) -> &str;

    async fn children(&self) -> RemoteResult<Vec<Component>>;

    /// Names of the components this one influences.
    async fn affects(&self) -> RemoteResult<Vec<String>>;

    /// Plain read-only attributes, by name.
    async fn ro_attributes(&self) -> RemoteResult<Vec<(String, Value)>>;

    async fn vigilant_attributes(&self) -> RemoteResult<Vec<(String, Arc<dyn VigilantAttribute>)>>;

    async fn data_flows(&self) -> RemoteResult<Vec<(String, Arc<dyn DataFlow>)>>;

    /// Fetch whatever the component exposes under `name`.
    async fn lookup(&self, name: &str) -> RemoteResult<Option<RemoteObject>> {
        if let Some((_, va)) = self
            .vigilant_attributes()
            .await?
            .into_iter()
            .find(|(n, _)| n == name)
        {
            return Ok(Some(RemoteObject::Attribute(va)));
        }
        if let Some((_, df)) = self.data_flows().await?.into_iter().find(|(n, _)| n == name) {
            return Ok(Some(RemoteObject::DataFlow(df)));
        }
        Ok(self
            .ro_attributes()
            .await?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| RemoteObject::Plain(v)))
    }

    /// Names of the axes an actuator can move; empty for other components.
    async fn axes(&self) -> RemoteResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Start a relative move of `distance_m` meters on `axis`.
    async fn move_relative(&self, axis: &str, distance_m: f64) -> RemoteResult<MoveFuture> {
        let _ = distance_m;
        Err(RemoteError::NotSupported(format!(
            "'{}' cannot move axis '{}'",
            self.name(),
            axis
        )))
    }

    /// Immediately stop every axis.
    async fn stop(&self) -> RemoteResult<()> {
        Err(RemoteError::NotSupported(format!("'{}' cannot stop", self.name())))
    }
}

/// The root component with its detector, emitter and actuator subsets.
#[derive(Clone)]
pub struct Microscope {
    pub root: Component,
    pub detectors: Vec<Component>,
    pub emitters: Vec<Component>,
    pub actuators: Vec<Component>,
}

impl Microscope {
    pub fn name(&self) -> &str {
        self.root.name()
    }

    pub fn role(&self) -> &str {
        self.root.role()
    }
}

impl fmt::Debug for Microscope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |set: &[Component]| set.iter().map(|c| c.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("Microscope")
            .field("name", &self.name())
            .field("detectors", &names(&self.detectors))
            .field("emitters", &names(&self.emitters))
            .field("actuators", &names(&self.actuators))
            .finish()
    }
}

/// A device found by a driver scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedDevice {
    /// Driver module and class, e.g. `andorcam2.AndorCam2`.
    pub driver: String,
    pub name: String,
    /// Arguments to pass when instantiating the driver for this device.
    pub init: Vec<(String, Value)>,
}

/// Connection-level operations on the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the root microscope handle.
    async fn microscope(&self) -> RemoteResult<Microscope>;

    /// Every component known to the backend.
    async fn components(&self) -> RemoteResult<Vec<Component>>;

    /// Ask the backend process to terminate.
    async fn terminate(&self) -> RemoteResult<()>;

    /// Probe every driver for connected devices. Only valid while the
    /// backend is not running.
    async fn scan(&self) -> RemoteResult<Vec<ScannedDevice>>;
}
