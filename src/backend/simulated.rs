//! Simulated Backend
//!
//! In-process implementation of the backend handle traits, used by the test
//! suite and by the `--simulate` command-line mode. Nothing here touches real
//! hardware.
//!
//! # Available Simulations
//!
//! - `SimAttribute` - vigilant attribute backed by a `tokio::sync::watch` channel,
//!   with read-only flag, range and choices enforced on write
//! - `SimDataFlow` - frame source with blocking `get()` and push subscriptions
//! - `SimAxes` - multi-axis actuator with realistic move timing
//! - `SimComponent` - a graph node assembling the above
//! - `SimBackend` - a microscope root plus its subsets and lifecycle state
//!
//! All timing uses `tokio::time::sleep`, never `std::thread::sleep`.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::debug;

use super::{
    AttributeInfo, Backend, Component, DataFlow, FrameCallback, Microscope, MoveFuture,
    RemoteComponent, RemoteError, RemoteResult, ScannedDevice, SubscriptionId, VigilantAttribute,
};
use crate::frame::Frame;
use crate::value::Value;

// =============================================================================
// SimAttribute - Simulated Vigilant Attribute
// =============================================================================

/// Vigilant attribute with change notifications and write validation.
///
/// # Example
///
/// ```rust,ignore
/// let power = SimAttribute::new(Value::Float(0.0))
///     .with_unit("W")
///     .with_range(Value::Float(0.0), Value::Float(100.0));
///
/// let mut rx = power.subscribe();
/// power.set_value(Value::Float(12.5)).await?;
/// rx.changed().await?;
/// ```
pub struct SimAttribute {
    sender: watch::Sender<Value>,
    info: AttributeInfo,
    writes: AtomicUsize,
}

impl SimAttribute {
    pub fn new(initial: Value) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            info: AttributeInfo::default(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.info.unit = Some(unit.into());
        self
    }

    /// Inclusive bounds for numeric, string or fixed-length sequence values.
    pub fn with_range(mut self, min: Value, max: Value) -> Self {
        self.info.range = Some((min, max));
        self
    }

    pub fn with_choices(mut self, choices: impl IntoIterator<Item = Value>) -> Self {
        self.info.choices = Some(choices.into_iter().collect());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.info.readonly = true;
        self
    }

    /// Current value (clone).
    pub fn get(&self) -> Value {
        self.sender.borrow().clone()
    }

    /// Watch value changes.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.sender.subscribe()
    }

    /// Number of write requests that reached this attribute, accepted or not.
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn validate(&self, value: &Value) -> RemoteResult<()> {
        if self.info.readonly {
            return Err(RemoteError::ReadOnly);
        }

        let current = self.sender.borrow();
        if !same_shape(&current, value) {
            return Err(RemoteError::TypeMismatch {
                expected: current.type_name().to_string(),
                actual: value.type_name().to_string(),
            });
        }

        if let Some((min, max)) = &self.info.range {
            if within_range(value, min, max) == Some(false) {
                return Err(RemoteError::OutOfRange(format!("{} not in [{}, {}]", value, min, max)));
            }
        }

        if let Some(choices) = &self.info.choices {
            if !choices.contains(value) {
                return Err(RemoteError::InvalidChoice(value.to_string()));
            }
        }
        Ok(())
    }
}

/// Inclusive range check. Sequences are compared item by item against the
/// matching items of `min` and `max`. `None` when the shapes have no ordering,
/// in which case the range is not enforced.
fn within_range(value: &Value, min: &Value, max: &Value) -> Option<bool> {
    match (value, min, max) {
        (Value::Sequence(_, items), Value::Sequence(_, lo), Value::Sequence(_, hi)) => {
            if items.len() != lo.len() || items.len() != hi.len() {
                return None;
            }
            let mut inside = true;
            for ((item, lo), hi) in items.iter().zip(lo).zip(hi) {
                inside &= within_range(item, lo, hi)?;
            }
            Some(inside)
        }
        _ => {
            let below = value.partial_cmp_same_shape(min)?.is_lt();
            let above = value.partial_cmp_same_shape(max)?.is_gt();
            Some(!below && !above)
        }
    }
}

/// Whether `new` has the same shape as `current`, following the first item of
/// composite values.
fn same_shape(current: &Value, new: &Value) -> bool {
    match (current, new) {
        (Value::Sequence(kind_a, a), Value::Sequence(kind_b, b)) => {
            kind_a == kind_b
                && match a.first() {
                    Some(template) => b.iter().all(|item| same_shape(template, item)),
                    None => true,
                }
        }
        (Value::Mapping(a), Value::Mapping(b)) => match a.first() {
            Some((tk, tv)) => b.iter().all(|(k, v)| same_shape(tk, k) && same_shape(tv, v)),
            None => true,
        },
        (Value::Opaque { .. }, _) => false,
        _ => current.type_name() == new.type_name(),
    }
}

#[async_trait]
impl VigilantAttribute for SimAttribute {
    async fn value(&self) -> RemoteResult<Value> {
        Ok(self.get())
    }

    async fn set_value(&self, value: Value) -> RemoteResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.validate(&value)?;
        self.sender.send_replace(value);
        Ok(())
    }

    async fn info(&self) -> RemoteResult<AttributeInfo> {
        Ok(self.info.clone())
    }
}

// =============================================================================
// SimDataFlow - Simulated Frame Source
// =============================================================================

#[derive(Default)]
struct Subscribers {
    callbacks: BTreeMap<SubscriptionId, FrameCallback>,
    producing: bool,
}

/// Frame source producing 12-bit gradient images with noise.
///
/// While at least one callback is registered, a background task produces a
/// frame every `period` and hands it to every registered callback in
/// registration order. The task stops once the last callback is removed.
pub struct SimDataFlow {
    width: u32,
    height: u32,
    period: Duration,
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: AtomicU64,
    produced: Arc<AtomicU64>,
    failing: AtomicBool,
}

impl SimDataFlow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            period: Duration::from_millis(100),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            next_id: AtomicU64::new(1),
            produced: Arc::new(AtomicU64::new(0)),
            failing: AtomicBool::new(false),
        }
    }

    /// Time between two frames (and duration of a `get()`).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Make every subsequent `get()` fail, as a detector error would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of currently registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().callbacks.len()
    }

    /// Total number of frames produced so far.
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    fn spawn_producer(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let produced = Arc::clone(&self.produced);
        let (width, height, period) = (self.width, self.height, self.period);

        tokio::spawn(async move {
            loop {
                sleep(period).await;
                let callbacks: Vec<FrameCallback> = {
                    let mut subs = subscribers.lock();
                    if subs.callbacks.is_empty() {
                        subs.producing = false;
                        debug!("SimDataFlow: no subscriber left, producer stopped");
                        return;
                    }
                    subs.callbacks.values().cloned().collect()
                };

                let index = produced.fetch_add(1, Ordering::SeqCst);
                match synthesize_frame(width, height, index) {
                    Ok(frame) => {
                        for callback in callbacks {
                            callback(frame.clone());
                        }
                    }
                    Err(e) => debug!("SimDataFlow: failed to synthesize frame: {}", e),
                }
            }
        });
    }
}

fn synthesize_frame(width: u32, height: u32, index: u64) -> RemoteResult<Frame> {
    const DEPTH_BITS: u8 = 12;
    let max = (1u32 << DEPTH_BITS) - 1;
    let mut rng = rand::thread_rng();
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let base = (u64::from(x) + u64::from(y) + index * 8) % u64::from(max / 2);
            (base as u32 + rng.gen_range(0..64)).min(max) as u16
        })
        .collect();
    Frame::new(width, height, DEPTH_BITS, pixels).map_err(|e| RemoteError::Failed(e.to_string()))
}

#[async_trait]
impl DataFlow for SimDataFlow {
    async fn get(&self) -> RemoteResult<Frame> {
        sleep(self.period).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed("detector did not return any data".to_string()));
        }
        let index = self.produced.fetch_add(1, Ordering::SeqCst);
        synthesize_frame(self.width, self.height, index)
    }

    async fn subscribe(&self, callback: FrameCallback) -> RemoteResult<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let start = {
            let mut subs = self.subscribers.lock();
            subs.callbacks.insert(id, callback);
            !std::mem::replace(&mut subs.producing, true)
        };
        if start {
            self.spawn_producer();
        }
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().callbacks.remove(&id);
    }
}

// =============================================================================
// SimAxes - Simulated Actuator
// =============================================================================

/// Multi-axis actuator.
///
/// Moves take `distance / speed` of wall time and are recorded in order.
/// Failures can be injected per axis (moves) or globally (stop).
pub struct SimAxes {
    positions: Arc<Mutex<BTreeMap<String, f64>>>,
    speed_m_per_s: f64,
    jammed: Arc<Mutex<HashSet<String>>>,
    moves: Arc<Mutex<Vec<(String, f64)>>>,
    stop_fails: AtomicBool,
    stops: AtomicUsize,
}

impl SimAxes {
    /// Axes at position 0 m, moving at 1 m/s.
    pub fn new(axes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            positions: Arc::new(Mutex::new(axes.into_iter().map(|a| (a.into(), 0.0)).collect())),
            speed_m_per_s: 1.0,
            jammed: Arc::new(Mutex::new(HashSet::new())),
            moves: Arc::new(Mutex::new(Vec::new())),
            stop_fails: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn with_speed(mut self, speed_m_per_s: f64) -> Self {
        self.speed_m_per_s = speed_m_per_s;
        self
    }

    /// Make moves on `axis` fail once issued.
    pub fn jam(&self, axis: &str) {
        self.jammed.lock().insert(axis.to_string());
    }

    pub fn set_stop_fails(&self, fails: bool) {
        self.stop_fails.store(fails, Ordering::SeqCst);
    }

    pub fn position(&self, axis: &str) -> Option<f64> {
        self.positions.lock().get(axis).copied()
    }

    /// Completed moves, in completion order.
    pub fn completed_moves(&self) -> Vec<(String, f64)> {
        self.moves.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn names(&self) -> Vec<String> {
        self.positions.lock().keys().cloned().collect()
    }

    fn start_move(&self, axis: &str, distance_m: f64) -> RemoteResult<MoveFuture> {
        if !self.positions.lock().contains_key(axis) {
            return Err(RemoteError::Failed(format!("unknown axis '{}'", axis)));
        }
        let delay = Duration::from_secs_f64(distance_m.abs() / self.speed_m_per_s);
        let jammed = self.jammed.lock().contains(axis);
        let positions = Arc::clone(&self.positions);
        let moves = Arc::clone(&self.moves);
        let axis = axis.to_string();

        Ok(async move {
            sleep(delay).await;
            if jammed {
                return Err(RemoteError::Failed(format!("axis '{}' is jammed", axis)));
            }
            if let Some(pos) = positions.lock().get_mut(&axis) {
                *pos += distance_m;
            }
            moves.lock().push((axis, distance_m));
            Ok(())
        }
        .boxed())
    }

    fn stop(&self) -> RemoteResult<()> {
        if self.stop_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed("controller not answering".to_string()));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// SimComponent - Graph Node
// =============================================================================

/// A simulated component assembled from attributes, data-flows and axes.
pub struct SimComponent {
    name: String,
    role: String,
    children: Vec<Arc<SimComponent>>,
    affects: Vec<String>,
    ro_attributes: Vec<(String, Value)>,
    attributes: Vec<(String, Arc<SimAttribute>)>,
    data_flows: Vec<(String, Arc<SimDataFlow>)>,
    axes: Option<SimAxes>,
}

impl SimComponent {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            children: Vec::new(),
            affects: Vec::new(),
            ro_attributes: Vec::new(),
            attributes: Vec::new(),
            data_flows: Vec::new(),
            axes: None,
        }
    }

    pub fn with_child(mut self, child: Arc<SimComponent>) -> Self {
        self.children.push(child);
        self
    }

    pub fn affecting(mut self, name: impl Into<String>) -> Self {
        self.affects.push(name.into());
        self
    }

    pub fn with_ro_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.ro_attributes.push((name.into(), value));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: SimAttribute) -> Self {
        self.attributes.push((name.into(), Arc::new(attribute)));
        self
    }

    pub fn with_data_flow(mut self, name: impl Into<String>, data_flow: SimDataFlow) -> Self {
        self.data_flows.push((name.into(), Arc::new(data_flow)));
        self
    }

    pub fn with_axes(mut self, axes: SimAxes) -> Self {
        self.axes = Some(axes);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn attribute(&self, name: &str) -> Option<Arc<SimAttribute>> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| Arc::clone(a))
    }

    pub fn data_flow(&self, name: &str) -> Option<Arc<SimDataFlow>> {
        self.data_flows
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| Arc::clone(d))
    }

    pub fn sim_axes(&self) -> Option<&SimAxes> {
        self.axes.as_ref()
    }

    fn collect_into(self: &Arc<Self>, all: &mut Vec<Arc<SimComponent>>) {
        if all.iter().any(|c| c.name == self.name) {
            return;
        }
        all.push(Arc::clone(self));
        for child in &self.children {
            child.collect_into(all);
        }
    }
}

#[async_trait]
impl RemoteComponent for SimComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    async fn children(&self) -> RemoteResult<Vec<Component>> {
        Ok(self
            .children
            .iter()
            .map(|c| Arc::clone(c) as Component)
            .collect())
    }

    async fn affects(&self) -> RemoteResult<Vec<String>> {
        Ok(self.affects.clone())
    }

    async fn ro_attributes(&self) -> RemoteResult<Vec<(String, Value)>> {
        let mut attrs = vec![
            ("name".to_string(), Value::from(self.name.as_str())),
            ("role".to_string(), Value::from(self.role.as_str())),
        ];
        if let Some(axes) = &self.axes {
            attrs.push(("axes".to_string(), Value::list(axes.names().into_iter().map(Value::from))));
        }
        attrs.extend(self.ro_attributes.iter().cloned());
        Ok(attrs)
    }

    async fn vigilant_attributes(&self) -> RemoteResult<Vec<(String, Arc<dyn VigilantAttribute>)>> {
        Ok(self
            .attributes
            .iter()
            .map(|(n, a)| (n.clone(), Arc::clone(a) as Arc<dyn VigilantAttribute>))
            .collect())
    }

    async fn data_flows(&self) -> RemoteResult<Vec<(String, Arc<dyn DataFlow>)>> {
        Ok(self
            .data_flows
            .iter()
            .map(|(n, d)| (n.clone(), Arc::clone(d) as Arc<dyn DataFlow>))
            .collect())
    }

    async fn axes(&self) -> RemoteResult<Vec<String>> {
        Ok(self.axes.as_ref().map(SimAxes::names).unwrap_or_default())
    }

    async fn move_relative(&self, axis: &str, distance_m: f64) -> RemoteResult<MoveFuture> {
        match &self.axes {
            Some(axes) => axes.start_move(axis, distance_m),
            None => Err(RemoteError::NotSupported(format!("'{}' is not an actuator", self.name))),
        }
    }

    async fn stop(&self) -> RemoteResult<()> {
        match &self.axes {
            Some(axes) => axes.stop(),
            None => Err(RemoteError::NotSupported(format!("'{}' is not an actuator", self.name))),
        }
    }
}

// =============================================================================
// SimBackend - Backend Root
// =============================================================================

/// Simulated backend process.
///
/// A backend can be running (answers every call), unresponsive (the process
/// exists but calls fail) or stopped (after `terminate()`).
pub struct SimBackend {
    root: Arc<SimComponent>,
    detectors: Vec<Arc<SimComponent>>,
    emitters: Vec<Arc<SimComponent>>,
    actuators: Vec<Arc<SimComponent>>,
    all: Vec<Arc<SimComponent>>,
    scan_results: Vec<ScannedDevice>,
    running: AtomicBool,
    responsive: AtomicBool,
}

impl SimBackend {
    pub fn new(
        root: SimComponent,
        detectors: Vec<Arc<SimComponent>>,
        emitters: Vec<Arc<SimComponent>>,
        actuators: Vec<Arc<SimComponent>>,
    ) -> Self {
        let root = root.into_arc();
        let mut all = Vec::new();
        root.collect_into(&mut all);
        for comp in detectors.iter().chain(&emitters).chain(&actuators) {
            comp.collect_into(&mut all);
        }
        Self {
            root,
            detectors,
            emitters,
            actuators,
            all,
            scan_results: Vec::new(),
            running: AtomicBool::new(true),
            responsive: AtomicBool::new(true),
        }
    }

    /// A small optical microscope: one camera, one light source, a two-axis
    /// stage with its controller, and a focus actuator.
    pub fn demo() -> Self {
        let camera = SimComponent::new("Camera", "ccd")
            .affecting("Light")
            .with_ro_attribute("shape", Value::tuple([320u32, 240, 4096].map(Value::from)))
            .with_ro_attribute("pixelSize", Value::tuple([Value::Float(6.45e-6), Value::Float(6.45e-6)]))
            .with_attribute(
                "exposureTime",
                SimAttribute::new(Value::Float(0.1))
                    .with_unit("s")
                    .with_range(Value::Float(1e-6), Value::Float(10.0)),
            )
            .with_attribute(
                "binning",
                SimAttribute::new(Value::tuple([Value::Int(1), Value::Int(1)])),
            )
            .with_attribute(
                "resolution",
                SimAttribute::new(Value::tuple([Value::Int(320), Value::Int(240)]))
                    .with_unit("px")
                    .read_only(),
            )
            .with_attribute(
                "gain",
                SimAttribute::new(Value::Int(1)).with_choices([1, 2, 4].map(Value::Int)),
            )
            .with_attribute(
                "metadata",
                SimAttribute::new(Value::mapping([(Value::from("operator"), Value::from(""))])),
            )
            .with_data_flow("data", SimDataFlow::new(320, 240))
            .into_arc();

        let light = SimComponent::new("Light", "light")
            .affecting("Camera")
            .with_attribute(
                "power",
                SimAttribute::new(Value::Float(0.0))
                    .with_unit("W")
                    .with_range(Value::Float(0.0), Value::Float(100.0)),
            )
            .with_attribute(
                "emissions",
                SimAttribute::new(Value::list([Value::Float(0.0), Value::Float(0.0), Value::Float(0.0)])),
            )
            .into_arc();

        let controller = SimComponent::new("Stage Controller", "controller")
            .with_ro_attribute("port", Value::from("/dev/ttyUSB0"))
            .into_arc();

        let stage = SimComponent::new("Stage", "stage")
            .with_child(controller)
            .affecting("Camera")
            .with_axes(SimAxes::new(["x", "y"]))
            .with_attribute(
                "speed",
                SimAttribute::new(Value::mapping([
                    (Value::from("x"), Value::Float(0.001)),
                    (Value::from("y"), Value::Float(0.001)),
                ]))
                .with_unit("m/s"),
            )
            .into_arc();

        let focus = SimComponent::new("Focus", "focus")
            .affecting("Camera")
            .with_axes(SimAxes::new(["z"]).with_speed(0.5))
            .into_arc();

        let mut backend = Self::new(
            SimComponent::new("SimScope", "optical"),
            vec![camera],
            vec![light],
            vec![stage, focus],
        );
        backend.scan_results = vec![ScannedDevice {
            driver: "simcam.SimCam".to_string(),
            name: "Simulated Camera".to_string(),
            init: vec![("device".to_string(), Value::Int(0))],
        }];
        backend
    }

    /// Typed access to any component, for inspection.
    pub fn component(&self, name: &str) -> Option<Arc<SimComponent>> {
        self.all.iter().find(|c| c.name == name).cloned()
    }

    /// Simulate a backend process that stopped answering.
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> RemoteResult<()> {
        if !self.is_running() {
            return Err(RemoteError::Disconnected("back-end is not running".to_string()));
        }
        if !self.responsive.load(Ordering::SeqCst) {
            return Err(RemoteError::Disconnected("back-end did not answer".to_string()));
        }
        Ok(())
    }
}

fn as_components(set: &[Arc<SimComponent>]) -> Vec<Component> {
    set.iter().map(|c| Arc::clone(c) as Component).collect()
}

#[async_trait]
impl Backend for SimBackend {
    async fn microscope(&self) -> RemoteResult<Microscope> {
        self.check_alive()?;
        Ok(Microscope {
            root: Arc::clone(&self.root) as Component,
            detectors: as_components(&self.detectors),
            emitters: as_components(&self.emitters),
            actuators: as_components(&self.actuators),
        })
    }

    async fn components(&self) -> RemoteResult<Vec<Component>> {
        self.check_alive()?;
        Ok(as_components(&self.all))
    }

    async fn terminate(&self) -> RemoteResult<()> {
        self.check_alive()?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn scan(&self) -> RemoteResult<Vec<ScannedDevice>> {
        if self.is_running() {
            return Err(RemoteError::Failed("back-end is running".to_string()));
        }
        Ok(self.scan_results.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attribute_range_and_readonly() {
        let power = SimAttribute::new(Value::Float(0.0)).with_range(Value::Float(0.0), Value::Float(100.0));
        assert!(power.set_value(Value::Float(50.0)).await.is_ok());
        assert!(matches!(
            power.set_value(Value::Float(150.0)).await,
            Err(RemoteError::OutOfRange(_))
        ));
        assert_eq!(power.get(), Value::Float(50.0));

        let res = SimAttribute::new(Value::tuple([Value::Int(1), Value::Int(1)])).read_only();
        assert_eq!(
            res.set_value(Value::tuple([Value::Int(2), Value::Int(2)])).await,
            Err(RemoteError::ReadOnly)
        );
        assert_eq!(res.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_attribute_tuple_range_is_per_item() {
        let resolution = SimAttribute::new(Value::tuple([Value::Int(640), Value::Int(480)])).with_range(
            Value::tuple([Value::Int(1), Value::Int(1)]),
            Value::tuple([Value::Int(640), Value::Int(480)]),
        );
        resolution
            .set_value(Value::tuple([Value::Int(100), Value::Int(100)]))
            .await
            .unwrap();
        assert_eq!(resolution.get(), Value::tuple([Value::Int(100), Value::Int(100)]));

        assert!(matches!(
            resolution
                .set_value(Value::tuple([Value::Int(100), Value::Int(481)]))
                .await,
            Err(RemoteError::OutOfRange(_))
        ));
        assert!(matches!(
            resolution
                .set_value(Value::tuple([Value::Int(0), Value::Int(10)]))
                .await,
            Err(RemoteError::OutOfRange(_))
        ));
        assert_eq!(resolution.get(), Value::tuple([Value::Int(100), Value::Int(100)]));
    }

    #[tokio::test]
    async fn test_attribute_unordered_range_is_not_enforced() {
        let flag = SimAttribute::new(Value::Bool(false)).with_range(Value::from("a"), Value::from("z"));
        flag.set_value(Value::Bool(true)).await.unwrap();
        assert_eq!(flag.get(), Value::Bool(true));
    }

    #[tokio::test]
    async fn test_attribute_rejects_wrong_shape_and_choice() {
        let gain = SimAttribute::new(Value::Int(1)).with_choices([Value::Int(1), Value::Int(2)]);
        assert!(matches!(
            gain.set_value(Value::Float(2.0)).await,
            Err(RemoteError::TypeMismatch { .. })
        ));
        assert!(matches!(
            gain.set_value(Value::Int(3)).await,
            Err(RemoteError::InvalidChoice(_))
        ));
        gain.set_value(Value::Int(2)).await.unwrap();
        assert_eq!(gain.get(), Value::Int(2));
    }

    #[tokio::test]
    async fn test_attribute_notifies_watchers() {
        let power = SimAttribute::new(Value::Float(0.0));
        let mut rx = power.subscribe();
        power.set_value(Value::Float(3.0)).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Value::Float(3.0));
    }

    #[tokio::test]
    async fn test_axes_relative_moves() {
        let axes = SimAxes::new(["x"]).with_speed(10.0);
        axes.start_move("x", 0.01).unwrap().await.unwrap();
        axes.start_move("x", -0.004).unwrap().await.unwrap();
        let pos = axes.position("x").unwrap();
        assert!((pos - 0.006).abs() < 1e-12);
        assert_eq!(axes.completed_moves().len(), 2);

        axes.jam("x");
        assert!(axes.start_move("x", 0.001).unwrap().await.is_err());
        assert!(axes.start_move("q", 0.001).is_err());
    }

    #[tokio::test]
    async fn test_data_flow_get_and_subscribe() {
        let df = SimDataFlow::new(8, 4).with_period(Duration::from_millis(5));
        let frame = df.get().await.unwrap();
        assert_eq!(frame.dimensions(), (8, 4));

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = df
            .subscribe(Arc::new(move |_frame| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        sleep(Duration::from_millis(60)).await;
        df.unsubscribe(id);
        df.unsubscribe(id);
        assert!(count.load(Ordering::SeqCst) > 0);
        assert_eq!(df.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_data_flow_get_failure() {
        let df = SimDataFlow::new(2, 2).with_period(Duration::from_millis(1));
        df.set_failing(true);
        assert!(df.get().await.is_err());
    }

    #[tokio::test]
    async fn test_backend_lifecycle() {
        let backend = SimBackend::demo();
        let scope = backend.microscope().await.unwrap();
        assert_eq!(scope.name(), "SimScope");
        assert_eq!(scope.actuators.len(), 2);
        assert!(backend.scan().await.is_err());

        backend.set_responsive(false);
        assert!(backend.microscope().await.is_err());
        backend.set_responsive(true);

        backend.terminate().await.unwrap();
        assert!(!backend.is_running());
        assert!(backend.microscope().await.is_err());
        assert_eq!(backend.scan().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_components_include_intermediate_nodes() {
        let backend = SimBackend::demo();
        let names: Vec<String> = backend
            .components()
            .await
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(names.contains(&"Stage Controller".to_string()));
        assert!(names.contains(&"SimScope".to_string()));
        assert_eq!(names.len(), 6);
    }
}
