//! Snapshot and continuous acquisition from detector data-flows.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{Component, DataFlow, RemoteObject, SubscriptionId};
use crate::error::{CliError, CliResult, ObjectKind};
use crate::frame::Frame;
use crate::resolve::resolve_detector;
use crate::session::Session;
use crate::sink::{DisplaySink, PersistenceSink};

/// Fetch the data-flow `name` of `component`.
pub async fn resolve_data_flow(component: &Component, name: &str) -> CliResult<Arc<dyn DataFlow>> {
    let object = component
        .lookup(name)
        .await
        .map_err(|e| CliError::from_remote(component.name(), e))?;
    match object {
        None => Err(CliError::not_found(ObjectKind::DataFlow, name)),
        Some(RemoteObject::DataFlow(df)) => Ok(df),
        Some(_) => Err(CliError::NotDataFlow {
            component: component.name().to_string(),
            dataflow: name.to_string(),
        }),
    }
}

/// What a snapshot did with each captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Data-flow whose frame was written.
    pub persisted: String,
    pub dimensions: (u32, u32),
    /// Data-flows captured but not written.
    pub discarded: Vec<String>,
}

/// Take one frame from each data-flow and save the first one to `path`.
///
/// An empty `dataflows` uses the configured default data-flow. Every name is
/// resolved before the first frame is requested.
pub async fn acquire(
    session: &Session,
    detector: &str,
    dataflows: &[String],
    path: &Path,
    sink: &dyn PersistenceSink,
) -> CliResult<Snapshot> {
    let names = with_default(session, dataflows);
    let comp = resolve_detector(session, detector).await?;

    let mut flows = Vec::with_capacity(names.len());
    for name in &names {
        flows.push((name.clone(), resolve_data_flow(&comp, name).await?));
    }

    let mut frames: Vec<(String, Frame)> = Vec::with_capacity(flows.len());
    for (name, df) in flows {
        let frame = df.get().await.map_err(|e| CliError::AcquisitionFailed {
            component: detector.to_string(),
            dataflow: name.clone(),
            reason: e.to_string(),
        })?;
        info!(
            "Acquired an image of dimension {}x{} from {}.{}",
            frame.width(),
            frame.height(),
            detector,
            name
        );
        frames.push((name, frame));
    }

    let mut frames = frames.into_iter();
    let Some((persisted, first)) = frames.next() else {
        return Err(CliError::Usage("no data-flow to acquire from".to_string()));
    };
    let discarded: Vec<String> = frames.map(|(name, _)| name).collect();
    if !discarded.is_empty() {
        // Single-page output only; the other frames are dropped.
        warn!(
            "Only the frame of '{}' is saved, discarding {}",
            persisted,
            discarded.join(", ")
        );
    }

    sink.persist(&first, path)?;
    Ok(Snapshot {
        persisted,
        dimensions: first.dimensions(),
        discarded,
    })
}

fn with_default(session: &Session, dataflows: &[String]) -> Vec<String> {
    if dataflows.is_empty() {
        vec![session.settings().acquisition.default_dataflow.clone()]
    } else {
        dataflows.to_vec()
    }
}

/// A data-flow registration, removed when dropped.
///
/// The callback is guarded by a cancel flag set before unsubscribing, so a
/// frame already in flight during teardown is dropped instead of delivered.
pub struct Subscription {
    data_flow: Arc<dyn DataFlow>,
    id: SubscriptionId,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    pub async fn start<F>(data_flow: Arc<dyn DataFlow>, on_frame: F) -> CliResult<Self>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let callback = Arc::new(move |frame: Frame| {
            if !flag.load(Ordering::SeqCst) {
                on_frame(frame);
            }
        });
        // Silences the callback if this future is dropped before an id comes
        // back, since the registration then has no guard to remove it.
        let mut pending = CancelOnDrop(Some(Arc::clone(&cancelled)));
        let id = data_flow
            .subscribe(callback)
            .await
            .map_err(|e| CliError::from_remote("data-flow subscription", e))?;
        pending.0 = None;
        debug!("Subscribed to data-flow ({:?})", id);
        Ok(Self {
            data_flow,
            id,
            cancelled,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.data_flow.unsubscribe(self.id);
        debug!("Unsubscribed from data-flow ({:?})", self.id);
    }
}

struct CancelOnDrop(Option<Arc<AtomicBool>>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Size to open the display with: the detector's `resolution` if it is a
/// pair of integers, otherwise the configured default.
pub async fn initial_size(session: &Session, component: &Component) -> (u32, u32) {
    let fallback = session.settings().display.initial_size;
    let value = match component.lookup("resolution").await {
        Ok(Some(RemoteObject::Attribute(va))) => va.value().await.ok(),
        Ok(Some(RemoteObject::Plain(value))) => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!("Cannot read resolution of {}: {}", component.name(), e);
            None
        }
    };
    value.and_then(|v| v.as_size()).unwrap_or(fallback)
}

/// Forward every frame of `detector.dataflow` to `display` until it is closed.
///
/// The subscription is removed on every exit path, including cancellation of
/// the returned future.
pub async fn live_display(
    session: &Session,
    detector: &str,
    dataflow: Option<&str>,
    display: Arc<dyn DisplaySink>,
) -> CliResult<()> {
    let dataflow = dataflow.unwrap_or(&session.settings().acquisition.default_dataflow);
    let comp = resolve_detector(session, detector).await?;
    let df = resolve_data_flow(&comp, dataflow).await?;

    let size = initial_size(session, &comp).await;
    display.open(&format!("Live from {}.{}", detector, dataflow), size);

    let sink = Arc::clone(&display);
    let subscription = Subscription::start(df, move |frame| sink.show(&frame)).await?;
    display.wait_closed().await;
    drop(subscription);

    info!("Live display of {}.{} closed", detector, dataflow);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{SimBackend, SimDataFlow};
    use crate::config::Settings;
    use crate::sink::TiffSink;
    use crate::backend::{FrameCallback, RemoteError, RemoteResult};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Registers the callback, then never answers.
    #[derive(Default)]
    struct StalledDataFlow {
        registered: parking_lot::Mutex<Vec<FrameCallback>>,
    }

    #[async_trait::async_trait]
    impl DataFlow for StalledDataFlow {
        async fn get(&self) -> RemoteResult<Frame> {
            Err(RemoteError::Disconnected("stalled".into()))
        }

        async fn subscribe(&self, callback: FrameCallback) -> RemoteResult<SubscriptionId> {
            self.registered.lock().push(callback);
            std::future::pending().await
        }

        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    fn demo() -> (Arc<SimBackend>, Session) {
        let backend = Arc::new(SimBackend::demo());
        let session = Session::new(backend.clone(), Settings::default());
        (backend, session)
    }

    #[tokio::test]
    async fn test_data_flow_resolution() {
        let (backend, _) = demo();
        let camera: Component = backend.component("Camera").unwrap();
        assert!(resolve_data_flow(&camera, "data").await.is_ok());
        assert!(matches!(
            resolve_data_flow(&camera, "nope").await,
            Err(CliError::NotFound { kind: ObjectKind::DataFlow, .. })
        ));
        assert!(matches!(
            resolve_data_flow(&camera, "exposureTime").await,
            Err(CliError::NotDataFlow { .. })
        ));
    }

    #[tokio::test]
    async fn test_acquire_default_data_flow() {
        let (_, session) = demo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tiff");

        let snapshot = acquire(&session, "Camera", &[], &path, &TiffSink).await.unwrap();
        assert_eq!(snapshot.persisted, "data");
        assert_eq!(snapshot.dimensions, (320, 240));
        assert!(snapshot.discarded.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_acquire_only_from_detectors() {
        let (_, session) = demo();
        let dir = tempfile::tempdir().unwrap();
        let err = acquire(&session, "Stage", &[], &dir.path().join("x.tiff"), &TiffSink)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound { kind: ObjectKind::Detector, .. }));
    }

    #[tokio::test]
    async fn test_acquire_resolves_all_before_capturing() {
        let (backend, session) = demo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tiff");
        let names = vec!["data".to_string(), "missing".to_string()];

        let err = acquire(&session, "Camera", &names, &path, &TiffSink).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound { kind: ObjectKind::DataFlow, .. }));
        let df = backend.component("Camera").unwrap().data_flow("data").unwrap();
        assert_eq!(df.frames_produced(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_acquire_failure_writes_nothing() {
        let (backend, session) = demo();
        backend
            .component("Camera")
            .unwrap()
            .data_flow("data")
            .unwrap()
            .set_failing(true);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tiff");
        let err = acquire(&session, "Camera", &[], &path, &TiffSink).await.unwrap_err();
        assert!(matches!(err, CliError::AcquisitionFailed { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_subscription_drop_stops_delivery() {
        let df = Arc::new(SimDataFlow::new(4, 4).with_period(Duration::from_millis(5)));
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let subscription = Subscription::start(df.clone(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(subscription);
        assert_eq!(df.subscriber_count(), 0);

        let after_drop = count.load(Ordering::SeqCst);
        assert!(after_drop > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_initial_size_from_resolution() {
        let (backend, session) = demo();
        let camera: Component = backend.component("Camera").unwrap();
        assert_eq!(initial_size(&session, &camera).await, (320, 240));

        let light: Component = backend.component("Light").unwrap();
        assert_eq!(initial_size(&session, &light).await, (640, 480));
    }

    #[tokio::test]
    async fn test_abandoned_subscribe_silences_callback() {
        let flow = Arc::new(StalledDataFlow::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);

        let attempt = Subscription::start(flow.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), attempt)
            .await
            .is_err());

        let callbacks = flow.registered.lock().clone();
        assert_eq!(callbacks.len(), 1);
        callbacks[0](Frame::new(1, 1, 12, vec![0]).unwrap());
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }
}
