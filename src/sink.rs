//! Where captured frames go: an image file or a live display.

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Luma};
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{CliError, CliResult};
use crate::frame::{bytescale, Frame};

/// Writes one frame as a single-page image file.
pub trait PersistenceSink: Send + Sync {
    fn persist(&self, frame: &Frame, path: &Path) -> CliResult<()>;
}

/// 16-bit greyscale TIFF writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffSink;

impl PersistenceSink for TiffSink {
    fn persist(&self, frame: &Frame, path: &Path) -> CliResult<()> {
        let (width, height) = frame.dimensions();
        let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(width, height, frame.pixels().to_vec()).ok_or_else(|| {
                CliError::Persistence(format!("frame buffer does not match {}x{}", width, height))
            })?;
        buffer
            .save_with_format(path, ImageFormat::Tiff)
            .map_err(|e| CliError::Persistence(format!("{}: {}", path.display(), e)))?;
        info!("Saved {}x{} frame to {}", width, height, path.display());
        Ok(())
    }
}

/// A window-like consumer of a stream of frames.
///
/// `show` is called from the backend's delivery context, possibly while the
/// caller is blocked in `wait_closed`.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    fn open(&self, title: &str, initial_size: (u32, u32));

    /// Display one frame, resizing to its dimensions.
    fn show(&self, frame: &Frame);

    /// Resolve once the user closed the display.
    async fn wait_closed(&self);
}

#[derive(Debug, Default)]
struct DisplayState {
    title: String,
    size: (u32, u32),
    frames: u64,
}

/// Display sink printing one status line per frame to stdout.
///
/// Closed by Ctrl-C or by [`TerminalDisplay::close`].
pub struct TerminalDisplay {
    state: Mutex<DisplayState>,
    preview_columns: Option<u32>,
    closed: watch::Sender<bool>,
    interruptible: bool,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DisplayState::default()),
            preview_columns: None,
            closed: watch::Sender::new(false),
            interruptible: true,
        }
    }

    /// Also print a coarse preview, `columns` characters wide.
    pub fn with_preview(mut self, columns: u32) -> Self {
        self.preview_columns = Some(columns.max(1));
        self
    }

    /// Ignore Ctrl-C; only [`TerminalDisplay::close`] ends the wait.
    pub fn without_interrupt(mut self) -> Self {
        self.interruptible = false;
        self
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Current displayed size.
    pub fn size(&self) -> (u32, u32) {
        self.state.lock().size
    }

    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    pub fn frames_shown(&self) -> u64 {
        self.state.lock().frames
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplaySink for TerminalDisplay {
    fn open(&self, title: &str, initial_size: (u32, u32)) {
        let mut state = self.state.lock();
        state.title = title.to_string();
        state.size = initial_size;
        println!("{} ({}x{})", title, initial_size.0, initial_size.1);
    }

    fn show(&self, frame: &Frame) {
        let (count, resized) = {
            let mut state = self.state.lock();
            state.frames += 1;
            let resized = state.size != frame.dimensions();
            state.size = frame.dimensions();
            (state.frames, resized)
        };
        if resized {
            debug!("Display resized to {}x{}", frame.width(), frame.height());
        }

        let (min, max) = frame.min_max().unwrap_or((0, 0));
        let mut out = std::io::stdout().lock();
        let mut line = format!(
            "frame {:>5}  {}x{}  min {:>5}  max {:>5}  {}",
            count,
            frame.width(),
            frame.height(),
            min,
            max,
            frame.timestamp().format("%H:%M:%S%.3f")
        );
        if let Some(columns) = self.preview_columns {
            line.push('\n');
            line.push_str(&ascii_preview(frame, columns));
        }
        if let Err(e) = writeln!(out, "{}", line) {
            warn!("Failed to print frame: {}", e);
        }
    }

    async fn wait_closed(&self) {
        let closed = closed_signal(self.closed.subscribe());
        if !self.interruptible {
            return closed.await;
        }
        tokio::select! {
            () = closed => {}
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    closed_signal(self.closed.subscribe()).await;
                }
            }
        }
    }
}

async fn closed_signal(mut closed: watch::Receiver<bool>) {
    // The sender lives in the display, so this only ends once closed.
    let _ = closed.wait_for(|c| *c).await;
}

const PREVIEW_RAMP: &[u8] = b" .:-=+*#%@";

/// Render a frame as text, `columns` characters wide.
///
/// Characters are about twice as tall as wide, so each row covers two
/// column-widths of pixels.
pub fn ascii_preview(frame: &Frame, columns: u32) -> String {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return String::new();
    }
    let columns = columns.clamp(1, width);
    let step = (width / columns).max(1);
    let rows = (height / (step * 2)).max(1);
    let scaled = bytescale(frame);

    let mut out = String::with_capacity(((columns + 1) * rows) as usize);
    for row in 0..rows {
        let y = (row * step * 2).min(height - 1);
        for col in 0..columns {
            let x = (col * step).min(width - 1);
            let level = scaled[(y * width + x) as usize] as usize;
            out.push(PREVIEW_RAMP[level * (PREVIEW_RAMP.len() - 1) / 255] as char);
        }
        if row + 1 < rows {
            out.push('\n');
        }
    }
    out
}
