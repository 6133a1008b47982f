//! Frame capture: sources, per-frame processing and the session controller.

pub mod controller;
pub mod pipeline;
pub mod replay;
pub mod stats;

use serde::Serialize;
use thiserror::Error;

use crate::detection::geometry::Point;
use crate::detection::landmarks::{FaceBounds, FaceLandmarks, LandmarkSource};

pub use controller::{CaptureController, CaptureStatus, StopReport};
pub use replay::FeedBackend;
pub use stats::FrameStats;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("capture is already running")]
    AlreadyRunning,
    #[error("capture is not running")]
    NotRunning,
    #[error("previous capture session is still stopping")]
    Stopping,
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("malformed feed line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One captured frame.
///
/// `landmarks` carries detections computed upstream (replayed feeds); raw
/// camera frames leave it empty and rely on a real [`LandmarkSource`].
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub landmarks: Vec<FaceLandmarks>,
}

/// A device producing frames. `read` returning `Ok(None)` is end of stream.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    fn release(&mut self) {}
}

/// Opens a fresh frame/landmark source pair for each capture session.
pub trait CaptureBackend: Send + Sync {
    fn open(&self) -> Result<(Box<dyn FrameSource>, Box<dyn LandmarkSource>), CaptureError>;

    fn describe(&self) -> String;
}

/// Overlay data for one face: what the display layer draws.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnnotation {
    pub bounds: FaceBounds,
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub ear: f64,
    pub eye_closed: bool,
}

/// Annotated result of one processed frame, streamed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<FaceAnnotation>,
    pub blinked: bool,
    pub blink_count: u64,
    pub fps: f64,
    pub latency_us: u64,
}

impl FrameReport {
    /// The overlay caption, e.g. `FPS: 29 | Blinks: 4`.
    pub fn caption(&self) -> String {
        format!("FPS: {} | Blinks: {}", self.fps as u64, self.blink_count)
    }
}
