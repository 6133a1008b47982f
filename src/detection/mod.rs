pub mod blink;
pub mod geometry;
pub mod landmarks;

pub use blink::{BlinkConfig, BlinkCounter, BlinkEstimator, BlinkPolicy, BlinkUpdate};
pub use geometry::{EyeContour, GeometryError, Point};
pub use landmarks::{FaceBounds, FaceLandmarks, LandmarkError, LandmarkSource};
