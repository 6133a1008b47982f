use crate::capture::{FaceAnnotation, Frame};
use crate::detection::blink::BlinkEstimator;
use crate::detection::landmarks::LandmarkSource;

#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub faces: Vec<FaceAnnotation>,
    pub blinked: bool,
}

/// Locate faces, run the estimator once per face and collect overlays.
///
/// A frame without faces leaves the estimator untouched (the cooldown does
/// not decay). Faces whose landmarks cannot be turned into two valid eye
/// contours are skipped.
pub fn process_frame(
    estimator: &mut BlinkEstimator,
    landmarks: &mut dyn LandmarkSource,
    frame: &Frame,
) -> FrameOutcome {
    let faces = match landmarks.locate(frame) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::warn!(seq = frame.seq, error = %e, "Landmark detection failed");
            return FrameOutcome::default();
        }
    };

    let mut outcome = FrameOutcome {
        faces: Vec::with_capacity(faces.len()),
        blinked: false,
    };

    for face in &faces {
        let (left, right) = match face.eyes() {
            Ok(eyes) => eyes,
            Err(e) => {
                tracing::warn!(seq = frame.seq, error = %e, "Skipping face");
                continue;
            }
        };

        let update = match estimator.update(&left, &right) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(seq = frame.seq, error = %e, "Skipping face");
                continue;
            }
        };

        if update.blinked {
            tracing::debug!(seq = frame.seq, ear = update.ear, "Blink counted");
        }
        outcome.blinked |= update.blinked;
        outcome.faces.push(FaceAnnotation {
            bounds: face.bounds,
            left_eye: *left.points(),
            right_eye: *right.points(),
            ear: update.ear,
            eye_closed: update.eye_closed,
        });
    }

    outcome
}
