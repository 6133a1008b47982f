use std::io::Write;
use std::path::Path;

use blink_monitor::detection::{FaceBounds, FaceLandmarks, Point};

/// 68-point face whose eyes have EAR `eye_vertical / 30`.
pub fn face_with_eye_opening(eye_vertical: f64) -> FaceLandmarks {
    let mut points = vec![Point::new(0.0, 0.0); 68];
    for (offset, start) in [(100.0, 36), (200.0, 42)] {
        let half = eye_vertical / 2.0;
        let eye = [
            Point::new(offset, 50.0),
            Point::new(offset + 10.0, 50.0 - half),
            Point::new(offset + 20.0, 50.0 - half),
            Point::new(offset + 30.0, 50.0),
            Point::new(offset + 20.0, 50.0 + half),
            Point::new(offset + 10.0, 50.0 + half),
        ];
        points[start..start + 6].copy_from_slice(&eye);
    }
    FaceLandmarks {
        bounds: FaceBounds {
            left: 80,
            top: 10,
            right: 250,
            bottom: 200,
        },
        points,
    }
}

/// Write a JSON Lines feed, one frame per EAR value; `None` is a frame
/// without faces.
pub fn write_feed(path: &Path, ears: &[Option<f64>]) {
    let mut file = std::fs::File::create(path).expect("create feed");
    for ear in ears {
        let faces = match ear {
            Some(ear) => vec![face_with_eye_opening(ear * 30.0)],
            None => Vec::new(),
        };
        let line = serde_json::json!({ "width": 640, "height": 480, "faces": faces });
        writeln!(file, "{line}").expect("write feed line");
    }
}

/// Open eyes for 10 frames, closed for 5, repeated `blinks` times.
pub fn blink_sequence(blinks: usize) -> Vec<Option<f64>> {
    let mut ears = Vec::new();
    for _ in 0..blinks {
        ears.extend(std::iter::repeat(Some(0.32)).take(10));
        ears.extend(std::iter::repeat(Some(0.12)).take(5));
    }
    ears.extend(std::iter::repeat(Some(0.32)).take(10));
    ears
}
