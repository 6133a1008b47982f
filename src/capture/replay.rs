//! Replay of a pre-extracted landmark feed.
//!
//! The feed is JSON Lines, one frame per line:
//!
//! ```text
//! {"width":640,"height":480,"faces":[{"bounds":{"left":80,"top":60,"right":300,"bottom":320},"points":[{"x":1.0,"y":2.0}, ...]}]}
//! ```
//!
//! Blank lines are skipped. A malformed line ends the stream.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::capture::{CaptureBackend, CaptureError, Frame, FrameSource};
use crate::detection::landmarks::{EmbeddedLandmarks, FaceLandmarks, LandmarkSource};

#[derive(Debug, Deserialize)]
struct FeedLine {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    faces: Vec<FaceLandmarks>,
}

pub struct FeedFrameSource {
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    seq: u64,
}

impl FeedFrameSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path).map_err(|e| {
            CaptureError::SourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        Ok(Self {
            lines: Some(BufReader::new(file).lines()),
            line_no: 0,
            seq: 0,
        })
    }
}

impl FrameSource for FeedFrameSource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        for line in lines.by_ref() {
            self.line_no += 1;
            let line = line
                .map_err(|e| CaptureError::Read(format!("feed line {}: {e}", self.line_no)))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: FeedLine =
                serde_json::from_str(&line).map_err(|source| CaptureError::Decode {
                    line: self.line_no,
                    source,
                })?;
            self.seq += 1;
            return Ok(Some(Frame {
                seq: self.seq,
                width: parsed.width,
                height: parsed.height,
                landmarks: parsed.faces,
            }));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.lines = None;
    }
}

/// Default backend: replays the configured feed file with its embedded
/// landmarks.
#[derive(Debug, Clone)]
pub struct FeedBackend {
    path: PathBuf,
}

impl FeedBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureBackend for FeedBackend {
    fn open(&self) -> Result<(Box<dyn FrameSource>, Box<dyn LandmarkSource>), CaptureError> {
        let source = FeedFrameSource::open(&self.path)?;
        Ok((Box::new(source), Box::new(EmbeddedLandmarks)))
    }

    fn describe(&self) -> String {
        format!("feed:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::detection::landmarks::synthetic_face;

    fn write_feed(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn face_line(vertical: f64) -> String {
        serde_json::json!({
            "width": 640,
            "height": 480,
            "faces": [synthetic_face(vertical)],
        })
        .to_string()
    }

    #[test]
    fn reads_frames_in_order_and_skips_blank_lines() {
        let feed = write_feed(&[face_line(6.0), String::new(), "{}".to_string()]);
        let mut source = FeedFrameSource::open(feed.path()).unwrap();

        let first = source.read().unwrap().unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.width, 640);
        assert_eq!(first.landmarks.len(), 1);
        assert_eq!(first.landmarks[0].points.len(), 68);

        let second = source.read().unwrap().unwrap();
        assert_eq!(second.seq, 2);
        assert!(second.landmarks.is_empty());

        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let feed = write_feed(&["{}".to_string(), "not json".to_string()]);
        let mut source = FeedFrameSource::open(feed.path()).unwrap();
        source.read().unwrap();
        let err = source.read().unwrap_err();
        assert!(matches!(err, CaptureError::Decode { line: 2, .. }));
    }

    #[test]
    fn undecodable_bytes_are_a_read_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}\n\xff\xfe\n").unwrap();
        let mut source = FeedFrameSource::open(file.path()).unwrap();
        source.read().unwrap();
        let err = source.read().unwrap_err();
        assert!(matches!(err, CaptureError::Read(ref msg) if msg.starts_with("feed line 2")));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let backend = FeedBackend::new("/definitely/not/here.jsonl");
        assert!(matches!(
            backend.open().err(),
            Some(CaptureError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn released_source_reports_end_of_stream() {
        let feed = write_feed(&[face_line(6.0)]);
        let (mut source, _) = FeedBackend::new(feed.path()).open().unwrap();
        source.release();
        assert!(source.read().unwrap().is_none());
    }
}
