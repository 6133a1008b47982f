//! 人脸关键点（68 点布局）与双眼切片

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::Frame;
use crate::constants::{FACE_LANDMARK_COUNT, LEFT_EYE_RANGE, RIGHT_EYE_RANGE};
use crate::detection::geometry::{EyeContour, GeometryError, Point};

#[derive(Debug, Error)]
pub enum LandmarkError {
    #[error("expected {FACE_LANDMARK_COUNT} landmarks, got {0}")]
    IncompleteLayout(usize),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("landmark detector failed: {0}")]
    Detector(String),
}

/// 人脸包围框，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub bounds: FaceBounds,
    pub points: Vec<Point>,
}

impl FaceLandmarks {
    /// 按 68 点布局切出 (左眼, 右眼)
    pub fn eyes(&self) -> Result<(EyeContour, EyeContour), LandmarkError> {
        if self.points.len() < FACE_LANDMARK_COUNT {
            return Err(LandmarkError::IncompleteLayout(self.points.len()));
        }
        let left = EyeContour::try_from(&self.points[LEFT_EYE_RANGE])?;
        let right = EyeContour::try_from(&self.points[RIGHT_EYE_RANGE])?;
        Ok((left, right))
    }
}

/// 外部人脸关键点检测器
pub trait LandmarkSource: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<FaceLandmarks>, LandmarkError>;
}

/// 使用帧自带的预提取关键点（回放数据源）
#[derive(Debug, Default)]
pub struct EmbeddedLandmarks;

impl LandmarkSource for EmbeddedLandmarks {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<FaceLandmarks>, LandmarkError> {
        Ok(frame.landmarks.clone())
    }
}

#[cfg(test)]
pub(crate) fn synthetic_face(eye_vertical: f64) -> FaceLandmarks {
    let mut points = vec![Point::new(0.0, 0.0); FACE_LANDMARK_COUNT];
    for (offset, range) in [(100.0, RIGHT_EYE_RANGE), (200.0, LEFT_EYE_RANGE)] {
        let half = eye_vertical / 2.0;
        let eye = [
            Point::new(offset, 50.0),
            Point::new(offset + 10.0, 50.0 - half),
            Point::new(offset + 20.0, 50.0 - half),
            Point::new(offset + 30.0, 50.0),
            Point::new(offset + 20.0, 50.0 + half),
            Point::new(offset + 10.0, 50.0 + half),
        ];
        points[range].copy_from_slice(&eye);
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
