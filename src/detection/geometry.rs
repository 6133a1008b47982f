//! 眼部几何与 EAR (Eye Aspect Ratio) 计算
//!
//! 标准 6 点公式: EAR = (|p1-p5| + |p2-p4|) / (2 * |p0-p3|)
//! - p0, p3: 眼角点（水平方向）
//! - p1, p2: 上眼睑点
//! - p4, p5: 下眼睑点

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 水平跨度小于该值时视为退化几何
const MIN_HORIZONTAL_SPAN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("eye contour must have exactly 6 points, got {0}")]
    WrongPointCount(usize),
    #[error("degenerate eye contour: horizontal span is {span}")]
    DegenerateSpan { span: f64 },
}

/// 单眼轮廓，固定 6 点
///
/// 索引约定: (眼角, 上眼睑, 上眼睑, 眼角, 下眼睑, 下眼睑)，
/// (1,5) 与 (2,4) 为垂直配对，(0,3) 为水平跨度。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeContour([Point; 6]);

impl EyeContour {
    pub const fn new(points: [Point; 6]) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[Point; 6] {
        &self.0
    }

    pub fn horizontal_span(&self) -> f64 {
        self.0[0].distance(&self.0[3])
    }

    /// 计算 EAR；水平跨度为 0 时返回错误而不是除零
    pub fn aspect_ratio(&self) -> Result<f64, GeometryError> {
        let p = &self.0;
        let horizontal = self.horizontal_span();
        if !horizontal.is_finite() || horizontal < MIN_HORIZONTAL_SPAN {
            return Err(GeometryError::DegenerateSpan { span: horizontal });
        }

        let vertical1 = p[1].distance(&p[5]);
        let vertical2 = p[2].distance(&p[4]);
        Ok((vertical1 + vertical2) / (2.0 * horizontal))
    }
}

impl TryFrom<&[Point]> for EyeContour {
    type Error = GeometryError;

    fn try_from(points: &[Point]) -> Result<Self, Self::Error> {
        let arr: [Point; 6] = points
            .try_into()
            .map_err(|_| GeometryError::WrongPointCount(points.len()))?;
        Ok(Self(arr))
    }
}

/// 双眼 EAR 取平均
pub fn binocular_aspect_ratio(left: &EyeContour, right: &EyeContour) -> Result<f64, GeometryError> {
    let left_ear = left.aspect_ratio()?;
    let right_ear = right.aspect_ratio()?;
    Ok((left_ear + right_ear) / 2.0)
}

#[cfg(test)]
pub(crate) fn rectangular_eye(vertical: f64, horizontal: f64) -> EyeContour {
    let half = vertical / 2.0;
    EyeContour::new([
        Point::new(0.0, 0.0),
        Point::new(horizontal / 3.0, -half),
        Point::new(2.0 * horizontal / 3.0, -half),
        Point::new(horizontal, 0.0),
        Point::new(2.0 * horizontal / 3.0, half),
        Point::new(horizontal / 3.0, half),
    ])
}
