//! 眨眼检测状态机
//!
//! 每帧输入双眼轮廓，计算平均 EAR 后执行阈值 + 冷却状态转换：
//! - EAR < 阈值，且处于睁眼、冷却为 0、连续闭眼帧数满足策略要求：计数一次眨眼并进入冷却
//! - EAR >= 阈值：回到睁眼
//! - 其余情况：状态不变
//!
//! 无论哪个分支，冷却帧数为正时都减 1。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BLINK_COOLDOWN_FRAMES, DEFAULT_EAR_THRESHOLD, DEFAULT_EYE_AR_CONSEC_FRAMES,
};
use crate::detection::geometry::{binocular_aspect_ratio, EyeContour, GeometryError};

/// 计数策略
///
/// `SingleFrame` 保留宽松行为：睁眼且不在冷却期时，任意一帧低于阈值即计数。
/// `Sustained` 要求连续 `frames` 帧低于阈值才计数，过滤单帧噪声。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BlinkPolicy {
    #[default]
    SingleFrame,
    Sustained { frames: u32 },
}

impl BlinkPolicy {
    pub fn required_frames(self) -> u32 {
        match self {
            Self::SingleFrame => 1,
            Self::Sustained { frames } => frames.max(1),
        }
    }

    /// 解析 `single_frame` / `sustained`，未知值返回 None
    pub fn parse(raw: &str, consec_frames: u32) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single_frame" | "single" | "lenient" => Some(Self::SingleFrame),
            "sustained" | "consecutive" => Some(Self::Sustained {
                frames: consec_frames,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkConfig {
    pub ear_threshold: f64,
    pub cooldown_frames: u32,
    pub policy: BlinkPolicy,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            cooldown_frames: DEFAULT_BLINK_COOLDOWN_FRAMES,
            policy: BlinkPolicy::SingleFrame,
        }
    }
}

impl BlinkConfig {
    pub fn sustained() -> Self {
        Self {
            policy: BlinkPolicy::Sustained {
                frames: DEFAULT_EYE_AR_CONSEC_FRAMES,
            },
            ..Self::default()
        }
    }
}

/// 眨眼计数的共享句柄
///
/// 采集循环独占 `BlinkEstimator`，HTTP 层通过该句柄无锁读取与重置计数。
#[derive(Debug, Clone, Default)]
pub struct BlinkCounter(Arc<AtomicU64>);

impl BlinkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// 单次更新结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkUpdate {
    pub ear: f64,
    /// 仅在发生"睁眼 -> 闭眼"计数转换的那一帧为 true
    pub blinked: bool,
    pub eye_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkStateSnapshot {
    pub is_eye_closed: bool,
    pub consecutive_closed_frames: u32,
    pub cooldown_frames_remaining: u32,
    pub blink_count: u64,
}

#[derive(Debug)]
pub struct BlinkEstimator {
    config: BlinkConfig,
    is_eye_closed: bool,
    consecutive_closed_frames: u32,
    cooldown_frames_remaining: u32,
    counter: BlinkCounter,
}

impl BlinkEstimator {
    pub fn new(config: BlinkConfig) -> Self {
        Self::with_counter(config, BlinkCounter::new())
    }

    pub fn with_counter(config: BlinkConfig, counter: BlinkCounter) -> Self {
        Self {
            config,
            is_eye_closed: false,
            consecutive_closed_frames: 0,
            cooldown_frames_remaining: 0,
            counter,
        }
    }

    /// 处理一帧中一张人脸的双眼轮廓
    ///
    /// 任一眼几何退化时返回错误，状态保持不变。
    pub fn update(
        &mut self,
        left: &EyeContour,
        right: &EyeContour,
    ) -> Result<BlinkUpdate, GeometryError> {
        let ear = binocular_aspect_ratio(left, right)?;
        Ok(self.update_ear(ear))
    }

    /// 以已计算好的帧 EAR 推进状态机
    ///
    /// 低于阈值的每一帧都会累加 `consecutive_closed_frames`，包括已闭眼或冷却中
    /// 的帧；`SingleFrame` 策略下该值只出现在快照里，不影响计数。
    pub fn update_ear(&mut self, ear: f64) -> BlinkUpdate {
        let mut blinked = false;

        if ear < self.config.ear_threshold {
            self.consecutive_closed_frames = self.consecutive_closed_frames.saturating_add(1);
            if !self.is_eye_closed
                && self.cooldown_frames_remaining == 0
                && self.consecutive_closed_frames >= self.config.policy.required_frames()
            {
                self.is_eye_closed = true;
                self.counter.increment();
                self.cooldown_frames_remaining = self.config.cooldown_frames;
                blinked = true;
            }
        } else {
            self.is_eye_closed = false;
            self.consecutive_closed_frames = 0;
        }

        if self.cooldown_frames_remaining > 0 {
            self.cooldown_frames_remaining -= 1;
        }

        BlinkUpdate {
            ear,
            blinked,
            eye_closed: self.is_eye_closed,
        }
    }

    /// 仅清零计数，不影响睁闭眼状态与冷却
    pub fn reset(&self) {
        self.counter.reset();
    }

    pub fn blink_count(&self) -> u64 {
        self.counter.get()
    }

    pub fn counter(&self) -> &BlinkCounter {
        &self.counter
    }

    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    pub fn snapshot(&self) -> BlinkStateSnapshot {
        BlinkStateSnapshot {
            is_eye_closed: self.is_eye_closed,
            consecutive_closed_frames: self.consecutive_closed_frames,
            cooldown_frames_remaining: self.cooldown_frames_remaining,
            blink_count: self.counter.get(),
        }
    }
}
