/// EAR 阈值，低于此值视为闭眼
pub const DEFAULT_EAR_THRESHOLD: f64 = 0.25;

/// 计数一次眨眼后的冷却帧数，防止同一次眨眼被重复计数
pub const DEFAULT_BLINK_COOLDOWN_FRAMES: u32 = 10;

/// `sustained` 策略下判定眨眼所需的连续闭眼帧数
pub const DEFAULT_EYE_AR_CONSEC_FRAMES: u32 = 3;

/// 68 点人脸关键点总数
pub const FACE_LANDMARK_COUNT: usize = 68;

/// 68 点布局中右眼的索引范围
pub const RIGHT_EYE_RANGE: std::ops::Range<usize> = 36..42;

/// 68 点布局中左眼的索引范围
pub const LEFT_EYE_RANGE: std::ops::Range<usize> = 42..48;

/// 采集目标帧率
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// 每处理多少帧持久化一次眨眼快照
pub const DEFAULT_SNAPSHOT_EVERY_FRAMES: u64 = 30;

/// FPS 滑动平均窗口（帧间隔数）
pub const FPS_WINDOW: usize = 30;

/// `/metrics` 返回的最近快照条数
pub const RECENT_METRICS_LIMIT: usize = 10;

/// 性能采样周期（毫秒）
pub const DEFAULT_TELEMETRY_INTERVAL_MS: u64 = 1_000;

/// 性能采样环形缓冲区容量，1s 周期下约一小时
pub const DEFAULT_TELEMETRY_HISTORY_CAPACITY: usize = 3_600;

/// 性能日志表头
pub const TELEMETRY_LOG_HEADER: &str = "Time,CPU_Usage,Memory_Usage_MB,Memory_Usage_Percent,Latency";

/// 快照时间戳格式（本地时间）
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
