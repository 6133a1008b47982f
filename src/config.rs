use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_BLINK_COOLDOWN_FRAMES, DEFAULT_EAR_THRESHOLD, DEFAULT_EYE_AR_CONSEC_FRAMES,
    DEFAULT_SNAPSHOT_EVERY_FRAMES, DEFAULT_TARGET_FPS, DEFAULT_TELEMETRY_HISTORY_CAPACITY,
    DEFAULT_TELEMETRY_INTERVAL_MS,
};
use crate::detection::blink::{BlinkConfig, BlinkPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub capture: CaptureConfig,
    pub blink: BlinkConfig,
    pub telemetry: TelemetryConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// JSON Lines landmark feed replayed as the frame source
    pub feed_path: String,
    pub target_fps: u32,
    pub snapshot_every_frames: u64,
    pub stop_timeout_secs: u64,
    pub event_buffer: usize,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_path: String,
    pub interval_ms: u64,
    pub history_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            feed_path: "./data/landmarks.jsonl".to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            snapshot_every_frames: DEFAULT_SNAPSHOT_EVERY_FRAMES,
            stop_timeout_secs: 5,
            event_buffer: 64,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: "./performance_log.txt".to_string(),
            interval_ms: DEFAULT_TELEMETRY_INTERVAL_MS,
            history_capacity: DEFAULT_TELEMETRY_HISTORY_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let consec_frames = env_or_parse("BLINK_CONSEC_FRAMES", DEFAULT_EYE_AR_CONSEC_FRAMES);
        let policy_raw = env_or("BLINK_POLICY", "single_frame");
        let policy = BlinkPolicy::parse(&policy_raw, consec_frames).unwrap_or_else(|| {
            tracing::warn!(value = %policy_raw, "Unknown BLINK_POLICY, using single_frame");
            BlinkPolicy::SingleFrame
        });

        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 5000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/face_data.sled"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            capture: CaptureConfig {
                feed_path: env_or("CAPTURE_FEED_PATH", "./data/landmarks.jsonl"),
                target_fps: env_or_parse("CAPTURE_TARGET_FPS", DEFAULT_TARGET_FPS).max(1),
                snapshot_every_frames: env_or_parse(
                    "SNAPSHOT_EVERY_FRAMES",
                    DEFAULT_SNAPSHOT_EVERY_FRAMES,
                )
                .max(1),
                stop_timeout_secs: env_or_parse("CAPTURE_STOP_TIMEOUT_SECS", 5_u64).max(1),
                event_buffer: env_or_parse("FRAME_EVENT_BUFFER", 64_usize).max(1),
            },
            blink: BlinkConfig {
                ear_threshold: env_or_parse("BLINK_EAR_THRESHOLD", DEFAULT_EAR_THRESHOLD),
                cooldown_frames: env_or_parse(
                    "BLINK_COOLDOWN_FRAMES",
                    DEFAULT_BLINK_COOLDOWN_FRAMES,
                ),
                policy,
            },
            telemetry: TelemetryConfig {
                log_path: env_or("TELEMETRY_LOG_PATH", "./performance_log.txt"),
                interval_ms: env_or_parse("TELEMETRY_INTERVAL_MS", DEFAULT_TELEMETRY_INTERVAL_MS)
                    .max(1),
                history_capacity: env_or_parse(
                    "TELEMETRY_HISTORY_CAPACITY",
                    DEFAULT_TELEMETRY_HISTORY_CAPACITY,
                )
                .max(1),
            },
            worker: WorkerConfig {
                enabled: env_or_bool("WORKER_ENABLED", true),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "BLINK_POLICY",
            "BLINK_CONSEC_FRAMES",
            "BLINK_EAR_THRESHOLD",
            "CAPTURE_TARGET_FPS",
            "SNAPSHOT_EVERY_FRAMES",
            "CAPTURE_STOP_TIMEOUT_SECS",
            "WORKER_ENABLED",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.blink.ear_threshold, 0.25);
        assert_eq!(cfg.blink.cooldown_frames, 10);
        assert_eq!(cfg.blink.policy, BlinkPolicy::SingleFrame);
        assert_eq!(cfg.capture.snapshot_every_frames, 30);
        assert!(cfg.worker.enabled);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("BLINK_EAR_THRESHOLD", "0.2");
        env::set_var("CAPTURE_TARGET_FPS", "15");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.blink.ear_threshold, 0.2);
        assert_eq!(cfg.capture.target_fps, 15);
        clear_keys(managed_keys());
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("BLINK_POLICY", "whatever");
        env::set_var("SNAPSHOT_EVERY_FRAMES", "0");
        env::set_var("CAPTURE_STOP_TIMEOUT_SECS", "0");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.blink.policy, BlinkPolicy::SingleFrame);
        assert_eq!(cfg.capture.snapshot_every_frames, 1);
        assert_eq!(cfg.capture.stop_timeout_secs, 1);
        clear_keys(managed_keys());
    }

    #[test]
    fn sustained_policy_takes_consec_frames() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("BLINK_POLICY", "sustained");
        env::set_var("BLINK_CONSEC_FRAMES", "5");
        env::set_var("WORKER_ENABLED", "off");

        let cfg = Config::from_env();
        assert_eq!(cfg.blink.policy, BlinkPolicy::Sustained { frames: 5 });
        assert!(!cfg.worker.enabled);
        clear_keys(managed_keys());
    }
}
