use sysinfo::{Pid, System};

use crate::telemetry::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessUsage {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub memory_percent: f64,
}

/// Source of process resource usage.
pub trait ProcessProbe: Send {
    fn sample(&mut self) -> Result<ProcessUsage, TelemetryError>;
}

/// Samples the current process through `sysinfo`.
///
/// CPU usage is measured between two refreshes, so the first sample after
/// construction reports 0%.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn current() -> Result<Self, TelemetryError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| TelemetryError::ProcessUnavailable(e.to_string()))?;
        let mut system = System::new();
        system.refresh_process(pid);
        Ok(Self { system, pid })
    }
}

impl ProcessProbe for SysinfoProbe {
    fn sample(&mut self) -> Result<ProcessUsage, TelemetryError> {
        if !self.system.refresh_process(self.pid) {
            return Err(TelemetryError::ProcessUnavailable(format!(
                "process {} is gone or not accessible",
                self.pid
            )));
        }
        self.system.refresh_memory();

        let process = self.system.process(self.pid).ok_or_else(|| {
            TelemetryError::ProcessUnavailable(format!("process {} not found", self.pid))
        })?;
        let memory_bytes = process.memory();
        let total = self.system.total_memory();
        let memory_percent = if total > 0 {
            memory_bytes as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(ProcessUsage {
            cpu_percent: process.cpu_usage(),
            memory_bytes,
            memory_percent,
        })
    }
}
