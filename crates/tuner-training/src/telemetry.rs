//! Host and accelerator memory telemetry.

use crate::error::TelemetryUnavailable;
use std::process::Command;

/// Live memory figures consulted by the resource estimator and the cleanup path.
pub trait Telemetry: Send + Sync {
    fn available_system_memory_mb(&self) -> Result<f64, TelemetryUnavailable>;

    fn device_count(&self) -> usize;

    fn available_device_memory_mb(&self, device_index: usize) -> Result<f64, TelemetryUnavailable>;
}

/// Reads `/proc/meminfo` and queries `nvidia-smi`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTelemetry;

impl HostTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn nvidia_smi(args: &[&str]) -> Result<String, TelemetryUnavailable> {
        let output = Command::new("nvidia-smi")
            .args(args)
            .output()
            .map_err(|e| TelemetryUnavailable(format!("nvidia-smi: {e}")))?;
        if !output.status.success() {
            return Err(TelemetryUnavailable(format!("nvidia-smi exited with {}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Telemetry for HostTelemetry {
    fn available_system_memory_mb(&self) -> Result<f64, TelemetryUnavailable> {
        let meminfo = std::fs::read_to_string("/proc/meminfo")
            .map_err(|e| TelemetryUnavailable(format!("/proc/meminfo: {e}")))?;
        parse_mem_available_mb(&meminfo)
            .ok_or_else(|| TelemetryUnavailable("MemAvailable missing from /proc/meminfo".to_string()))
    }

    fn device_count(&self) -> usize {
        Self::nvidia_smi(&["--query-gpu=index", "--format=csv,noheader"])
            .map(|out| out.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    fn available_device_memory_mb(&self, device_index: usize) -> Result<f64, TelemetryUnavailable> {
        let out = Self::nvidia_smi(&[
            "--query-gpu=memory.free",
            "--format=csv,noheader,nounits",
            &format!("--id={device_index}"),
        ])?;
        parse_free_memory_mb(&out)
            .ok_or_else(|| TelemetryUnavailable(format!("unexpected nvidia-smi output: {}", out.trim())))
    }
}

/// `MemAvailable` from a `/proc/meminfo` dump, in MiB.
pub(crate) fn parse_mem_available_mb(meminfo: &str) -> Option<f64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// First value of a `memory.free` query, already in MiB.
pub(crate) fn parse_free_memory_mb(output: &str) -> Option<f64> {
    output.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem_available() {
        let meminfo = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(parse_mem_available_mb(meminfo), Some(8000.0));
        assert_eq!(parse_mem_available_mb("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn test_parse_free_memory() {
        assert_eq!(parse_free_memory_mb("11019\n"), Some(11019.0));
        assert_eq!(parse_free_memory_mb("\n"), None);
        assert_eq!(parse_free_memory_mb("[N/A]\n"), None);
    }
}
