use crate::telemetry::Telemetry;
use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Fixed runtime overhead added to the RAM projection, in MB.
const RUNTIME_OVERHEAD_MB: f64 = 50.0;

pub const INSUFFICIENT_MEMORY_WARNING: &str = "Insufficient memory detected, training may fail!";

/// Projected memory needs against live availability. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEstimate {
    pub projected_ram_mb: f64,
    pub projected_vram_mb: f64,
    /// `None` when host memory could not be read.
    pub available_ram_mb: Option<f64>,
    /// `None` when there is no accelerator or it could not be queried.
    pub available_vram_mb: Option<f64>,
    pub is_sufficient: bool,
}

impl ResourceEstimate {
    #[must_use]
    pub fn warning(&self) -> Option<&'static str> {
        (!self.is_sufficient).then_some(INSUFFICIENT_MEMORY_WARNING)
    }
}

/// Estimate memory needs for training `model_path` on `dataset_path`.
pub fn estimate(dataset_path: &Path, model_path: &Path, telemetry: &dyn Telemetry) -> ResourceEstimate {
    let model_mb = disk_usage(model_path) as f64 / BYTES_PER_MB;
    let dataset_mb = disk_usage(dataset_path) as f64 / BYTES_PER_MB;

    let available_ram_mb = match telemetry.available_system_memory_mb() {
        Ok(mb) => Some(mb),
        Err(e) => {
            tracing::debug!(error = %e, "System memory unavailable for estimate");
            None
        }
    };
    let available_vram_mb = if telemetry.device_count() > 0 {
        telemetry
            .available_device_memory_mb(0)
            .map_err(|e| tracing::debug!(error = %e, "Device memory unavailable for estimate"))
            .ok()
    } else {
        None
    };

    let estimate = project(model_mb, dataset_mb, available_ram_mb, available_vram_mb);
    tracing::info!(
        model_mb,
        dataset_mb,
        projected_ram_mb = estimate.projected_ram_mb,
        projected_vram_mb = estimate.projected_vram_mb,
        "Resource estimate"
    );
    if let Some(warning) = estimate.warning() {
        tracing::warn!(
            available_ram_mb = ?estimate.available_ram_mb,
            available_vram_mb = ?estimate.available_vram_mb,
            "{warning}"
        );
    }
    estimate
}

pub(crate) fn project(
    model_mb: f64,
    dataset_mb: f64,
    available_ram_mb: Option<f64>,
    available_vram_mb: Option<f64>,
) -> ResourceEstimate {
    let projected_ram_mb = (model_mb + dataset_mb + RUNTIME_OVERHEAD_MB) * 0.5;
    let projected_vram_mb = model_mb * 0.1;
    let fits = |projected: f64, available: Option<f64>| available.is_none_or(|a| projected <= a);

    ResourceEstimate {
        projected_ram_mb,
        projected_vram_mb,
        available_ram_mb,
        available_vram_mb,
        is_sufficient: fits(projected_ram_mb, available_ram_mb) && fits(projected_vram_mb, available_vram_mb),
    }
}

/// Total bytes of all files under `path`; a missing path counts as zero.
pub fn disk_usage(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let size = entry.and_then(|e| {
            if e.file_type().is_file() { e.metadata().map(|m| m.len()) } else { Ok(0) }
        });
        match size {
            Ok(len) => total += len,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Size walk failed, counting as zero");
                return 0;
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryUnavailable;
    use tempfile::TempDir;

    struct FixedTelemetry {
        ram: Option<f64>,
        vram: Option<f64>,
    }

    impl Telemetry for FixedTelemetry {
        fn available_system_memory_mb(&self) -> Result<f64, TelemetryUnavailable> {
            self.ram.ok_or_else(|| TelemetryUnavailable("no ram".into()))
        }

        fn device_count(&self) -> usize {
            usize::from(self.vram.is_some())
        }

        fn available_device_memory_mb(&self, _device_index: usize) -> Result<f64, TelemetryUnavailable> {
            self.vram.ok_or_else(|| TelemetryUnavailable("no device".into()))
        }
    }

    #[test]
    fn test_projection_for_1000_mb_model() {
        let estimate = project(1000.0, 0.0, Some(4096.0), Some(8192.0));
        assert!((estimate.projected_ram_mb - 525.0).abs() < 1e-9);
        assert!((estimate.projected_vram_mb - 100.0).abs() < 1e-9);
        assert!(estimate.is_sufficient);
        assert_eq!(estimate.warning(), None);
    }

    #[test]
    fn test_unavailable_dimension_does_not_participate() {
        let estimate = project(1000.0, 0.0, Some(4096.0), None);
        assert!(estimate.is_sufficient);

        let estimate = project(1000.0, 0.0, Some(100.0), None);
        assert!(!estimate.is_sufficient);
        assert_eq!(estimate.warning(), Some(INSUFFICIENT_MEMORY_WARNING));
    }

    #[test]
    fn test_estimate_reads_sizes_from_disk() {
        let temp = TempDir::new().unwrap();
        let model_dir = temp.path().join("model");
        std::fs::create_dir(&model_dir).unwrap();
        let weights = std::fs::File::create(model_dir.join("weights.bin")).unwrap();
        weights.set_len(1000 * 1024 * 1024).unwrap();

        let telemetry = FixedTelemetry { ram: Some(400.0), vram: Some(50.0) };
        let estimate = estimate(&temp.path().join("missing.jsonl"), &model_dir, &telemetry);

        assert!((estimate.projected_ram_mb - 525.0).abs() < 1e-9);
        assert!((estimate.projected_vram_mb - 100.0).abs() < 1e-9);
        assert!(!estimate.is_sufficient);
    }

    #[test]
    fn test_disk_usage_sums_nested_files() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
        std::fs::write(temp.path().join("a/one"), [0u8; 10]).unwrap();
        std::fs::write(temp.path().join("a/b/two"), [0u8; 5]).unwrap();

        assert_eq!(disk_usage(temp.path()), 15);
        assert_eq!(disk_usage(&temp.path().join("a/one")), 10);
        assert_eq!(disk_usage(&temp.path().join("nope")), 0);
    }
}
