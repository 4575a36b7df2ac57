use crate::engine::{Device, TrainingEngine};
use crate::job::DevicePreference;
use crate::telemetry::Telemetry;
use std::sync::Arc;

/// The device a job holds, released exactly once.
///
/// Release happens explicitly in the cleanup path, or on drop if a job unwinds early.
pub struct AcceleratorContext<E: TrainingEngine> {
    engine: Arc<E>,
    device: Device,
    released: bool,
}

impl<E: TrainingEngine> AcceleratorContext<E> {
    /// Picks a device for `preference`, falling back to CPU when no accelerator is present.
    pub fn acquire(engine: Arc<E>, preference: DevicePreference, telemetry: &dyn Telemetry) -> Self {
        let device = match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Gpu if telemetry.device_count() > 0 => Device::Gpu(0),
            DevicePreference::Gpu => {
                tracing::warn!("GPU requested but no accelerator detected, falling back to CPU");
                Device::Cpu
            }
        };
        tracing::info!(device = %device, "Accelerator acquired");
        Self { engine, device, released: false }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Empties device caches. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.engine.release_device_memory(self.device) {
            Ok(()) => tracing::debug!(device = %self.device, "Device memory released"),
            Err(e) => tracing::warn!(device = %self.device, error = %e, "Failed to release device memory"),
        }
    }
}

impl<E: TrainingEngine> Drop for AcceleratorContext<E> {
    fn drop(&mut self) {
        self.release();
    }
}
