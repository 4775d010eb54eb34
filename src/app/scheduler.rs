use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::app::error::AppError;

/// One busy flag per device. Mutating operations (uninstall, enable/disable,
/// extraction) take the flag for their whole duration; a second operation on
/// the same device is rejected instead of interleaving `pm` calls.
#[derive(Default)]
pub struct DeviceLocks {
    busy: Arc<Mutex<HashSet<String>>>,
}

pub struct DeviceGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: &str, trace_id: &str) -> Result<DeviceGuard, AppError> {
        let mut guard = self
            .busy
            .lock()
            .map_err(|_| AppError::system("Device lock registry poisoned", trace_id))?;
        if !guard.insert(key.to_string()) {
            return Err(AppError::busy(
                format!("Device {key} is busy with another operation"),
                trace_id,
            ));
        }
        Ok(DeviceGuard {
            busy: Arc::clone(&self.busy),
            key: key.to_string(),
        })
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.busy
            .lock()
            .map(|guard| guard.contains(key))
            .unwrap_or(false)
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.busy.lock() {
            guard.remove(&self.key);
        }
    }
}
