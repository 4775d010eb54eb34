use std::sync::Mutex;

use crate::app::console::ConsoleLog;
use crate::app::scheduler::DeviceLocks;

pub struct AppState {
    pub locks: DeviceLocks,
    pub console: Mutex<ConsoleLog>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            locks: DeviceLocks::new(),
            console: Mutex::new(ConsoleLog::default()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
