use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    PullIssued,
    Polling { attempts: u32 },
    Found { attempts: u32 },
    TimedOut { attempts: u32 },
    Error { attempts: u32, message: String },
}

impl PollState {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::PullIssued => 0,
            Self::Polling { attempts }
            | Self::Found { attempts }
            | Self::TimedOut { attempts }
            | Self::Error { attempts, .. } => *attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Found { .. } | Self::TimedOut { .. } | Self::Error { .. }
        )
    }
}

/// Tracks existence checks for a file that `adb pull` is expected to produce.
///
/// The pull itself is issued by the caller before the first check. Each
/// failed check counts as one attempt; reaching `max_attempts` ends in
/// `TimedOut`, and a failing check (I/O error) ends in `Error` immediately.
pub struct PullPoller {
    settings: PollSettings,
    state: PollState,
}

impl PullPoller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings: PollSettings {
                max_attempts: settings.max_attempts.max(1),
                interval: settings.interval,
            },
            state: PollState::PullIssued,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Feeds one existence check. Terminal states ignore further input.
    pub fn record(&mut self, check: io::Result<bool>) -> &PollState {
        if self.state.is_terminal() {
            return &self.state;
        }
        let attempts = self.state.attempts() + 1;
        self.state = match check {
            Ok(true) => PollState::Found { attempts },
            Ok(false) if attempts >= self.settings.max_attempts => {
                PollState::TimedOut { attempts }
            }
            Ok(false) => PollState::Polling { attempts },
            Err(err) => PollState::Error {
                attempts,
                message: err.to_string(),
            },
        };
        &self.state
    }
}

/// Checks `path` until it shows up or the poller gives up. Sleeps only
/// between checks, never after the last one.
pub fn wait_for_file(
    path: &Path,
    settings: PollSettings,
    mut exists: impl FnMut(&Path) -> io::Result<bool>,
    mut sleep: impl FnMut(Duration),
) -> PollState {
    let mut poller = PullPoller::new(settings);
    loop {
        match poller.record(exists(path)) {
            PollState::Polling { attempts } => {
                debug!(
                    path = %path.display(),
                    attempt = *attempts,
                    max_attempts = settings.max_attempts,
                    "pulled file not visible yet"
                );
                sleep(settings.interval);
            }
            terminal => return terminal.clone(),
        }
    }
}

/// Missing is `Ok(false)`; any other metadata failure is an error.
pub fn file_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
