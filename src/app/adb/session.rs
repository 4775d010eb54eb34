use std::time::Duration;

use tracing::info;

use crate::app::adb::runner::{run_command_with_timeout, CommandOutput, DEFAULT_COMMAND_TIMEOUT};
use crate::app::error::AppError;

/// Which adb binary to run and which device to target.
///
/// Passed explicitly to every call; there is no process-wide "selected device".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbSession {
    pub program: String,
    pub serial: Option<String>,
    pub timeout: Duration,
}

impl AdbSession {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        self.serial = Some(serial).filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Key used for per-device bookkeeping such as busy flags.
    pub fn device_key(&self) -> &str {
        self.serial.as_deref().unwrap_or("default")
    }

    /// Full argument vector, prefixed with `-s <serial>` when a device is bound.
    pub fn args<S: AsRef<str>>(&self, tail: &[S]) -> Vec<String> {
        let mut args = Vec::with_capacity(tail.len() + 2);
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(tail.iter().map(|value| value.as_ref().to_string()));
        args
    }

    /// Runs one adb invocation and returns its raw output, whatever the exit code.
    pub fn execute<S: AsRef<str>>(
        &self,
        tail: &[S],
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        let args = self.args(tail);
        info!(trace_id = %trace_id, serial = ?self.serial, args = ?args, "adb");
        run_command_with_timeout(&self.program, &args, self.timeout, trace_id)
    }

    /// Like [`execute`](Self::execute) but fails on a non-zero exit; returns stdout.
    pub fn run<S: AsRef<str>>(&self, tail: &[S], trace_id: &str) -> Result<String, AppError> {
        Ok(self.execute(tail, trace_id)?.into_success(trace_id)?.stdout)
    }

    /// Host-level commands (`devices`, `version`, `kill-server`) never take `-s`.
    pub fn host(&self) -> Self {
        Self {
            program: self.program.clone(),
            serial: None,
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_serial_when_bound() {
        let session = AdbSession::new("adb").with_serial("emulator-5554");
        assert_eq!(
            session.args(&["shell", "pm", "list", "packages", "-d"]),
            vec!["-s", "emulator-5554", "shell", "pm", "list", "packages", "-d"]
        );
        assert_eq!(session.device_key(), "emulator-5554");
    }

    #[test]
    fn no_prefix_without_serial() {
        let session = AdbSession::new("adb").with_serial("  ");
        assert_eq!(session.serial, None);
        assert_eq!(session.args(&["devices"]), vec!["devices"]);
        assert_eq!(session.device_key(), "default");
    }

    #[test]
    fn host_session_drops_serial() {
        let session = AdbSession::new("adb")
            .with_serial("ABC")
            .with_timeout(Duration::from_secs(3));
        let host = session.host();
        assert_eq!(host.serial, None);
        assert_eq!(host.timeout, Duration::from_secs(3));
    }

    #[test]
    fn package_names_stay_single_arguments() {
        let session = AdbSession::new("adb");
        let args = session.args(&["shell", "pm", "enable", "--user", "0", "com.foo; reboot"]);
        assert_eq!(args.last().map(String::as_str), Some("com.foo; reboot"));
        assert_eq!(args.len(), 6);
    }
}
