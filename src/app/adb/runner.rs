use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

const POLL_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout, then stderr on its own line when present.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        text
    }

    /// Turns a non-zero exit into a command error carrying stderr.
    pub fn into_success(self, trace_id: &str) -> Result<Self, AppError> {
        if self.success() {
            Ok(self)
        } else {
            Err(AppError::command(self.exit_code, &self.stderr, trace_id))
        }
    }
}

/// Spawns `program` with an argument vector. No shell is involved.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "spawn");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn {program}: {err}"), trace_id))?;

    // Both pipes are drained on their own threads so a chatty child never
    // blocks on a full pipe buffer while we wait on it.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain_pipe(stdout);
    let stderr_handle = drain_pipe(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::timeout(
                        format!("Command timed out after {}s", timeout.as_secs_f32()),
                        trace_id,
                    ));
                }
                std::thread::sleep(POLL_STEP);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();
    debug!(trace_id = %trace_id, exit_code = ?exit_code, "command finished");

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

fn drain_pipe<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            ("cmd.exe".to_string(), vec!["/C".to_string(), script.to_string()])
        } else {
            ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
        }
    }

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        let (program, args) = if cfg!(windows) {
            sh("for /L %i in (1,1,100000) do @echo 1234567890")
        } else {
            sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done")
        };

        let output = run_command_with_timeout(&program, &args, Duration::from_secs(10), "t-large")
            .expect("expected large-output command to complete without timing out");

        assert!(output.success());
        assert!(output.stdout.len() >= 1_000_000, "got {}", output.stdout.len());
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_timeout() {
        let (program, args) = sh("sleep 5");
        let started = Instant::now();
        let err = run_command_with_timeout(&program, &args, Duration::from_millis(200), "t-hang")
            .expect_err("expected timeout");
        assert_eq!(err.code, "ERR_TIMEOUT");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn spawn_failure_is_a_system_error() {
        let err = run_command_with_timeout(
            "/this/program/does/not/exist/adb",
            &[],
            Duration::from_secs(1),
            "t-spawn",
        )
        .expect_err("expected spawn failure");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert_eq!(err.trace_id, "t-spawn");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_becomes_command_error() {
        let (program, args) = sh("echo boom >&2; exit 3");
        let output =
            run_command_with_timeout(&program, &args, Duration::from_secs(5), "t-exit").unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.combined(), "boom");
        let err = output.into_success("t-exit").unwrap_err();
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert_eq!(err.error, "boom");
        assert_eq!(err.exit_code, Some(3));
    }
}
