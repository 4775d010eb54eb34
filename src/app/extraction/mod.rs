//! Pull an apk into the temp workspace, wait for it to become visible, then
//! move it to the extraction directory.
//!
//! `adb pull` can return before the destination file is visible to other
//! processes, so completion is detected by polling for the file rather than
//! trusting the pull's exit.

pub mod poller;
pub mod workspace;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::apk::inspect_apk;
use crate::app::adb::runner::CommandOutput;
use crate::app::error::AppError;
use crate::app::models::{ExtractionJob, ExtractionReport};

use self::poller::{wait_for_file, PollSettings, PollState};
use self::workspace::TempWorkspace;

pub fn plan_extraction(
    package_name: &str,
    source_path: &str,
    workspace: &TempWorkspace,
    final_dir: &Path,
) -> ExtractionJob {
    ExtractionJob {
        package_name: package_name.to_string(),
        source_path: source_path.to_string(),
        dest_temp_path: workspace.target_for(package_name).to_string_lossy().to_string(),
        final_dir: final_dir.to_string_lossy().to_string(),
    }
}

/// Runs one extraction. `pull` receives the device path and the local temp
/// target; `exists` and `sleep` drive the poller.
///
/// The workspace is emptied before the pull and again on any failure, so an
/// aborted extraction never leaves files for the next one.
pub fn run_extraction(
    job: &ExtractionJob,
    workspace: &TempWorkspace,
    poll: PollSettings,
    trace_id: &str,
    pull: impl FnOnce(&str, &Path) -> Result<CommandOutput, AppError>,
    exists: impl FnMut(&Path) -> io::Result<bool>,
    sleep: impl FnMut(Duration),
) -> Result<ExtractionReport, AppError> {
    workspace.prepare().map_err(|err| {
        AppError::system(format!("Failed to prepare temp folder: {err}"), trace_id)
    })?;

    let result = pull_and_collect(job, workspace, poll, trace_id, pull, exists, sleep);
    if let Err(err) = &result {
        warn!(
            trace_id = %trace_id,
            package_name = %job.package_name,
            code = %err.code,
            error = %err.error,
            "extraction failed"
        );
        if let Err(clear_err) = workspace.clear() {
            warn!(trace_id = %trace_id, error = %clear_err, "failed to reset temp folder");
        }
    }
    result
}

fn pull_and_collect(
    job: &ExtractionJob,
    workspace: &TempWorkspace,
    poll: PollSettings,
    trace_id: &str,
    pull: impl FnOnce(&str, &Path) -> Result<CommandOutput, AppError>,
    exists: impl FnMut(&Path) -> io::Result<bool>,
    sleep: impl FnMut(Duration),
) -> Result<ExtractionReport, AppError> {
    let temp_path = PathBuf::from(&job.dest_temp_path);
    info!(
        trace_id = %trace_id,
        package_name = %job.package_name,
        source = %job.source_path,
        "pulling apk"
    );
    pull(&job.source_path, &temp_path)?.into_success(trace_id)?;

    let attempts = match wait_for_file(&temp_path, poll, exists, sleep) {
        PollState::Found { attempts } => attempts,
        PollState::TimedOut { attempts } => {
            return Err(AppError::poll_timeout(
                format!(
                    "Extracting {} timed out after {attempts} checks",
                    job.package_name
                ),
                trace_id,
            ));
        }
        PollState::Error { message, .. } => {
            return Err(AppError::system(
                format!("Failed to check for pulled apk: {message}"),
                trace_id,
            ));
        }
        state @ (PollState::PullIssued | PollState::Polling { .. }) => {
            return Err(AppError::system(
                format!("Poller stopped in non-terminal state {state:?}"),
                trace_id,
            ));
        }
    };

    let final_dir = Path::new(&job.final_dir);
    let outcome = workspace.finalize(final_dir);
    if outcome.error_occurred {
        return Err(AppError::system("Failed to move extracted apk", trace_id));
    }
    if !outcome.success {
        return Err(AppError::not_found(
            "Extracted apk not found in temp folder",
            trace_id,
        ));
    }

    let final_paths: Vec<String> = outcome
        .filenames
        .iter()
        .map(|name| final_dir.join(name).to_string_lossy().to_string())
        .collect();
    let expected_name = temp_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let apk = final_paths
        .iter()
        .find(|path| path.ends_with(&expected_name))
        .or_else(|| final_paths.first())
        .map(|path| inspect_apk(Path::new(path)));
    if let Some(error) = apk.as_ref().and_then(|info| info.error.as_deref()) {
        warn!(
            trace_id = %trace_id,
            package_name = %job.package_name,
            error = %error,
            "extracted apk looks wrong"
        );
    }

    info!(
        trace_id = %trace_id,
        package_name = %job.package_name,
        attempts,
        files = ?outcome.filenames,
        "apk extracted"
    );
    Ok(ExtractionReport {
        package_name: job.package_name.clone(),
        source_path: job.source_path.clone(),
        final_paths,
        attempts,
        apk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    use crate::app::extraction::poller::file_exists;

    fn ok_output() -> CommandOutput {
        CommandOutput {
            stdout: "/data/app/com.foo/base.apk: 1 file pulled.\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn fast(max_attempts: u32) -> PollSettings {
        PollSettings {
            max_attempts,
            interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn pulls_polls_and_moves() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        let final_dir = root.path().join("apks");
        let job = plan_extraction("com.foo", "/data/app/com.foo/base.apk", &workspace, &final_dir);

        let report = run_extraction(
            &job,
            &workspace,
            fast(10),
            "t-extract",
            |source, target| {
                assert_eq!(source, "/data/app/com.foo/base.apk");
                fs::write(target, b"not really an apk").unwrap();
                Ok(ok_output())
            },
            file_exists,
            |_| {},
        )
        .expect("extraction");

        assert_eq!(report.attempts, 1);
        assert_eq!(report.final_paths.len(), 1);
        assert!(final_dir.join("com.foo.apk").is_file());
        assert!(!report.apk.unwrap().is_valid_archive);
        assert_eq!(fs::read_dir(workspace.dir()).unwrap().count(), 0);
    }

    #[test]
    fn removes_stale_files_before_pull() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        workspace.prepare().unwrap();
        fs::write(workspace.dir().join("leftover.apk"), b"old").unwrap();
        let final_dir = root.path().join("apks");
        let job = plan_extraction("com.foo", "/data/app/com.foo/base.apk", &workspace, &final_dir);

        let report = run_extraction(
            &job,
            &workspace,
            fast(3),
            "t-stale",
            |_, target| {
                fs::write(target, b"apk").unwrap();
                Ok(ok_output())
            },
            file_exists,
            |_| {},
        )
        .unwrap();
        assert_eq!(report.final_paths.len(), 1);
        assert!(!final_dir.join("leftover.apk").exists());
    }

    #[test]
    fn timeout_resets_workspace() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        let final_dir = root.path().join("apks");
        let job = plan_extraction("com.foo", "/data/app/com.foo/base.apk", &workspace, &final_dir);
        let checks = Cell::new(0u32);

        let err = run_extraction(
            &job,
            &workspace,
            fast(3),
            "t-timeout",
            |_, target| {
                // partial download under a different name
                fs::write(target.with_extension("part"), b"x").unwrap();
                Ok(ok_output())
            },
            |_| {
                checks.set(checks.get() + 1);
                Ok(false)
            },
            |_| {},
        )
        .unwrap_err();

        assert_eq!(err.code, "ERR_POLL_TIMEOUT");
        assert_eq!(checks.get(), 3);
        assert_eq!(fs::read_dir(workspace.dir()).unwrap().count(), 0);
        assert!(!final_dir.exists());
    }

    #[test]
    fn failed_pull_is_a_command_error() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        let job = plan_extraction("com.foo", "/data/app/x/base.apk", &workspace, root.path());
        let polled = Cell::new(false);

        let err = run_extraction(
            &job,
            &workspace,
            fast(3),
            "t-pull",
            |_, _| {
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "adb: error: remote object does not exist".to_string(),
                    exit_code: Some(1),
                })
            },
            |_| {
                polled.set(true);
                Ok(true)
            },
            |_| {},
        )
        .unwrap_err();

        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.contains("does not exist"));
        assert!(!polled.get());
    }

    #[test]
    fn check_error_propagates_immediately() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        let job = plan_extraction("com.foo", "/data/app/x/base.apk", &workspace, root.path());

        let err = run_extraction(
            &job,
            &workspace,
            fast(10),
            "t-io",
            |_, _| Ok(ok_output()),
            |_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            |_| panic!("must not sleep after an I/O error"),
        )
        .unwrap_err();
        assert_eq!(err.code, "ERR_SYSTEM");
    }

    #[test]
    fn found_but_vanished_is_not_success() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        let out = root.path().join("out");
        let job = plan_extraction("com.foo", "/data/app/x/base.apk", &workspace, &out);

        let err = run_extraction(
            &job,
            &workspace,
            fast(3),
            "t-vanish",
            |_, _| Ok(ok_output()),
            |_| Ok(true),
            |_| {},
        )
        .unwrap_err();
        assert_eq!(err.code, "ERR_NOT_FOUND");
    }
}
