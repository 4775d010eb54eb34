use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::app::adb::paths::apk_file_name;
use crate::app::models::MoveOutcome;

/// The single scratch directory pulls land in before being moved out.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    dir: PathBuf,
}

impl TempWorkspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target_for(&self, package_name: &str) -> PathBuf {
        self.dir.join(apk_file_name(package_name))
    }

    /// Creates the directory if needed and empties it.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.clear()
    }

    pub fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Moves every file in the workspace into `dest`, returning the names moved.
    pub fn move_all_to(&self, dest: &Path) -> io::Result<Vec<String>> {
        fs::create_dir_all(dest)?;
        let mut moved = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let target = dest.join(&name);
            move_file(&entry.path(), &target)?;
            moved.push(name.to_string_lossy().to_string());
        }
        moved.sort();
        Ok(moved)
    }

    /// Hands the pulled files to `dest`. An empty workspace is reported as
    /// nothing moved, never as success.
    pub fn finalize(&self, dest: &Path) -> MoveOutcome {
        match self.move_all_to(dest) {
            Ok(filenames) => {
                info!(dest = %dest.display(), files = ?filenames, "moved extracted files");
                MoveOutcome::moved(filenames)
            }
            Err(err) => {
                warn!(dest = %dest.display(), error = %err, "failed to move extracted files");
                MoveOutcome::failed()
            }
        }
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // rename cannot cross filesystems
        Err(_) if from.is_file() => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepare_clears_stale_files() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        workspace.prepare().unwrap();
        fs::write(workspace.dir().join("stale.apk"), b"old").unwrap();
        fs::create_dir_all(workspace.dir().join("nested")).unwrap();

        workspace.prepare().unwrap();
        assert_eq!(fs::read_dir(workspace.dir()).unwrap().count(), 0);
    }

    #[test]
    fn clear_tolerates_missing_dir() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("never-created"));
        workspace.clear().unwrap();
    }

    #[test]
    fn finalize_moves_files() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        workspace.prepare().unwrap();
        fs::write(workspace.target_for("com.foo"), b"apk").unwrap();

        let dest = root.path().join("out");
        let outcome = workspace.finalize(&dest);
        assert!(outcome.success);
        assert_eq!(outcome.filenames, vec!["com.foo.apk".to_string()]);
        assert!(dest.join("com.foo.apk").is_file());
        assert_eq!(fs::read_dir(workspace.dir()).unwrap().count(), 0);
    }

    #[test]
    fn finalize_on_empty_workspace_is_not_success() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("temp"));
        workspace.prepare().unwrap();

        let outcome = workspace.finalize(&root.path().join("out"));
        assert!(!outcome.success);
        assert!(!outcome.error_occurred);
        assert!(outcome.filenames.is_empty());
    }

    #[test]
    fn finalize_reports_error_when_workspace_is_gone() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::new(root.path().join("missing"));
        let outcome = workspace.finalize(&root.path().join("out"));
        assert!(outcome.error_occurred);
        assert!(!outcome.success);
    }
}
