use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir, TempPath};

use crate::constants::{SCRIPT_NAME, SCRIPT_SUFFIX, TEMP_DIR_PREFIX, TEMP_FILE_PREFIX};
use crate::runner::errors::ExecutionError;

/// Transient on-disk copy of submitted code.
///
/// The backing file or directory is deleted exactly once: by [`Workspace::remove`]
/// or, on any early return, when the value is dropped.
#[derive(Debug)]
pub enum Workspace {
    File(TempPath),
    Directory { dir: TempDir, script: PathBuf },
}

impl Workspace {
    /// Writes `code` to a uniquely named file under `root`.
    pub fn file(root: &Path, code: &str) -> Result<Self, ExecutionError> {
        let mut file = Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(SCRIPT_SUFFIX)
            .tempfile_in(root)
            .map_err(ExecutionError::io("create temp file"))?;

        store(file.as_file_mut(), code)?;

        // Closes the handle, keeps the deletion obligation.
        Ok(Self::File(file.into_temp_path()))
    }

    /// Writes `code` into a fresh private directory under `root`.
    pub fn directory(root: &Path, code: &str) -> Result<Self, ExecutionError> {
        let dir = Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(root)
            .map_err(ExecutionError::io("create temp dir"))?;

        let script = dir.path().join(SCRIPT_NAME);
        std::fs::write(&script, code).map_err(ExecutionError::io("write code file"))?;

        Ok(Self::Directory { dir, script })
    }

    /// Path handed to the interpreter.
    pub fn script(&self) -> &Path {
        match self {
            Self::File(path) => &**path,
            Self::Directory { script, .. } => script.as_path(),
        }
    }

    /// Working directory for the interpreter, if the workspace has its own.
    pub fn working_dir(&self) -> Option<&Path> {
        match self {
            Self::File(_) => None,
            Self::Directory { dir, .. } => Some(dir.path()),
        }
    }

    /// Root path that disappears once the workspace is removed.
    pub fn root(&self) -> &Path {
        self.working_dir().unwrap_or_else(|| self.script())
    }

    pub fn remove(self) {
        let root = self.root().to_path_buf();
        let removed = match self {
            Self::File(path) => path.close(),
            Self::Directory { dir, .. } => dir.close(),
        };

        match removed {
            Ok(()) => tracing::trace!("Removed workspace {}", root.display()),
            Err(e) => tracing::warn!("Failed to remove workspace {}: {}", root.display(), e),
        }
    }
}

/// Writes `code` and syncs it, so write-back errors that would otherwise only
/// show up on close are reported before the interpreter starts.
fn store(file: &mut File, code: &str) -> Result<(), ExecutionError> {
    file.write_all(code.as_bytes())
        .map_err(ExecutionError::io("write code to temp file"))?;
    file.sync_all()
        .map_err(ExecutionError::io("close temp file"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_reports_write_failure() {
        let mut full = File::options().write(true).open("/dev/full").unwrap();

        let err = store(&mut full, "2+2").unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::IoFailure { op: "write code to temp file", .. }
        ));
    }

    #[test]
    fn test_file_workspace_holds_code_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::file(root.path(), "2+2").unwrap();

        let script = workspace.script().to_path_buf();
        let name = script.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(TEMP_FILE_PREFIX));
        assert!(name.ends_with(SCRIPT_SUFFIX));
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "2+2");
        assert!(workspace.working_dir().is_none());

        workspace.remove();
        assert!(!script.exists());
    }

    #[test]
    fn test_directory_workspace_is_removed_recursively() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::directory(root.path(), "print 1").unwrap();

        let dir = workspace.working_dir().unwrap().to_path_buf();
        assert_eq!(workspace.script(), dir.join(SCRIPT_NAME));
        assert_eq!(std::fs::read_to_string(workspace.script()).unwrap(), "print 1");

        // Interpreters may leave scratch files behind.
        std::fs::write(dir.join("scratch.tmp"), "junk").unwrap();

        workspace.remove();
        assert!(!dir.exists());
    }

    #[test]
    fn test_dropped_workspace_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let file = Workspace::file(root.path(), "x").unwrap();
        let dir = Workspace::directory(root.path(), "x").unwrap();
        let paths = [file.root().to_path_buf(), dir.root().to_path_buf()];

        drop(file);
        drop(dir);

        for path in paths {
            assert!(!path.exists(), "{} still exists", path.display());
        }
    }

    #[test]
    fn test_missing_root_is_io_failure() {
        let root = Path::new("/nonexistent/coderunner-root");

        assert!(matches!(
            Workspace::file(root, "x"),
            Err(ExecutionError::IoFailure { op: "create temp file", .. })
        ));
        assert!(matches!(
            Workspace::directory(root, "x"),
            Err(ExecutionError::IoFailure { op: "create temp dir", .. })
        ));
    }
}
