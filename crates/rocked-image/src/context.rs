//! Build context directory management.
//!
//! The build context lives at `<config_dir>/tmp/`. It holds the long-lived
//! support files copied into every image (supervisor, registrant, reporter
//! wrapper) and, for the duration of one build, the generated build file and
//! entry script. The latter are owned by [`ScopedFile`] guards so they are
//! removed on every exit path.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rocked_common::constants::{MONITOR_BIN, REPORT_BIN, REPORTER_SCRIPT};
use rocked_common::error::{Result, RockedError};

/// Wrapper installed in the image; registers itself with the supervisor for
/// the lifetime of the wrapped command. Usage: `rocked-reporter.sh <display> <cmd...>`.
pub const REPORTER_SCRIPT_BODY: &str = r#"#!/bin/sh
export DISPLAY="$1"
shift
rocked-report add
"$@"
status=$?
rocked-report remove
exit "$status"
"#;

/// A file that is deleted when the guard is dropped.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    /// Writes `contents` to `path` and takes ownership of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(path: impl Into<PathBuf>, contents: &str) -> Result<Self> {
        let path = path.into();
        fs::write(&path, contents).map_err(|e| RockedError::io(&path, e))?;
        Ok(Self { path })
    }

    /// Adds the executable bits to the file mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions cannot be read or changed.
    pub fn make_executable(&self) -> Result<()> {
        make_executable(&self.path)
    }

    /// Returns the owned path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed build file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove build file"),
        }
    }
}

/// Sets `u+x,g+x,o+x` on top of the current mode.
///
/// # Errors
///
/// Returns an error if the permissions cannot be read or changed.
pub fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| RockedError::io(path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).map_err(|e| RockedError::io(path, e))
}

/// Ensures the context directory exists and holds current support files.
///
/// `process_dir` holds the supervisor and registrant binaries; a binary is
/// only copied when the staged copy differs in size or modification time.
/// Missing binaries are skipped with a warning so that templates which
/// install them differently still build.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a copy fails.
pub fn stage_support_files(process_dir: &Path, context_dir: &Path) -> Result<()> {
    fs::create_dir_all(context_dir).map_err(|e| RockedError::io(context_dir, e))?;

    let script = context_dir.join(REPORTER_SCRIPT);
    let current = fs::read_to_string(&script).ok();
    if current.as_deref() != Some(REPORTER_SCRIPT_BODY) {
        fs::write(&script, REPORTER_SCRIPT_BODY).map_err(|e| RockedError::io(&script, e))?;
        tracing::debug!(path = %script.display(), "staged reporter script");
    }
    make_executable(&script)?;

    for bin in [MONITOR_BIN, REPORT_BIN] {
        let source = process_dir.join(bin);
        if !source.is_file() {
            tracing::warn!(path = %source.display(), "support binary missing, not staged");
            continue;
        }
        let target = context_dir.join(bin);
        if same_signature(&source, &target) {
            continue;
        }
        copy_preserving_mtime(&source, &target)?;
        tracing::debug!(path = %target.display(), "staged support binary");
    }
    Ok(())
}

fn same_signature(a: &Path, b: &Path) -> bool {
    let (Ok(ma), Ok(mb)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    ma.len() == mb.len() && ma.modified().ok() == mb.modified().ok()
}

fn copy_preserving_mtime(source: &Path, target: &Path) -> Result<()> {
    let _ = fs::copy(source, target).map_err(|e| RockedError::io(target, e))?;
    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| RockedError::io(source, e))?;
    fs::File::options()
        .write(true)
        .open(target)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| RockedError::io(target, e))
}
