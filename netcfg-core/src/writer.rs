use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors that can occur while writing a rendered artifact to disk.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The parent directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    /// The file could not be written or its permissions set.
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Write `contents` to `path`, creating parent directories.
///
/// The whole file is replaced; `mode` sets unix permission bits when given.
pub fn write_artifact(path: &Path, contents: &str, mode: Option<u32>) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let io_err = |source| WriteError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::write(path, contents).map_err(io_err)?;
    if let Some(mode) = mode {
        set_mode(path, mode).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
