//! Atomic file operations for managed configuration.
//!
//! Content is staged in a private temporary file next to the destination and
//! renamed into place, so an interrupted run never leaves a half-written file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::ProvisionError;

/// Write file atomically with the given permission bits
pub(crate) fn write_file_atomic(path: &Path, content: &[u8], mode: u32) -> Result<(), ProvisionError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = NamedTempFile::new_in(parent)
        .map_err(|e| ProvisionError::resource(path, format!("Failed to create temp file: {e}")))?;

    staged
        .write_all(content)
        .map_err(|e| ProvisionError::resource(path, format!("Failed to write temp file: {e}")))?;

    staged
        .as_file()
        .sync_all()
        .map_err(|e| ProvisionError::resource(path, format!("Failed to sync temp file: {e}")))?;

    set_mode(staged.path(), mode)?;

    staged
        .persist(path)
        .map_err(|e| ProvisionError::resource(path, format!("Failed to rename temp file: {}", e.error)))?;

    Ok(())
}

/// Set permission bits on an existing path
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| ProvisionError::resource(path, format!("Failed to set permissions: {e}")))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Permission bits of `path`, without the file type
#[cfg(all(test, unix))]
pub(crate) fn mode_of(path: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}
