use std::path::{Component, Path};

use crate::TransferError;

/// Validates a file name announced by a peer before it touches the disk.
///
/// The name must be exactly one normal path component. Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Any directory part, including parent traversal (`..`) and `./`
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    let path = Path::new(file_name);

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_name}"
        )));
    }

    let mut normal = 0usize;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {file_name}"
                )));
            }
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {file_name}"
                )));
            }
            Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {file_name}"
                )));
            }
            Component::CurDir => {
                return Err(TransferError::InvalidPath(format!(
                    "directory components not allowed: {file_name}"
                )));
            }
            Component::Normal(_) => normal += 1,
        }
    }

    if normal != 1 {
        return Err(TransferError::InvalidPath(format!(
            "file name must not contain directories: {file_name}"
        )));
    }

    Ok(())
}
