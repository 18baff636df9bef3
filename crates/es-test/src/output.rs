use crate::error::{ExportError, ExportResult};
use std::path::{Path, PathBuf};

/// Absolute output path with `extension` appended when missing; parent
/// directories are created.
pub(crate) fn prepare_output_path(path: &Path, extension: &str) -> ExportResult<PathBuf> {
    let suffix = format!(".{}", extension);
    let path = if path
        .to_string_lossy()
        .to_lowercase()
        .ends_with(&suffix)
    {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(&suffix);
        PathBuf::from(name)
    };

    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| ExportError::CreateDir {
                path: path.display().to_string(),
                source,
            })?;
        }
    }
    Ok(path)
}
