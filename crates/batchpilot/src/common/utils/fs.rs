use std::path::{Path, PathBuf};

pub fn absolute_path(path: PathBuf) -> crate::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Returns the content of a file if it exists and is not empty.
pub fn read_nonempty(path: &Path) -> Option<String> {
    let content = std::fs::read(path).ok()?;
    if content.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&content).into_owned())
    }
}
