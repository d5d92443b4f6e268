use crate::error::AppError;
use std::path::Path;
use tokio::fs;
use tracing::info;

pub const RETENTION_THRESHOLD: usize = 5;

/// Wipes every file in `dir` once it holds more than `threshold` entries.
/// Returns how many files were removed.
pub async fn enforce(dir: &Path, threshold: usize) -> Result<usize, AppError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|err| AppError::io(dir, err))?;

    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| AppError::io(dir, err))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| AppError::io(dir, err))?
    {
        files.push(entry.path());
    }

    if files.len() <= threshold {
        return Ok(0);
    }

    let mut removed = 0;
    for path in &files {
        match fs::remove_file(path).await {
            Ok(()) => removed += 1,
            // Another client may have wiped the directory first.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(AppError::io(path, err)),
        }
    }
    info!(dir = %dir.display(), removed, "purged generated outputs");
    Ok(removed)
}
