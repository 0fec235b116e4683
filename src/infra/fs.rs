//! Filesystem bootstrap for the render directories.

use std::path::Path;

use tracing::info;

use crate::config::RenderSettings;

use super::error::InfraError;

/// Create the cache and workspace directories, including missing parents.
pub fn prepare_render_dirs(settings: &RenderSettings) -> Result<(), InfraError> {
    ensure_dir(&settings.cache_dir)?;
    ensure_dir(&settings.temp_dir)?;
    info!(
        target = "infra::fs",
        op = "fs::prepare_render_dirs",
        cache_dir = %settings.cache_dir.display(),
        temp_dir = %settings.temp_dir.display(),
        "Render directories ready"
    );
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), InfraError> {
    if path.exists() && !path.is_dir() {
        return Err(InfraError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}
