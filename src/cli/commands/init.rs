use crate::config::{AppConfig, CONFIG_FILE, WORKSPACE_DIR, cache_path};
use crate::error::{JiloError, Result};
use crate::storage::SqliteStorage;
use std::path::Path;

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if a workspace already exists (without `--force`) or
/// the directory/cache cannot be created.
pub fn execute(force: bool) -> Result<()> {
    let dir = Path::new(WORKSPACE_DIR);
    if dir.join(CONFIG_FILE).exists() && !force {
        return Err(JiloError::AlreadyInitialized {
            path: dir.to_path_buf(),
        });
    }

    std::fs::create_dir_all(dir)?;
    AppConfig::default().write(dir)?;
    // opening the cache creates it with the current schema
    SqliteStorage::open(&cache_path(dir))?;

    println!("Initialized jilo workspace at {}", dir.display());
    Ok(())
}
