use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Name of the dotenv file for an optional environment (`.env.{ENV}`).
pub fn env_file_name(env: Option<&str>) -> String {
    match env {
        Some(env) => format!(".env.{}", env),
        None => ".env".to_string(),
    }
}

/// Load a dotenv file from the current directory or any parent directory.
///
/// Searches from the current working directory up to the filesystem root and
/// loads the first match. Returns the loaded path, or `None` if no file was
/// found; variables may also come from the process environment.
pub fn load_dotenv_from_ancestors(file_name: &str) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    for dir in cwd.ancestors() {
        let env_path = dir.join(file_name);
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load {}", env_path.display()))?;
            info!("Loaded {}", env_path.display());
            return Ok(Some(env_path));
        }
    }

    debug!(file = file_name, from = %cwd.display(), "No dotenv file found");
    Ok(None)
}
