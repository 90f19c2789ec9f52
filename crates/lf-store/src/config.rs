use std::path::{Path, PathBuf};
use std::{env, fs};

use lf_core::EngineConfig;

use crate::error::Result;
use crate::store::Store;

/// Overrides the data directory when set.
pub const DATA_DIR_ENV: &str = "LF_DATA_DIR";

pub const CONFIG_FILE: &str = "config.toml";
pub const DATABASE_FILE: &str = "engine.db";

/// `$LF_DATA_DIR`, else `~/.lexfield`.
pub fn default_base_dir() -> PathBuf {
    match env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs_home().join(".lexfield"),
    }
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Read engine settings from a TOML file. A missing file yields defaults;
/// unknown keys are rejected.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Create `base` if needed and open the database inside it.
pub fn open_data_dir(base: &Path) -> Result<Store> {
    fs::create_dir_all(base)?;
    Store::open(&base.join(DATABASE_FILE))
}
