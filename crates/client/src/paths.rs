//! Central path resolution for all wadash data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `WADASH_DATA_DIR` env > `~/.wadash`.
//! All callsites use these helpers instead of constructing paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

fn default_data_dir() -> io::Result<PathBuf> {
    if let Ok(env_val) = std::env::var("WADASH_DATA_DIR") {
        return Ok(PathBuf::from(env_val));
    }
    dirs::home_dir()
        .map(|home| home.join(".wadash"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME directory not found"))
}

/// Initialize the global data directory. Returns the resolved path.
///
/// Priority: `explicit` arg > `WADASH_DATA_DIR` env > `~/.wadash` default.
pub fn init_data_dir(explicit: Option<&Path>) -> io::Result<PathBuf> {
    let dir = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_data_dir()?,
    };

    let mut guard = DATA_DIR.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(dir.clone());
    Ok(dir)
}

/// Return the data directory, resolving the default if `init_data_dir` hasn't run.
pub fn data_dir() -> PathBuf {
    let configured = DATA_DIR.read().unwrap_or_else(|e| e.into_inner()).clone();
    configured
        .or_else(|| default_data_dir().ok())
        .unwrap_or_else(|| PathBuf::from(".wadash"))
}

pub fn settings_path() -> PathBuf {
    data_dir().join("settings.toml")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = data_dir();
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    Ok(())
}
