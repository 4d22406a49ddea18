//! Configuration path resolution
//!
//! Directories are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. OS-dependent default

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the per-user log directory
pub const LOG_DIR_ENV: &str = "SIMURAN_LOG_DIR";

/// Environment variable overriding the batch output directory
pub const OUTPUT_DIR_ENV: &str = "SIMURAN_OUTPUT_DIR";

/// Name of the output directory created next to the index table by default
pub const DEFAULT_OUTPUT_DIRNAME: &str = "sim_results";

/// Resolve a directory from CLI argument, then environment variable, then default
pub fn resolve_directory(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    default: impl FnOnce() -> PathBuf,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: compiled default
    default()
}

/// Fixed per-user location of the rotating log
pub fn resolve_log_dir(cli_arg: Option<&Path>) -> PathBuf {
    resolve_directory(cli_arg, LOG_DIR_ENV, default_log_dir)
}

/// Output directory for a batch run over `index_path`
pub fn resolve_output_dir(cli_arg: Option<&Path>, index_path: &Path) -> PathBuf {
    resolve_directory(cli_arg, OUTPUT_DIR_ENV, || {
        let base = if index_path.is_dir() {
            index_path
        } else {
            index_path.parent().unwrap_or_else(|| Path::new("."))
        };
        base.join(DEFAULT_OUTPUT_DIRNAME)
    })
}

/// Get OS-dependent default log directory
pub fn default_log_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/simuran/logs
        dirs::data_local_dir()
            .map(|d| d.join("simuran").join("logs"))
            .unwrap_or_else(|| PathBuf::from("/tmp/simuran/logs"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Logs/simuran
        dirs::home_dir()
            .map(|d| d.join("Library").join("Logs").join("simuran"))
            .unwrap_or_else(|| PathBuf::from("/tmp/simuran/logs"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\simuran\logs
        dirs::data_local_dir()
            .map(|d| d.join("simuran").join("logs"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\simuran\\logs"))
    } else {
        PathBuf::from("./simuran_logs")
    }
}

/// Create `dir` (and parents) if missing
pub fn ensure_directory(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(Error::Configuration(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// File stem used to name run outputs after a config file
pub fn config_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "run".to_string())
}
