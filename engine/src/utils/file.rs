//! File utility functions

use std::path::PathBuf;

/// Expand `~`/`~/...` to the home directory and make relative paths absolute
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();
    let expanded = match path {
        "~" => dirs::home_dir(),
        p => p
            .strip_prefix("~/")
            .and_then(|rest| dirs::home_dir().map(|home| home.join(rest))),
    }
    .unwrap_or_else(|| PathBuf::from(path));

    if expanded.is_absolute() {
        return expanded;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(expanded),
        Err(_) => expanded,
    }
}
