// src/infra/paths.rs — Config path resolution
//
// PROMPTEVO_HOME overrides everything. Otherwise config lives in ~/.promptevo/.

use std::path::PathBuf;

fn promptevo_home() -> Option<PathBuf> {
    std::env::var_os("PROMPTEVO_HOME").map(PathBuf::from)
}

/// Configuration directory: $PROMPTEVO_HOME/ or ~/.promptevo/
pub fn config_dir() -> Option<PathBuf> {
    if let Some(home) = promptevo_home() {
        return Some(home);
    }
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".promptevo"))
}

pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
