//! Configuration loading and output folder resolution

use std::path::PathBuf;

/// Resolve the subtitle output folder, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`output_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_output_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("output_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_output_folder()
}

/// Locate the configuration file for the platform, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ksync").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ksync/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Compiled default output folder: the platform music folder (or the home
/// folder) under a `ksync` subdirectory.
pub fn default_output_folder() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("ksync"))
        .unwrap_or_else(|| PathBuf::from("ksync"))
}
