//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. A missing file
//! is not an error: a warning is logged and compiled defaults are used.
//!
//! Root folder priority order:
//! 1. Command-line argument (handled by the binary, passed in as an override)
//! 2. Environment variable (`SCORESHARE_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SCORESHARE_ROOT_FOLDER";

/// Environment variable pointing at an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "SCORESHARE_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; unset fields fall back to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding staging and public storage
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[serde(default)]
    pub bind: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upload pipeline limits and storage locations
    #[serde(default)]
    pub upload: UploadToml,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[upload]` table of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadToml {
    pub staging_dir: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub public_prefix: Option<String>,
    pub max_chunk_bytes: Option<usize>,
    pub max_total_chunks: Option<u32>,
    pub max_file_bytes: Option<u64>,
    pub allowed_media_types: Option<Vec<String>>,
    /// Media type uploads are validated against; added to the allow-list if absent
    pub expected_media_type: Option<String>,
    pub stale_session_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/scoreshare (or /var/lib/scoreshare for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("scoreshare"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/scoreshare"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("scoreshare"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/scoreshare"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("scoreshare"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\scoreshare"))
    } else {
        PathBuf::from("./scoreshare_data")
    }
}

/// Locate the TOML config file, if any
///
/// `SCORESHARE_CONFIG` wins; otherwise the user config dir, then (Linux only)
/// `/etc/scoreshare/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("scoreshare").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/scoreshare/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config_from(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load the TOML config, degrading gracefully
///
/// An explicit path that fails to load is an error. When no explicit path is
/// given, a missing or unreadable discovered file only logs a warning.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return load_toml_config_from(path);
    }

    match find_config_file() {
        Some(path) => match load_toml_config_from(&path) {
            Ok(config) => {
                debug!("Loaded config file {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Ok(TomlConfig::default())
            }
        },
        None => {
            warn!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolves the root folder following the priority order in the module docs
pub struct RootFolderResolver<'a> {
    toml: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(toml: &'a TomlConfig) -> Self {
        Self { toml }
    }

    pub fn resolve(&self, cli_arg: Option<&Path>) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}
