//! Ingest service configuration
//!
//! Resolved once at startup from command-line arguments, the TOML file and
//! compiled defaults (see `scoreshare_common::config`). Immutable afterwards.

use scoreshare_common::config::{CompiledDefaults, RootFolderResolver, TomlConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage key prefix for published files
pub const DEFAULT_PUBLIC_PREFIX: &str = "sheet-music";

/// Default maximum size of a single chunk (5 MiB)
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// Default maximum number of chunks per session
pub const DEFAULT_MAX_TOTAL_CHUNKS: u32 = 1000;

/// Default maximum assembled file size (50 MiB)
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Default age after which an untouched staging session is swept (24 h)
pub const DEFAULT_STALE_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default interval between sweeps (5 min)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Settings for the chunked upload pipeline
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root of the per-session staging directories
    pub staging_dir: PathBuf,
    /// Root of the permanent public storage
    pub public_dir: PathBuf,
    /// Key prefix for published files
    pub public_prefix: String,
    /// Maximum size of a single chunk payload
    pub max_chunk_bytes: usize,
    /// Maximum `totalChunks` a session may declare
    pub max_total_chunks: u32,
    /// Maximum size of an assembled file
    pub max_file_bytes: u64,
    /// Media types accepted by content validation
    pub allowed_media_types: Vec<String>,
    /// Media type every upload is validated against (`expected_media_type`
    /// in TOML; defaults to PDF, or the first allow-listed type when PDF is
    /// not allowed)
    pub expected_media_type: String,
    /// Staging sessions untouched for longer than this are swept
    pub stale_session_ttl: Duration,
    /// Interval between sweeps
    pub sweep_interval: Duration,
}

impl UploadConfig {
    /// Defaults rooted at `root_folder` (`temp/` for staging, `public/` for storage)
    pub fn with_root(root_folder: &Path) -> Self {
        Self {
            staging_dir: root_folder.join("temp"),
            public_dir: root_folder.join("public"),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            max_total_chunks: DEFAULT_MAX_TOTAL_CHUNKS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_media_types: vec!["application/pdf".to_string()],
            expected_media_type: "application/pdf".to_string(),
            stale_session_ttl: Duration::from_secs(DEFAULT_STALE_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }

    /// Apply the `[upload]` table of the TOML file over the defaults
    pub fn from_toml(root_folder: &Path, toml: &TomlConfig) -> Self {
        let mut config = Self::with_root(root_folder);
        let upload = &toml.upload;

        if let Some(dir) = &upload.staging_dir {
            config.staging_dir = dir.clone();
        }
        if let Some(dir) = &upload.public_dir {
            config.public_dir = dir.clone();
        }
        if let Some(prefix) = &upload.public_prefix {
            config.public_prefix = prefix.trim_matches('/').to_string();
        }
        if let Some(max) = upload.max_chunk_bytes {
            config.max_chunk_bytes = max;
        }
        if let Some(max) = upload.max_total_chunks {
            config.max_total_chunks = max;
        }
        if let Some(max) = upload.max_file_bytes {
            config.max_file_bytes = max;
        }
        if let Some(types) = &upload.allowed_media_types {
            if !types.is_empty() {
                config.allowed_media_types = types.clone();
            }
        }
        // Without an explicit choice, fall back to the first allow-listed type
        if let Some(expected) = &upload.expected_media_type {
            if !config.allowed_media_types.contains(expected) {
                tracing::warn!(expected = %expected, "Expected media type is not allow-listed, adding it");
                config.allowed_media_types.push(expected.clone());
            }
            config.expected_media_type = expected.clone();
        } else if !config.allowed_media_types.contains(&config.expected_media_type) {
            if let Some(first) = config.allowed_media_types.first() {
                config.expected_media_type = first.clone();
            }
        }
        if let Some(secs) = upload.stale_session_ttl_secs {
            config.stale_session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = upload.sweep_interval_secs {
            config.sweep_interval = Duration::from_secs(secs.max(1));
        }

        config
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub log_level: String,
    pub upload: UploadConfig,
}

impl IngestConfig {
    /// Resolve configuration; `cli_*` values take precedence over the TOML file
    pub fn resolve(
        toml: &TomlConfig,
        cli_root: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
    ) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        let root_folder = RootFolderResolver::new(toml).resolve(cli_root);
        let upload = UploadConfig::from_toml(&root_folder, toml);

        Self {
            bind: cli_bind
                .map(str::to_string)
                .or_else(|| toml.bind.clone())
                .unwrap_or(defaults.bind),
            port: cli_port.or(toml.port).unwrap_or(defaults.port),
            log_level: toml.logging.level.clone(),
            root_folder,
            upload,
        }
    }
}
