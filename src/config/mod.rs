mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Sandbox root override.
pub const ENV_ROOT: &str = "CLIPFORGED_ROOT";
/// Default meta store override.
pub const ENV_META_PATH: &str = "DATASET_META_PATH";
/// Assist service token.
pub const ENV_API_TOKEN: &str = "REPLICATE_API_TOKEN";

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./clipforged.toml",
        "./config.toml",
        "~/.config/clipforged/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Environment wins over the file for the sandbox root, default meta
/// store, and API token. Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(root) = env_value(ENV_ROOT) {
        config.dataset.root = PathBuf::from(shellexpand::tilde(&root).as_ref());
    }
    if let Some(meta) = env_value(ENV_META_PATH) {
        config.dataset.default_meta_path = Some(PathBuf::from(shellexpand::tilde(&meta).as_ref()));
    }
    if let Some(token) = env_value(ENV_API_TOKEN) {
        config.assist.api_token = Some(token);
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.dataset.root.as_os_str().is_empty() {
        anyhow::bail!("Dataset root cannot be empty");
    }

    let derived = Path::new(&config.dataset.derived_file_name);
    if derived.components().count() != 1 || derived.file_name().is_none() {
        anyhow::bail!(
            "Derived file name must be a bare file name, got {:?}",
            config.dataset.derived_file_name
        );
    }

    if config.transcode.video_crf > 51 {
        anyhow::bail!(
            "Video CRF must be between 0 and 51, got {}",
            config.transcode.video_crf
        );
    }

    if config.assist.max_polls == 0 {
        anyhow::bail!("Assist max_polls must be at least 1");
    }

    if config.tools.timeout_secs == 0 {
        anyhow::bail!("Tool timeout cannot be 0");
    }

    if !config.dataset.root.exists() {
        tracing::warn!("Dataset root does not exist: {:?}", config.dataset.root);
    }

    Ok(())
}
