use std::path::{Path, PathBuf};

use {
    crosschat_common::{Error, Result},
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CrossChatConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "crosschat.toml",
    "crosschat.yaml",
    "crosschat.yml",
    "crosschat.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<CrossChatConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::message(format!("failed to read {}: {e}", path.display()))
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./crosschat.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/crosschat/crosschat.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CrossChatConfig::default()` if no config file is found.
pub fn discover_and_load() -> CrossChatConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    CrossChatConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/crosschat/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "crosschat").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<CrossChatConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse("toml", e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse("yaml", e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse("json", e)),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}
