//! Configuration loading and env substitution.
//!
//! Config files: `crosschat.toml`, `crosschat.yaml`, or `crosschat.json`
//! Searched in `./` then `~/.config/crosschat/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        CrossChatConfig, DatabaseConfig, DiscordConfig, FilterAction, RateLimitConfig,
        RelayConfig,
    },
};
