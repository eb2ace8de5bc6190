//! Config schema types (discord, database, relay policy, rate limiter).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossChatConfig {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    pub relay: RelayConfig,
    pub rate_limit: RateLimitConfig,
}

/// Discord connection and command settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token from the developer portal.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Messages starting with any of these are commands, never relayed.
    pub command_prefixes: Vec<String>,

    /// Guild in which moderator promotion/demotion commands are accepted.
    pub staff_guild: Option<u64>,

    /// Channel that receives command failure reports.
    pub log_channel: Option<u64>,

    /// How long ban/cooldown notices stay visible before the bot removes them.
    pub notice_ttl_secs: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"[REDACTED]")
            .field("command_prefixes", &self.command_prefixes)
            .field("staff_guild", &self.staff_guild)
            .field("log_channel", &self.log_channel)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            command_prefixes: vec!["c!".into()],
            staff_guild: None,
            log_channel: None,
            notice_ttl_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:crosschat.db?mode=rwc".into(),
            max_connections: 16,
        }
    }
}

/// What happens to a message from a non-staff sender that trips the filter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Relay it with the banned words masked.
    #[default]
    Mask,
    /// Drop it and tell the sender why.
    Block,
}

/// Relay engine policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Permission level at and above which senders skip rate limiting and
    /// filter blocking.
    pub staff_threshold: i64,

    /// Topic whose traffic is never rate limited or blocked.
    pub staff_topic: String,

    /// Delay before a banned sender's message is removed (ms).
    pub ban_delete_delay_ms: u64,

    /// Delay between starting the fan-out and removing the raw original (ms).
    pub origin_delete_delay_ms: u64,

    /// Text a delivered copy is edited to once its origin is deleted.
    pub deleted_placeholder: String,

    pub filter_action: FilterAction,

    /// Embed color for senders without a colored role.
    pub neutral_color: u32,

    /// Author name shown on announcements.
    pub system_name: String,

    /// Extra words appended to the built-in baseline list. Like the built-in
    /// words, they cannot be removed per guild.
    pub baseline_words: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            staff_threshold: 10,
            staff_topic: "staff".into(),
            ban_delete_delay_ms: 1000,
            origin_delete_delay_ms: 500,
            deleted_placeholder: "*[message deleted]*".into(),
            filter_action: FilterAction::Mask,
            neutral_color: 0x2F3136,
            system_name: "CrossChat".into(),
            baseline_words: Vec::new(),
        }
    }
}

/// Adaptive per-topic cooldown bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
    /// Sends older than this no longer count towards topic traffic.
    pub horizon_secs: u64,
    /// Cooldown grows by one second per this many sends inside the horizon.
    pub traffic_divisor: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_cooldown_secs: 1,
            max_cooldown_secs: 15,
            horizon_secs: 5,
            traffic_divisor: 4,
        }
    }
}
