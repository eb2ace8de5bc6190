use std::collections::BTreeMap;

use {
    async_trait::async_trait,
    crosschat_common::{ChannelId, GuildId, MessageId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Per-guild persisted configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    /// Local room → topic name.
    pub channels: BTreeMap<ChannelId, String>,
    /// Words this guild filters on top of the shared baseline.
    pub banned_words: Vec<String>,
}

/// Why and how a banned user is told about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanInfo {
    pub reason: Option<String>,
    /// Send the rejection notice as a direct message instead of in the room.
    pub notify_direct: bool,
}

/// A user's platform-wide standing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermission {
    pub id: UserId,
    pub level: i64,
    pub ban: Option<BanInfo>,
}

impl UserPermission {
    /// The record a user gets on first lookup.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            level: 0,
            ban: None,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }
}

/// One record of a correlation group.
///
/// The anchor record describes the original message and has no
/// `correlation_id`; every delivered copy points at the anchor's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub id: MessageId,
    pub correlation_id: Option<MessageId>,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    pub deleted: bool,
}

impl DeliveredMessage {
    pub fn is_anchor(&self) -> bool {
        self.correlation_id.is_none()
    }

    /// Id of the group this record belongs to.
    pub fn anchor_id(&self) -> MessageId {
        self.correlation_id.unwrap_or(self.id)
    }
}

/// Guild and user persistence.
#[async_trait]
pub trait Database: Send + Sync {
    /// Stored config of a guild, or the empty config if none was stored yet.
    async fn guild_config(&self, guild_id: GuildId) -> Result<GuildConfig>;
    async fn update_guild_config(&self, guild_id: GuildId, config: &GuildConfig) -> Result<()>;
    async fn list_guild_configs(&self) -> Result<Vec<(GuildId, GuildConfig)>>;

    /// Standing of a user, created with level 0 when absent.
    async fn user_permission(&self, user_id: UserId) -> Result<UserPermission>;
    async fn set_user_permission(&self, user_id: UserId, level: i64) -> Result<()>;
    async fn set_user_ban(&self, user_id: UserId, ban: Option<BanInfo>) -> Result<()>;
}

/// Append-only history of relayed messages.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn record_delivery(&self, message: &DeliveredMessage) -> Result<()>;
    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveredMessage>>;
    /// Copies pointing at `correlation_id`; the anchor record is not included.
    async fn siblings(&self, correlation_id: MessageId) -> Result<Vec<DeliveredMessage>>;
    /// Flag a record deleted and store `placeholder` as its content.
    ///
    /// Returns `false` when the record is unknown or already deleted, so a
    /// cascade can use it to claim each copy exactly once.
    async fn mark_deleted(&self, id: MessageId, placeholder: &str) -> Result<bool>;
    async fn update_content(&self, id: MessageId, content: &str) -> Result<()>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_config_json_uses_string_keys() {
        let mut config = GuildConfig::default();
        config.channels.insert(101, "general".into());
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"channels":{"101":"general"},"banned_words":[]}"#);
    }

    #[test]
    fn guild_config_tolerates_missing_fields() {
        let config: GuildConfig = serde_json::from_str(r#"{"channels":{"7":"art"}}"#).unwrap();
        assert_eq!(config.channels.get(&7).map(String::as_str), Some("art"));
        assert!(config.banned_words.is_empty());
    }

    #[test]
    fn anchor_id_of_copy_and_anchor() {
        let anchor = DeliveredMessage {
            id: 1,
            correlation_id: None,
            guild_id: 10,
            channel_id: 100,
            author_id: 5,
            content: "hi".into(),
            deleted: false,
        };
        let copy = DeliveredMessage {
            id: 2,
            correlation_id: Some(1),
            ..anchor.clone()
        };
        assert!(anchor.is_anchor());
        assert_eq!(anchor.anchor_id(), 1);
        assert!(!copy.is_anchor());
        assert_eq!(copy.anchor_id(), 1);
    }
}
