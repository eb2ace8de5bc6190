//! In-memory collaborators for relay tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    crosschat_common::{ChannelId, GuildId, MessageId, UserId},
};

use crate::{
    Error, Result,
    message::Envelope,
    outbound::{CustomEmoji, EmojiDirectory, NoticeTarget, RelayOutbound},
    store::{BanInfo, CorrelationStore, Database, DeliveredMessage, GuildConfig, UserPermission},
};

#[derive(Default)]
pub struct MemoryStore {
    guilds: Mutex<BTreeMap<GuildId, GuildConfig>>,
    users: Mutex<HashMap<UserId, UserPermission>>,
    messages: Mutex<BTreeMap<MessageId, DeliveredMessage>>,
    fail_listing: AtomicBool,
}

impl MemoryStore {
    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId, topic: &str) {
        self.guilds
            .lock()
            .unwrap()
            .entry(guild_id)
            .or_default()
            .channels
            .insert(channel_id, topic.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_level(&self, user_id: UserId, level: i64) {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_insert_with(|| UserPermission::new(user_id))
            .level = level;
    }

    pub fn ban(&self, user_id: UserId, ban: BanInfo) {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_insert_with(|| UserPermission::new(user_id))
            .ban = Some(ban);
    }

    pub fn record(&self, id: MessageId) -> Option<DeliveredMessage> {
        self.messages.lock().unwrap().get(&id).cloned()
    }

    pub fn records(&self) -> Vec<DeliveredMessage> {
        self.messages.lock().unwrap().values().cloned().collect()
    }

    /// Copies only, ordered by channel.
    pub fn copies(&self) -> Vec<DeliveredMessage> {
        let mut copies: Vec<_> = self
            .records()
            .into_iter()
            .filter(|m| !m.is_anchor())
            .collect();
        copies.sort_by_key(|m| m.channel_id);
        copies
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn guild_config(&self, guild_id: GuildId) -> Result<GuildConfig> {
        Ok(self
            .guilds
            .lock()
            .unwrap()
            .get(&guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_guild_config(&self, guild_id: GuildId, config: &GuildConfig) -> Result<()> {
        self.guilds.lock().unwrap().insert(guild_id, config.clone());
        Ok(())
    }

    async fn list_guild_configs(&self) -> Result<Vec<(GuildId, GuildConfig)>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::message("guild listing unavailable"));
        }
        Ok(self
            .guilds
            .lock()
            .unwrap()
            .iter()
            .map(|(id, config)| (*id, config.clone()))
            .collect())
    }

    async fn user_permission(&self, user_id: UserId) -> Result<UserPermission> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_insert_with(|| UserPermission::new(user_id))
            .clone())
    }

    async fn set_user_permission(&self, user_id: UserId, level: i64) -> Result<()> {
        self.set_level(user_id, level);
        Ok(())
    }

    async fn set_user_ban(&self, user_id: UserId, ban: Option<BanInfo>) -> Result<()> {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_insert_with(|| UserPermission::new(user_id))
            .ban = ban;
        Ok(())
    }
}

#[async_trait]
impl CorrelationStore for MemoryStore {
    async fn record_delivery(&self, message: &DeliveredMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveredMessage>> {
        Ok(self.record(id))
    }

    async fn siblings(&self, correlation_id: MessageId) -> Result<Vec<DeliveredMessage>> {
        Ok(self
            .records()
            .into_iter()
            .filter(|m| m.correlation_id == Some(correlation_id))
            .collect())
    }

    async fn mark_deleted(&self, id: MessageId, placeholder: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(&id) {
            Some(m) if !m.deleted => {
                m.deleted = true;
                m.content = placeholder.to_string();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn update_content(&self, id: MessageId, content: &str) -> Result<()> {
        if let Some(m) = self.messages.lock().unwrap().get_mut(&id) {
            m.content = content.to_string();
        }
        Ok(())
    }
}

/// Outbound double that hands out increasing message ids and remembers every
/// call.
pub struct RecordingOutbound {
    next_id: AtomicU64,
    pub sent: Mutex<Vec<(ChannelId, MessageId, Envelope)>>,
    pub edits: Mutex<Vec<(ChannelId, MessageId, String)>>,
    pub placeholders: Mutex<Vec<(ChannelId, MessageId, String)>>,
    pub deletes: Mutex<Vec<(ChannelId, MessageId)>>,
    pub notices: Mutex<Vec<(NoticeTarget, String)>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    fail_deletes: AtomicBool,
}

impl Default for RecordingOutbound {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(10_000),
            sent: Mutex::default(),
            edits: Mutex::default(),
            placeholders: Mutex::default(),
            deletes: Mutex::default(),
            notices: Mutex::default(),
            failing_channels: Mutex::default(),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl RecordingOutbound {
    pub fn fail_channel(&self, channel_id: ChannelId) {
        self.failing_channels.lock().unwrap().insert(channel_id);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn sent_to(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.sent.lock().unwrap().iter().map(|s| s.0).collect();
        channels.sort_unstable();
        channels
    }

    pub fn notice_texts(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn check_channel(&self, channel_id: ChannelId) -> Result<()> {
        if self.failing_channels.lock().unwrap().contains(&channel_id) {
            return Err(Error::outbound(
                format!("channel {channel_id}"),
                std::io::Error::other("missing access"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayOutbound for RecordingOutbound {
    async fn send_envelope(&self, channel_id: ChannelId, envelope: &Envelope) -> Result<MessageId> {
        self.check_channel(channel_id)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, id, envelope.clone()));
        Ok(id)
    }

    async fn edit_envelope(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        self.check_channel(channel_id)?;
        self.edits
            .lock()
            .unwrap()
            .push((channel_id, message_id, content.to_string()));
        Ok(())
    }

    async fn replace_with_placeholder(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        placeholder: &str,
    ) -> Result<()> {
        self.check_channel(channel_id)?;
        self.placeholders
            .lock()
            .unwrap()
            .push((channel_id, message_id, placeholder.to_string()));
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::outbound(
                "delete",
                std::io::Error::other("unknown message"),
            ));
        }
        self.deletes.lock().unwrap().push((channel_id, message_id));
        Ok(())
    }

    async fn send_notice(&self, target: &NoticeTarget, text: &str) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        Ok(())
    }
}

pub struct StaticEmojis(pub Vec<CustomEmoji>);

impl EmojiDirectory for StaticEmojis {
    fn find_by_name(&self, name: &str) -> Option<CustomEmoji> {
        self.0
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}
