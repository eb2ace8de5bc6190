use {
    async_trait::async_trait,
    crosschat_common::{ChannelId, MessageId, UserId},
};

use crate::{Result, message::Envelope};

/// Where a policy notice (ban, cooldown, filter) goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeTarget {
    /// A transient message in the room, addressed to the user.
    Channel {
        channel_id: ChannelId,
        user_id: UserId,
    },
    /// A direct message to the user.
    Direct { user_id: UserId },
}

/// Send, edit and delete primitives of the chat platform.
#[async_trait]
pub trait RelayOutbound: Send + Sync {
    /// Deliver a relayed copy, returning the platform id of the new message.
    async fn send_envelope(&self, channel_id: ChannelId, envelope: &Envelope) -> Result<MessageId>;

    /// Replace the content of a relayed copy, keeping its author and styling.
    async fn edit_envelope(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()>;

    /// Turn a relayed copy into a bare placeholder, dropping its rich content.
    async fn replace_with_placeholder(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        placeholder: &str,
    ) -> Result<()>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;

    async fn send_notice(&self, target: &NoticeTarget, text: &str) -> Result<()>;
}

/// A custom emoji the bot is able to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEmoji {
    pub id: u64,
    pub name: String,
    pub animated: bool,
}

impl CustomEmoji {
    /// Inline reference as understood by the platform, e.g. `<a:party:123>`.
    pub fn reference(&self) -> String {
        let prefix = if self.animated {
            "a"
        } else {
            ""
        };
        format!("<{prefix}:{}:{}>", self.name, self.id)
    }
}

/// Lookup of custom emojis available to the bot.
pub trait EmojiDirectory: Send + Sync {
    /// Find an emoji by name, case-insensitively.
    fn find_by_name(&self, name: &str) -> Option<CustomEmoji>;
}
