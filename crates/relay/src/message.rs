//! Platform-neutral inbound events and the outbound envelope.

use crosschat_common::{ChannelId, GuildId, MessageId, UserId};

/// A role the author holds, reduced to what color resolution needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleColor {
    /// Higher positions sit above lower ones in the guild's role list.
    pub position: u16,
    /// `0` means the role carries no color.
    pub color: u32,
}

#[derive(Debug, Clone)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_bot: bool,
    pub is_system: bool,
    pub roles: Vec<RoleColor>,
}

/// A user mentioned in the message body, with the name to render instead of
/// the raw mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedUser {
    pub id: UserId,
    pub display_name: String,
}

/// A message as delivered by the chat platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    /// `None` for direct messages and other events without a guild context.
    pub guild_id: Option<GuildId>,
    pub guild_name: Option<String>,
    pub channel_id: ChannelId,
    pub author: Author,
    pub content: String,
    pub mentions: Vec<MentionedUser>,
    /// Attachment URLs.
    pub attachments: Vec<String>,
    /// Unix seconds.
    pub timestamp: i64,
}

/// An edit of a previously seen message.
#[derive(Debug, Clone)]
pub struct MessageEdit {
    pub id: MessageId,
    pub content: String,
    pub mentions: Vec<MentionedUser>,
    pub attachments: Vec<String>,
}

/// What every destination room receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub badge: String,
    pub rank: String,
    pub color: u32,
    pub content: String,
    pub origin_guild: Option<String>,
    pub topic: String,
    /// Unix seconds of the original message.
    pub timestamp: i64,
}

impl Envelope {
    /// Author line as shown above the relayed content, e.g. `🔧 alice`.
    pub fn author_line(&self) -> String {
        if self.badge.is_empty() {
            self.author_name.clone()
        } else {
            format!("{} {}", self.badge, self.author_name)
        }
    }

    /// Footer line naming the origin guild and the sender's rank.
    pub fn footer_line(&self) -> String {
        match &self.origin_guild {
            Some(guild) => format!("{guild} • {} • cc:#{}", self.rank, self.topic),
            None => format!("{} • cc:#{}", self.rank, self.topic),
        }
    }
}
