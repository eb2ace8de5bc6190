//! Relay outbound over the serenity HTTP client.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    crosschat_common::{ChannelId, MessageId},
    crosschat_relay::{
        Envelope, Error, Result,
        outbound::{CustomEmoji, EmojiDirectory, NoticeTarget, RelayOutbound},
    },
    serenity::all::{
        Cache, CreateAllowedMentions, CreateEmbed, CreateMessage, EditMessage, Http,
        MessageId as SerenityMessageId, UserId as SerenityUserId,
    },
    tracing::debug,
};

use crate::convert::envelope_embed;

fn channel(id: ChannelId) -> serenity::all::ChannelId {
    serenity::all::ChannelId::new(id)
}

/// Sends, edits and deletes relayed copies, and resolves custom emojis from
/// the guilds the bot is in.
pub struct DiscordOutbound {
    http: Arc<Http>,
    cache: Arc<Cache>,
    notice_ttl: Duration,
}

impl DiscordOutbound {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, notice_ttl: Duration) -> Self {
        Self {
            http,
            cache,
            notice_ttl,
        }
    }
}

#[async_trait]
impl RelayOutbound for DiscordOutbound {
    async fn send_envelope(&self, channel_id: ChannelId, envelope: &Envelope) -> Result<MessageId> {
        let message = channel(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(envelope_embed(envelope)))
            .await
            .map_err(|e| Error::outbound(format!("send to channel {channel_id}"), e))?;
        Ok(message.id.get())
    }

    async fn edit_envelope(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        let target = channel(channel_id);
        let existing = target
            .message(&self.http, SerenityMessageId::new(message_id))
            .await
            .map_err(|e| Error::outbound(format!("fetch message {message_id}"), e))?;
        let embed = existing
            .embeds
            .into_iter()
            .next()
            .map(CreateEmbed::from)
            .unwrap_or_default()
            .description(content);
        target
            .edit_message(
                &self.http,
                SerenityMessageId::new(message_id),
                EditMessage::new().embed(embed),
            )
            .await
            .map_err(|e| Error::outbound(format!("edit message {message_id}"), e))?;
        Ok(())
    }

    async fn replace_with_placeholder(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        placeholder: &str,
    ) -> Result<()> {
        channel(channel_id)
            .edit_message(
                &self.http,
                SerenityMessageId::new(message_id),
                EditMessage::new().content(placeholder).embeds(Vec::new()),
            )
            .await
            .map_err(|e| Error::outbound(format!("retract message {message_id}"), e))?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel(channel_id)
            .delete_message(&self.http, SerenityMessageId::new(message_id))
            .await
            .map_err(|e| Error::outbound(format!("delete message {message_id}"), e))
    }

    async fn send_notice(&self, target: &NoticeTarget, text: &str) -> Result<()> {
        match *target {
            NoticeTarget::Direct { user_id } => {
                let dm = SerenityUserId::new(user_id)
                    .create_dm_channel(&self.http)
                    .await
                    .map_err(|e| Error::outbound(format!("open DM with {user_id}"), e))?;
                dm.id
                    .send_message(&self.http, CreateMessage::new().content(text))
                    .await
                    .map_err(|e| Error::outbound(format!("DM {user_id}"), e))?;
            },
            NoticeTarget::Channel {
                channel_id,
                user_id,
            } => {
                let notice = channel(channel_id)
                    .send_message(
                        &self.http,
                        CreateMessage::new()
                            .content(format!("<@{user_id}> {text}"))
                            .allowed_mentions(
                                CreateAllowedMentions::new()
                                    .users(vec![SerenityUserId::new(user_id)]),
                            ),
                    )
                    .await
                    .map_err(|e| Error::outbound(format!("notice in channel {channel_id}"), e))?;

                let http = Arc::clone(&self.http);
                let ttl = self.notice_ttl;
                tokio::spawn(async move {
                    tokio::time::sleep(ttl).await;
                    if let Err(e) = notice.channel_id.delete_message(&http, notice.id).await {
                        debug!(channel_id, error = %e, "notice already gone");
                    }
                });
            },
        }
        Ok(())
    }
}

impl EmojiDirectory for DiscordOutbound {
    fn find_by_name(&self, name: &str) -> Option<CustomEmoji> {
        for guild_id in self.cache.guilds() {
            let Some(guild) = self.cache.guild(guild_id) else {
                continue;
            };
            let found = guild
                .emojis
                .values()
                .find(|e| e.name.eq_ignore_ascii_case(name) && e.available);
            if let Some(emoji) = found {
                return Some(CustomEmoji {
                    id: emoji.id.get(),
                    name: emoji.name.clone(),
                    animated: emoji.animated,
                });
            }
        }
        debug!(name, "no usable emoji with this name");
        None
    }
}
