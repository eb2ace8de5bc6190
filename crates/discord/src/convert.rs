//! Serenity models to relay events, and relay envelopes to embeds.

use {
    crosschat_relay::{
        Envelope,
        commands::CommandReply,
        message::{Author, InboundMessage, MentionedUser, MessageEdit, RoleColor},
    },
    serenity::all::{
        Attachment, Cache, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, Message,
        MessageUpdateEvent, Timestamp, User,
    },
};

pub const ERROR_COLOR: u32 = 0xFF0000;

pub fn inbound(cache: &Cache, msg: &Message) -> InboundMessage {
    let (guild_name, roles) = guild_context(cache, msg);
    let name = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| display_name(&msg.author));

    InboundMessage {
        id: msg.id.get(),
        guild_id: msg.guild_id.map(|id| id.get()),
        guild_name,
        channel_id: msg.channel_id.get(),
        author: Author {
            id: msg.author.id.get(),
            name,
            avatar_url: Some(msg.author.face()),
            is_bot: msg.author.bot || msg.webhook_id.is_some(),
            is_system: msg.author.system,
            roles,
        },
        content: msg.content.clone(),
        mentions: mentions(&msg.mentions),
        attachments: attachment_urls(&msg.attachments),
        timestamp: msg.timestamp.unix_timestamp(),
    }
}

/// `None` for updates that do not touch the text (embed unfurls, pins).
pub fn edit(event: &MessageUpdateEvent) -> Option<MessageEdit> {
    let content = event.content.clone()?;
    Some(MessageEdit {
        id: event.id.get(),
        content,
        mentions: event.mentions.as_deref().map(mentions).unwrap_or_default(),
        attachments: event
            .attachments
            .as_deref()
            .map(attachment_urls)
            .unwrap_or_default(),
    })
}

// The cache guard is not `Send`; everything needed is copied out here.
fn guild_context(cache: &Cache, msg: &Message) -> (Option<String>, Vec<RoleColor>) {
    let Some(guild) = msg.guild_id.and_then(|id| cache.guild(id)) else {
        return (None, Vec::new());
    };
    let roles = msg
        .member
        .as_ref()
        .map(|member| {
            member
                .roles
                .iter()
                .filter_map(|id| guild.roles.get(id))
                .map(|role| RoleColor {
                    position: role.position,
                    color: role.colour.0,
                })
                .collect()
        })
        .unwrap_or_default();
    (Some(guild.name.clone()), roles)
}

fn display_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

fn mentions(users: &[User]) -> Vec<MentionedUser> {
    users
        .iter()
        .map(|u| MentionedUser {
            id: u.id.get(),
            display_name: display_name(u),
        })
        .collect()
}

fn attachment_urls(attachments: &[Attachment]) -> Vec<String> {
    attachments.iter().map(|a| a.url.clone()).collect()
}

pub fn envelope_embed(envelope: &Envelope) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(envelope.author_line());
    if let Some(avatar) = &envelope.author_avatar {
        author = author.icon_url(avatar);
    }
    let embed = CreateEmbed::new()
        .author(author)
        .description(&envelope.content)
        .colour(envelope.color)
        .footer(CreateEmbedFooter::new(envelope.footer_line()));
    match Timestamp::from_unix_timestamp(envelope.timestamp) {
        Ok(ts) => embed.timestamp(ts),
        Err(_) => embed,
    }
}

pub fn reply_embed(reply: &CommandReply, neutral_color: u32) -> CreateEmbed {
    let color = if reply.is_error() {
        ERROR_COLOR
    } else {
        neutral_color
    };
    let mut embed = CreateEmbed::new().description(&reply.body).colour(color);
    if let Some(title) = &reply.title {
        embed = embed.title(title);
    }
    embed
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            author_name: "alice".into(),
            author_avatar: Some("https://cdn.example/a.png".into()),
            badge: "🔧".into(),
            rank: "Server Staff".into(),
            color: 0xABCDEF,
            content: "hello".into(),
            origin_guild: Some("Rust Club".into()),
            topic: "general".into(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn envelope_becomes_embed() {
        let json = serde_json::to_value(envelope_embed(&envelope())).unwrap();
        assert_eq!(json["description"], "hello");
        assert_eq!(json["author"]["name"], "🔧 alice");
        assert_eq!(json["author"]["icon_url"], "https://cdn.example/a.png");
        assert_eq!(
            json["footer"]["text"],
            "Rust Club • Server Staff • cc:#general"
        );
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn error_reply_has_title() {
        let reply = CommandReply::error("Bad argument", "Member \"bob\" not found.");
        let json = serde_json::to_value(reply_embed(&reply, 0)).unwrap();
        assert_eq!(json["title"], "Bad argument");
        assert_eq!(json["description"], "Member \"bob\" not found.");
    }
}
