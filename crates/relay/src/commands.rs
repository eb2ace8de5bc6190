//! Administrative command surface.
//!
//! Commands are parsed from plain message text and run against the topology,
//! the user database and the relay engine. The chat adapter passes the raw
//! message content in and renders the returned [`CommandReply`].

use std::sync::Arc;

use {
    crosschat_common::{
        ChannelId, GuildId, MessageId, UserId, parse_channel_ref, parse_user_ref,
    },
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    engine::{BroadcastOrigin, RelayEngine},
    store::{BanInfo, Database},
    topology::Topology,
};

const DEFAULT_TOPIC: &str = "general";
const MODERATOR_LEVEL: i64 = 10;

/// Strip the first matching command prefix. `None` if `content` is no
/// command at all.
pub fn strip_prefix<'a>(content: &'a str, prefixes: &[String]) -> Option<&'a str> {
    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| content.strip_prefix(p.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Link the invoking channel to a topic.
    Setup { topic: String },
    Unlink { channel: Option<ChannelId> },
    SetLevel { user: UserId, level: i64 },
    AddMod { user: UserId },
    DelMod { user: UserId },
    Info { message: MessageId },
    Announce { topic: String, text: String },
    FilterAdd { word: String },
    FilterRemove { word: String },
    FilterList,
    Ban {
        user: UserId,
        notify_direct: bool,
        reason: Option<String>,
    },
    Unban { user: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("{0}")]
    MissingArgument(&'static str),

    #[error("{0}")]
    BadArgument(String),
}

impl CommandError {
    /// Embed title shown to the invoker.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "Unknown command",
            Self::MissingArgument(_) => "Missing required argument",
            Self::BadArgument(_) => "Bad argument",
        }
    }
}

/// Whitespace separated arguments, with access to the unsplit remainder.
struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            rest: input.trim(),
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let (head, tail) = self
            .rest
            .split_once(char::is_whitespace)
            .unwrap_or((self.rest, ""));
        self.rest = tail.trim_start();
        Some(head)
    }

    fn peek(&self) -> Option<&'a str> {
        self.rest.split_whitespace().next()
    }

    fn remainder(&mut self) -> Option<&'a str> {
        let rest = std::mem::take(&mut self.rest).trim_end();
        (!rest.is_empty()).then_some(rest)
    }

    fn user(&mut self, name: &'static str) -> std::result::Result<UserId, CommandError> {
        let raw = self.next().ok_or(CommandError::MissingArgument(name))?;
        parse_user_ref(raw)
            .ok_or_else(|| CommandError::BadArgument(format!("Member \"{raw}\" not found.")))
    }

    fn word(&mut self, name: &'static str) -> std::result::Result<String, CommandError> {
        self.next()
            .map(str::to_string)
            .ok_or(CommandError::MissingArgument(name))
    }
}

impl AdminCommand {
    /// Parse command text with the prefix already stripped.
    pub fn parse(input: &str) -> std::result::Result<Self, CommandError> {
        let mut args = Args::new(input);
        let name = args.next().unwrap_or_default().to_lowercase();
        match name.as_str() {
            "setup" => Ok(Self::Setup {
                topic: args.next().unwrap_or(DEFAULT_TOPIC).to_string(),
            }),
            "unlink" => {
                let channel = match args.next() {
                    Some(raw) => Some(parse_channel_ref(raw).ok_or_else(|| {
                        CommandError::BadArgument(format!("Channel \"{raw}\" not found."))
                    })?),
                    None => None,
                };
                Ok(Self::Unlink { channel })
            },
            "spl" => {
                let user = args.user("member")?;
                let level = match args.next() {
                    Some(raw) => raw.parse().map_err(|_| {
                        CommandError::BadArgument(format!(
                            "Converting to \"int\" failed for parameter \"level\": {raw}"
                        ))
                    })?,
                    None => 0,
                };
                Ok(Self::SetLevel { user, level })
            },
            "addmod" => Ok(Self::AddMod {
                user: args.user("member")?,
            }),
            "delmod" => Ok(Self::DelMod {
                user: args.user("member")?,
            }),
            "info" => {
                let raw = args.next().ok_or(CommandError::MissingArgument("message"))?;
                let message = raw.parse().map_err(|_| {
                    CommandError::BadArgument(format!("\"{raw}\" is not a message id."))
                })?;
                Ok(Self::Info { message })
            },
            "announce" => {
                let topic = args.word("topic")?;
                let text = args
                    .remainder()
                    .ok_or(CommandError::MissingArgument("message"))?
                    .to_string();
                Ok(Self::Announce { topic, text })
            },
            "filter" => match args.next().map(str::to_lowercase).as_deref() {
                Some("add") => Ok(Self::FilterAdd {
                    word: args.word("word")?,
                }),
                Some("remove") => Ok(Self::FilterRemove {
                    word: args.word("word")?,
                }),
                Some("list") => Ok(Self::FilterList),
                Some(other) => Err(CommandError::BadArgument(format!(
                    "Unknown filter action \"{other}\"; use add, remove or list."
                ))),
                None => Err(CommandError::MissingArgument("action")),
            },
            "ban" => {
                let user = args.user("member")?;
                let notify_direct = args.peek().is_some_and(|a| a.eq_ignore_ascii_case("dm"));
                if notify_direct {
                    args.next();
                }
                Ok(Self::Ban {
                    user,
                    notify_direct,
                    reason: args.remainder().map(str::to_string),
                })
            },
            "unban" => Ok(Self::Unban {
                user: args.user("member")?,
            }),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Minimum permission level, and whether the guild's "manage server"
    /// permission is accepted instead.
    fn guard(&self) -> (i64, bool) {
        match self {
            Self::Setup { .. } | Self::SetLevel { .. } | Self::Announce { .. } => (100, false),
            Self::Unlink { .. }
            | Self::FilterAdd { .. }
            | Self::FilterRemove { .. }
            | Self::FilterList => (100, true),
            Self::AddMod { .. } | Self::DelMod { .. } | Self::Ban { .. } | Self::Unban { .. } => {
                (50, false)
            },
            Self::Info { .. } => (MODERATOR_LEVEL, false),
        }
    }
}

/// Who ran a command, and where.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    /// The invoker holds the guild's "manage server" permission.
    pub can_manage_guild: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub kind: ReplyKind,
    pub title: Option<String>,
    pub body: String,
}

impl CommandReply {
    pub fn success(body: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Success,
            title: None,
            body: body.into(),
        }
    }

    pub fn titled(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Success,
            title: Some(title.into()),
            body: body.into(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            title: Some(title.into()),
            body: body.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }
}

pub struct AdminCommands {
    db: Arc<dyn Database>,
    engine: Arc<RelayEngine>,
    staff_guild: Option<GuildId>,
}

impl AdminCommands {
    pub fn new(
        db: Arc<dyn Database>,
        engine: Arc<RelayEngine>,
        staff_guild: Option<GuildId>,
    ) -> Self {
        Self {
            db,
            engine,
            staff_guild,
        }
    }

    fn topology(&self) -> &Topology {
        self.engine.topology()
    }

    /// Handle a message that may be a command. `None` when the content is not
    /// a command this bot knows.
    pub async fn run(&self, ctx: &CommandContext, content: &str) -> Option<CommandReply> {
        let input = strip_prefix(content, &self.engine.policy().command_prefixes)?;
        let command = match AdminCommand::parse(input) {
            Ok(command) => command,
            Err(CommandError::Unknown(name)) => {
                debug!(name = %name, "unknown command");
                return None;
            },
            Err(e) => {
                warn!(author_id = ctx.author_id, error = %e, "command rejected");
                return Some(CommandReply::error(e.title(), e.to_string()));
            },
        };

        match self.execute(ctx, &command).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(?command, author_id = ctx.author_id, error = %e, "command failed");
                Some(CommandReply::error("Command failed", e.to_string()))
            },
        }
    }

    pub async fn execute(
        &self,
        ctx: &CommandContext,
        command: &AdminCommand,
    ) -> Result<CommandReply> {
        let author = self.db.user_permission(ctx.author_id).await?;
        let (required, manage_guild_ok) = command.guard();
        if author.level < required && !(manage_guild_ok && ctx.can_manage_guild) {
            return Ok(CommandReply::error(
                "Permission denied",
                format!("You need permission level {required} to use this command."),
            ));
        }

        let db = self.db.as_ref();
        match command {
            AdminCommand::Setup { topic } => {
                self.topology()
                    .link(db, ctx.guild_id, ctx.channel_id, topic)
                    .await?;
                info!(
                    guild_id = ctx.guild_id,
                    channel_id = ctx.channel_id,
                    topic = %topic,
                    "channel linked"
                );
                Ok(CommandReply::success(format!(
                    "Successfully linked <#{}> to cc:#{topic}",
                    ctx.channel_id
                )))
            },
            AdminCommand::Unlink { channel } => {
                let channel = channel.unwrap_or(ctx.channel_id);
                Ok(
                    match self.topology().unlink(db, ctx.guild_id, channel).await? {
                        Some(old) => CommandReply::success(format!(
                            "Successfully unlinked <#{channel}> from cc:#{old}"
                        )),
                        None => CommandReply::success(
                            "This channel isn't linked to any CrossChat channel.",
                        ),
                    },
                )
            },
            AdminCommand::SetLevel { user, level } => self.set_level(*user, *level).await,
            AdminCommand::AddMod { user } => {
                self.change_moderator(ctx, author.level, *user, MODERATOR_LEVEL)
                    .await
            },
            AdminCommand::DelMod { user } => {
                self.change_moderator(ctx, author.level, *user, 0).await
            },
            AdminCommand::Info { message } => Ok(match self.engine.info(*message).await? {
                Some(info) => {
                    let copies = info
                        .sibling_ids
                        .iter()
                        .map(u64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    CommandReply::titled(
                        "Message info",
                        format!(
                            "Original: {} in <#{}> (guild {})\nAuthor: <@{}> ({})\nOther copies: {}\nDeleted: {}",
                            info.anchor_id,
                            info.channel_id,
                            info.guild_id,
                            info.author_id,
                            info.author_id,
                            if copies.is_empty() { "none" } else { copies.as_str() },
                            if info.deleted { "yes" } else { "no" },
                        ),
                    )
                },
                None => CommandReply::success(format!("No relayed message with id {message}.")),
            }),
            AdminCommand::Announce { topic, text } => {
                if self.topology().rooms_for(topic).is_empty() {
                    return Ok(CommandReply::success(format!(
                        "No channels are linked to cc:#{topic}."
                    )));
                }
                let fan_out = self
                    .engine
                    .broadcast(topic, text, BroadcastOrigin {
                        message_id: ctx.message_id,
                        guild_id: ctx.guild_id,
                        channel_id: ctx.channel_id,
                        author_id: ctx.author_id,
                        timestamp: ctx.timestamp,
                    })
                    .await?;
                Ok(CommandReply::success(format!(
                    "Announcement sent to {} channels on cc:#{topic}.",
                    fan_out.destinations()
                )))
            },
            AdminCommand::FilterAdd { word } => {
                let added = self
                    .topology()
                    .add_banned_word(db, ctx.guild_id, word)
                    .await?;
                Ok(CommandReply::success(if added {
                    format!("Added `{word}` to this server's filter.")
                } else {
                    format!("`{word}` is already filtered.")
                }))
            },
            AdminCommand::FilterRemove { word } => {
                let removed = self
                    .topology()
                    .remove_banned_word(db, ctx.guild_id, word)
                    .await?;
                Ok(CommandReply::success(if removed {
                    format!("Removed `{word}` from this server's filter.")
                } else {
                    format!("`{word}` is not on this server's filter.")
                }))
            },
            AdminCommand::FilterList => {
                let filter = self.topology().filters().filter_for(ctx.guild_id);
                let words: Vec<_> = filter.guild_words().collect();
                Ok(CommandReply::success(if words.is_empty() {
                    "This server filters no words beyond the built-in list.".to_string()
                } else {
                    format!("Filtered words: {}", words.join(", "))
                }))
            },
            AdminCommand::Ban {
                user,
                notify_direct,
                reason,
            } => {
                if let Some(refusal) = self.refuse_target(ctx, author.level, *user).await? {
                    return Ok(refusal);
                }
                db.set_user_ban(*user, Some(BanInfo {
                    reason: reason.clone(),
                    notify_direct: *notify_direct,
                }))
                .await?;
                info!(user_id = user, by = ctx.author_id, "user banned");
                Ok(CommandReply::success(match reason {
                    Some(reason) => format!("Banned <@{user}> from CrossChat: {reason}"),
                    None => format!("Banned <@{user}> from CrossChat."),
                }))
            },
            AdminCommand::Unban { user } => {
                db.set_user_ban(*user, None).await?;
                info!(user_id = user, by = ctx.author_id, "user unbanned");
                Ok(CommandReply::success(format!("Unbanned <@{user}>.")))
            },
        }
    }

    async fn set_level(&self, user: UserId, level: i64) -> Result<CommandReply> {
        // Creates the record if the user was never seen.
        self.db.user_permission(user).await?;
        self.db.set_user_permission(user, level).await?;
        info!(user_id = user, level, "permission level set");
        Ok(CommandReply::success(format!(
            "Successfully set permission level for <@{user}> to {level}"
        )))
    }

    async fn change_moderator(
        &self,
        ctx: &CommandContext,
        author_level: i64,
        user: UserId,
        level: i64,
    ) -> Result<CommandReply> {
        if self.staff_guild != Some(ctx.guild_id) {
            return Ok(CommandReply::error(
                "Permission denied",
                "This command can only be used in the staff server.",
            ));
        }
        if let Some(refusal) = self.refuse_target(ctx, author_level, user).await? {
            return Ok(refusal);
        }
        self.set_level(user, level).await
    }

    /// Moderation actions never apply to oneself or to someone ranked at
    /// least as high as the invoker.
    async fn refuse_target(
        &self,
        ctx: &CommandContext,
        author_level: i64,
        user: UserId,
    ) -> Result<Option<CommandReply>> {
        if user == ctx.author_id {
            return Ok(Some(CommandReply::success(
                "You can't perform this action on yourself.",
            )));
        }
        let target = self.db.user_permission(user).await?;
        if target.level >= author_level {
            return Ok(Some(CommandReply::success(
                "You can't perform this action on someone with the same as or higher permission level than you.",
            )));
        }
        Ok(None)
    }
}
