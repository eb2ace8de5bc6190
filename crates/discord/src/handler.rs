//! Discord event handler for serenity.
//!
//! Routes gateway events into the relay engine and the admin commands.

use std::sync::{Arc, OnceLock};

use {
    crosschat_relay::{
        RelayEngine, RelayOutcome,
        commands::{AdminCommands, CommandContext, CommandReply},
    },
    serenity::{
        all::{
            ChannelId, Context, CreateMessage, EventHandler, GatewayIntents, GuildId, Message,
            MessageId, MessageUpdateEvent, Ready,
        },
        async_trait,
    },
    tracing::{debug, info, trace, warn},
};

use crate::convert::{self, reply_embed};

struct Wiring {
    engine: Arc<RelayEngine>,
    commands: Arc<AdminCommands>,
}

/// Handler for Discord gateway events.
///
/// The engine is attached once the client exists, because its outbound side
/// needs the client's HTTP handle and cache. Events seen before
/// [`RelayHandler::attach`] are dropped.
pub struct RelayHandler {
    wiring: OnceLock<Wiring>,
    log_channel: Option<u64>,
}

impl RelayHandler {
    pub fn new(log_channel: Option<u64>) -> Self {
        Self {
            wiring: OnceLock::new(),
            log_channel,
        }
    }

    /// Returns `false` if an engine was already attached.
    pub fn attach(&self, engine: Arc<RelayEngine>, commands: Arc<AdminCommands>) -> bool {
        self.wiring.set(Wiring { engine, commands }).is_ok()
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    fn wiring(&self) -> Option<&Wiring> {
        let wiring = self.wiring.get();
        if wiring.is_none() {
            debug!("event received before the relay engine was attached");
        }
        wiring
    }

    async fn run_command(&self, wiring: &Wiring, ctx: &Context, msg: &Message) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let can_manage_guild = msg
            .author_permissions(&ctx.cache)
            .is_some_and(|p| p.manage_guild());
        let command_ctx = CommandContext {
            guild_id: guild_id.get(),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            can_manage_guild,
            timestamp: msg.timestamp.unix_timestamp(),
        };

        let Some(reply) = wiring.commands.run(&command_ctx, &msg.content).await else {
            return;
        };
        let neutral = wiring.engine.policy().neutral_color;
        send_reply(ctx, msg, &reply, neutral).await;
        if reply.is_error() {
            self.report_failure(ctx, msg, &reply, neutral).await;
        }
    }

    async fn report_failure(
        &self,
        ctx: &Context,
        msg: &Message,
        reply: &CommandReply,
        neutral: u32,
    ) {
        let Some(log_channel) = self.log_channel else {
            return;
        };
        let report = CommandReply::error(
            reply.title.clone().unwrap_or_default(),
            format!(
                "{}\n\nCommand: `{}`\nBy: <@{}> in <#{}>",
                reply.body, msg.content, msg.author.id, msg.channel_id
            ),
        );
        let builder = CreateMessage::new().embed(reply_embed(&report, neutral));
        if let Err(e) = ChannelId::new(log_channel)
            .send_message(&ctx.http, builder)
            .await
        {
            warn!(log_channel, error = %e, "failed to report command failure");
        }
    }
}

async fn send_reply(ctx: &Context, msg: &Message, reply: &CommandReply, neutral: u32) {
    let builder = if reply.title.is_some() {
        CreateMessage::new().embed(reply_embed(reply, neutral))
    } else {
        CreateMessage::new().content(&reply.body)
    };
    if let Err(e) = msg
        .channel_id
        .send_message(&ctx.http, builder.reference_message(msg))
        .await
    {
        warn!(channel_id = %msg.channel_id, error = %e, "failed to send command reply");
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages, including our own relayed copies.
        if msg.author.bot {
            return;
        }
        let Some(wiring) = self.wiring() else {
            return;
        };
        if wiring.engine.is_command(&msg.content) {
            self.run_command(wiring, &ctx, &msg).await;
            return;
        }

        let inbound = convert::inbound(&ctx.cache, &msg);
        match wiring.engine.handle_message(&inbound).await {
            Ok(RelayOutcome::Dispatched(fan_out)) => debug!(
                correlation_id = fan_out.correlation_id,
                destinations = fan_out.destinations(),
                "message relayed"
            ),
            Ok(outcome) => trace!(message_id = %msg.id, ?outcome, "message not relayed"),
            Err(e) => warn!(message_id = %msg.id, error = %e, "relay failed"),
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        _channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let Some(wiring) = self.wiring() else {
            return;
        };
        match wiring.engine.handle_delete(deleted_message_id.get()).await {
            Ok(Some(report)) => debug!(
                anchor = report.anchor,
                copies = report.edited.len(),
                "deletion cascaded"
            ),
            Ok(None) => {},
            Err(e) => warn!(message_id = %deleted_message_id, error = %e, "delete cascade failed"),
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if event.author.as_ref().is_some_and(|a| a.bot) {
            return;
        }
        let Some(edit) = convert::edit(&event) else {
            return;
        };
        let Some(wiring) = self.wiring() else {
            return;
        };
        match wiring.engine.handle_edit(&edit).await {
            Ok(edited) if !edited.is_empty() => {
                debug!(message_id = %event.id, copies = edited.len(), "edit propagated")
            },
            Ok(_) => {},
            Err(e) => warn!(message_id = %event.id, error = %e, "edit propagation failed"),
        }
    }
}
