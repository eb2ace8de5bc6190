//! The relay state machine: ignore, ban, rate and filter checks, fan-out to
//! every room of a topic, and the delete/edit cascades over delivered copies.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {
    crosschat_common::{ChannelId, GuildId, MessageId, UserId},
    crosschat_config::{DiscordConfig, FilterAction, RelayConfig},
    futures::future::join_all,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    badge::{BypassPolicy, SYSTEM_BADGE, badge_for, representative_color},
    commands::strip_prefix,
    emoji::fix_emojis,
    message::{Envelope, InboundMessage, MentionedUser, MessageEdit},
    outbound::{EmojiDirectory, NoticeTarget, RelayOutbound},
    ratelimit::{RateCheck, RateLimiter},
    sanitize::sanitize_mentions,
    store::{CorrelationStore, Database, DeliveredMessage},
    topology::Topology,
};

/// Tunables of the relay, resolved from configuration once at startup.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    pub command_prefixes: Vec<String>,
    pub bypass: BypassPolicy,
    pub ban_delete_delay: Duration,
    pub origin_delete_delay: Duration,
    pub deleted_placeholder: String,
    pub filter_action: FilterAction,
    pub neutral_color: u32,
    pub system_name: String,
}

impl RelayPolicy {
    pub fn from_config(discord: &DiscordConfig, relay: &RelayConfig) -> Self {
        Self {
            command_prefixes: discord.command_prefixes.clone(),
            bypass: BypassPolicy {
                staff_threshold: relay.staff_threshold,
                staff_topic: relay.staff_topic.clone(),
            },
            ban_delete_delay: Duration::from_millis(relay.ban_delete_delay_ms),
            origin_delete_delay: Duration::from_millis(relay.origin_delete_delay_ms),
            deleted_placeholder: relay.deleted_placeholder.clone(),
            filter_action: relay.filter_action,
            neutral_color: relay.neutral_color,
            system_name: relay.system_name.clone(),
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::from_config(&DiscordConfig::default(), &RelayConfig::default())
    }
}

/// Long-lived collaborators shared by the engine and the admin commands.
#[derive(Clone)]
pub struct RelayServices {
    pub db: Arc<dyn Database>,
    pub store: Arc<dyn CorrelationStore>,
    pub outbound: Arc<dyn RelayOutbound>,
    pub emojis: Arc<dyn EmojiDirectory>,
    pub topology: Arc<Topology>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Bots, webhooks and system accounts.
    NotHuman,
    /// Direct messages and other events without a guild.
    NoGuild,
    UnlinkedRoom,
    Command,
}

/// Copies scheduled for one relayed message.
///
/// Each destination is delivered by its own task; the caller may drop this
/// and let the tasks finish on their own, or [`join`](Self::join) them.
#[derive(Debug)]
pub struct FanOut {
    pub correlation_id: MessageId,
    deliveries: Vec<JoinHandle<Option<DeliveredMessage>>>,
    origin_removal: Option<JoinHandle<()>>,
}

impl FanOut {
    pub fn destinations(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait for every delivery and the origin removal; returns the copies
    /// that were sent and recorded.
    pub async fn join(self) -> Vec<DeliveredMessage> {
        let delivered = join_all(self.deliveries)
            .await
            .into_iter()
            .filter_map(|res| res.ok().flatten())
            .collect();
        if let Some(removal) = self.origin_removal {
            let _ = removal.await;
        }
        delivered
    }
}

#[derive(Debug)]
pub enum RelayOutcome {
    Ignored(IgnoreReason),
    /// The sender is banned; the original is removed by `removal`.
    Banned { removal: JoinHandle<()> },
    RateLimited(Duration),
    /// Silenced by the filter; carries the matched words.
    Blocked(Vec<String>),
    Dispatched(FanOut),
}

/// Copies rewritten to the placeholder by a delete cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub anchor: MessageId,
    pub edited: Vec<MessageId>,
}

/// Moderation view of a correlation group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub anchor_id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    /// Every copy of the group except the anchor and the queried message.
    pub sibling_ids: Vec<MessageId>,
    /// Whether the queried message was deleted.
    pub deleted: bool,
}

/// Where an announcement was issued from; its id becomes the group anchor.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastOrigin {
    pub message_id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub timestamp: i64,
}

pub struct RelayEngine {
    db: Arc<dyn Database>,
    store: Arc<dyn CorrelationStore>,
    outbound: Arc<dyn RelayOutbound>,
    emojis: Arc<dyn EmojiDirectory>,
    topology: Arc<Topology>,
    limiter: RateLimiter,
    policy: RelayPolicy,
    /// Messages the relay deleted itself; their deletion events are not
    /// cascaded.
    self_deleted: Arc<Mutex<SelfDeletes>>,
}

/// How long after its scheduled removal a self-deleted id is remembered.
/// Covers deletion events the gateway never delivers.
const SELF_DELETE_GRACE: Duration = Duration::from_secs(600);

/// Ids the relay is about to delete, each with the instant it is forgotten.
#[derive(Debug, Default)]
struct SelfDeletes {
    ids: HashMap<MessageId, Instant>,
}

impl SelfDeletes {
    fn claim(&mut self, message_id: MessageId, delay: Duration, now: Instant) {
        self.ids.retain(|_, expires| *expires >= now);
        self.ids.insert(message_id, now + delay + SELF_DELETE_GRACE);
    }

    fn take(&mut self, message_id: MessageId) -> bool {
        self.ids.remove(&message_id).is_some()
    }
}

impl RelayEngine {
    pub fn new(services: RelayServices, limiter: RateLimiter, policy: RelayPolicy) -> Self {
        Self {
            db: services.db,
            store: services.store,
            outbound: services.outbound,
            emojis: services.emojis,
            topology: services.topology,
            limiter,
            policy,
            self_deleted: Arc::new(Mutex::new(SelfDeletes::default())),
        }
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn is_command(&self, content: &str) -> bool {
        strip_prefix(content, &self.policy.command_prefixes).is_some()
    }

    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<RelayOutcome> {
        if msg.author.is_bot || msg.author.is_system {
            return Ok(RelayOutcome::Ignored(IgnoreReason::NotHuman));
        }
        if msg.guild_id.is_none() {
            return Ok(RelayOutcome::Ignored(IgnoreReason::NoGuild));
        }
        let Some((room, topic)) = self.topology.room(msg.channel_id) else {
            return Ok(RelayOutcome::Ignored(IgnoreReason::UnlinkedRoom));
        };
        if self.is_command(&msg.content) {
            return Ok(RelayOutcome::Ignored(IgnoreReason::Command));
        }

        let author_id = msg.author.id;
        let standing = self.db.user_permission(author_id).await?;

        if let Some(ban) = &standing.ban {
            info!(
                user_id = author_id,
                channel_id = msg.channel_id,
                "dropping message from banned user"
            );
            let removal =
                self.spawn_removal(msg.channel_id, msg.id, self.policy.ban_delete_delay);
            let target = if ban.notify_direct {
                NoticeTarget::Direct { user_id: author_id }
            } else {
                NoticeTarget::Channel {
                    channel_id: msg.channel_id,
                    user_id: author_id,
                }
            };
            let text = match &ban.reason {
                Some(reason) => format!("You are banned from CrossChat. Reason: {reason}"),
                None => "You are banned from CrossChat.".to_string(),
            };
            self.notify(&target, &text).await;
            return Ok(RelayOutcome::Banned { removal });
        }

        let bypass = self.policy.bypass.bypasses(standing.level, &topic);
        let filtered = self
            .topology
            .filters()
            .apply(room.guild_id, &self.render(&msg.content, &msg.mentions));
        if filtered.changed && !bypass && self.policy.filter_action == FilterAction::Block {
            info!(user_id = author_id, matched = ?filtered.matched, "message blocked by filter");
            self.remove_now(msg.channel_id, msg.id).await;
            self.notify(
                &channel_notice(msg.channel_id, author_id),
                "Your message was not relayed because it contains filtered words.",
            )
            .await;
            return Ok(RelayOutcome::Blocked(filtered.matched));
        }

        // Blocked messages never reach the limiter.
        if !bypass && let RateCheck::Cooldown(wait) = self.limiter.check(author_id, &topic) {
            debug!(user_id = author_id, topic = %topic, ?wait, "rate limited");
            self.remove_now(msg.channel_id, msg.id).await;
            let text = format!(
                "Slow down! You can send another message in cc:#{topic} in {:.2}s.",
                RateCheck::Cooldown(wait).remaining_secs()
            );
            self.notify(&channel_notice(msg.channel_id, author_id), &text)
                .await;
            return Ok(RelayOutcome::RateLimited(wait));
        }

        let badge = badge_for(standing.level);
        let envelope = Envelope {
            author_name: msg.author.name.clone(),
            author_avatar: msg.author.avatar_url.clone(),
            badge: badge.glyph.to_string(),
            rank: badge.rank.to_string(),
            color: representative_color(&msg.author.roles, self.policy.neutral_color),
            content: with_attachments(filtered.text, &msg.attachments),
            origin_guild: msg.guild_name.clone(),
            topic,
            timestamp: msg.timestamp,
        };

        self.store
            .record_delivery(&DeliveredMessage {
                id: msg.id,
                correlation_id: None,
                guild_id: room.guild_id,
                channel_id: msg.channel_id,
                author_id,
                content: msg.content.clone(),
                deleted: false,
            })
            .await?;

        let deliveries = self.fan_out(msg.id, Some(room.guild_id), author_id, envelope);
        let origin_removal =
            self.spawn_removal(msg.channel_id, msg.id, self.policy.origin_delete_delay);

        Ok(RelayOutcome::Dispatched(FanOut {
            correlation_id: msg.id,
            deliveries,
            origin_removal: Some(origin_removal),
        }))
    }

    /// Announce `content` to every room of `topic` under the system identity.
    pub async fn broadcast(
        &self,
        topic: &str,
        content: &str,
        origin: BroadcastOrigin,
    ) -> Result<FanOut> {
        let envelope = Envelope {
            author_name: self.policy.system_name.clone(),
            author_avatar: None,
            badge: SYSTEM_BADGE.glyph.to_string(),
            rank: SYSTEM_BADGE.rank.to_string(),
            color: self.policy.neutral_color,
            content: self.render(content, &[]),
            origin_guild: None,
            topic: topic.to_string(),
            timestamp: origin.timestamp,
        };

        self.store
            .record_delivery(&DeliveredMessage {
                id: origin.message_id,
                correlation_id: None,
                guild_id: origin.guild_id,
                channel_id: origin.channel_id,
                author_id: origin.author_id,
                content: content.to_string(),
                deleted: false,
            })
            .await?;

        let deliveries = self.fan_out(origin.message_id, None, origin.author_id, envelope);
        info!(topic, rooms = deliveries.len(), "announcement dispatched");
        Ok(FanOut {
            correlation_id: origin.message_id,
            deliveries,
            origin_removal: None,
        })
    }

    /// React to a deleted message.
    ///
    /// Deleting an anchor, or the copy in the anchor's own room, rewrites all
    /// other copies to the placeholder. Deleting any other copy only flags its
    /// record. Repeated deletions find everything already flagged and do
    /// nothing.
    pub async fn handle_delete(&self, message_id: MessageId) -> Result<Option<CascadeReport>> {
        if self.consume_self_delete(message_id) {
            debug!(message_id, "ignoring deletion issued by the relay");
            return Ok(None);
        }
        let Some(record) = self.store.delivery(message_id).await? else {
            return Ok(None);
        };
        let placeholder = &self.policy.deleted_placeholder;

        if !self.store.mark_deleted(record.id, placeholder).await? {
            return Ok(None);
        }
        if record.is_anchor() {
            return self.cascade(record.id, record.id).await.map(Some);
        }

        let anchor_id = record.anchor_id();
        match self.store.delivery(anchor_id).await? {
            Some(anchor) if anchor.channel_id == record.channel_id => {
                self.store.mark_deleted(anchor.id, placeholder).await?;
                self.cascade(anchor.id, record.id).await.map(Some)
            },
            _ => {
                debug!(message_id, anchor_id, "relayed copy deleted");
                Ok(None)
            },
        }
    }

    async fn cascade(&self, anchor: MessageId, exclude: MessageId) -> Result<CascadeReport> {
        let placeholder = self.policy.deleted_placeholder.as_str();
        let mut claimed = Vec::new();
        for sibling in self.store.siblings(anchor).await? {
            if sibling.deleted || sibling.id == exclude {
                continue;
            }
            if self.store.mark_deleted(sibling.id, placeholder).await? {
                claimed.push(sibling);
            }
        }

        let edits = claimed.iter().map(|copy| async move {
            match self
                .outbound
                .replace_with_placeholder(copy.channel_id, copy.id, placeholder)
                .await
            {
                Ok(()) => Some(copy.id),
                Err(e) => {
                    warn!(
                        channel_id = copy.channel_id,
                        message_id = copy.id,
                        error = %e,
                        "failed to retract relayed copy"
                    );
                    None
                },
            }
        });
        let edited: Vec<_> = join_all(edits).await.into_iter().flatten().collect();
        info!(anchor, copies = edited.len(), "delete cascaded");
        Ok(CascadeReport { anchor, edited })
    }

    /// Propagate an edit of a still-live anchor to its copies. Returns the ids
    /// of the copies that were rewritten.
    ///
    /// Edits whose text is a command are never relayed; this covers the
    /// command message that anchors an announcement.
    pub async fn handle_edit(&self, edit: &MessageEdit) -> Result<Vec<MessageId>> {
        if self.is_command(&edit.content) {
            debug!(message_id = edit.id, "ignoring edit of a command message");
            return Ok(Vec::new());
        }
        let Some(anchor) = self.store.delivery(edit.id).await? else {
            return Ok(Vec::new());
        };
        if !anchor.is_anchor() || anchor.deleted {
            return Ok(Vec::new());
        }

        let filters = self.topology.filters();
        let body = filters
            .apply(anchor.guild_id, &self.render(&edit.content, &edit.mentions))
            .text;
        let content = with_attachments(body, &edit.attachments);
        self.store.update_content(anchor.id, &edit.content).await?;

        let siblings = self.store.siblings(anchor.id).await?;
        let edits = siblings.iter().filter(|s| !s.deleted).map(|copy| {
            let text = if copy.guild_id == anchor.guild_id {
                content.clone()
            } else {
                filters.apply(copy.guild_id, &content).text
            };
            async move {
                if let Err(e) = self
                    .outbound
                    .edit_envelope(copy.channel_id, copy.id, &text)
                    .await
                {
                    warn!(
                        channel_id = copy.channel_id,
                        message_id = copy.id,
                        error = %e,
                        "failed to edit relayed copy"
                    );
                    return None;
                }
                if let Err(e) = self.store.update_content(copy.id, &text).await {
                    warn!(message_id = copy.id, error = %e, "failed to store edited copy");
                }
                Some(copy.id)
            }
        });
        Ok(join_all(edits).await.into_iter().flatten().collect())
    }

    /// Look up the correlation group of any message of it.
    pub async fn info(&self, message_id: MessageId) -> Result<Option<MessageInfo>> {
        let Some(record) = self.store.delivery(message_id).await? else {
            return Ok(None);
        };
        let anchor_id = record.anchor_id();
        let anchor = if record.is_anchor() {
            record.clone()
        } else {
            match self.store.delivery(anchor_id).await? {
                Some(anchor) => anchor,
                None => return Ok(None),
            }
        };

        let sibling_ids = self
            .store
            .siblings(anchor_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| *id != anchor_id && *id != message_id)
            .collect();

        Ok(Some(MessageInfo {
            anchor_id,
            guild_id: anchor.guild_id,
            channel_id: anchor.channel_id,
            author_id: anchor.author_id,
            sibling_ids,
            deleted: record.deleted,
        }))
    }

    fn render(&self, content: &str, mentions: &[MentionedUser]) -> String {
        fix_emojis(&sanitize_mentions(content, mentions), self.emojis.as_ref())
    }

    fn fan_out(
        &self,
        anchor: MessageId,
        origin_guild: Option<GuildId>,
        author_id: UserId,
        envelope: Envelope,
    ) -> Vec<JoinHandle<Option<DeliveredMessage>>> {
        let filters = self.topology.filters();
        self.topology
            .rooms_for(&envelope.topic)
            .into_iter()
            .map(|room| {
                let mut envelope = envelope.clone();
                if origin_guild != Some(room.guild_id) {
                    envelope.content = filters.apply(room.guild_id, &envelope.content).text;
                }
                let outbound = Arc::clone(&self.outbound);
                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    let id = match outbound.send_envelope(room.channel_id, &envelope).await {
                        Ok(id) => id,
                        Err(e) => {
                            warn!(
                                guild_id = room.guild_id,
                                channel_id = room.channel_id,
                                anchor,
                                error = %e,
                                "relay delivery failed"
                            );
                            return None;
                        },
                    };
                    let copy = DeliveredMessage {
                        id,
                        correlation_id: Some(anchor),
                        guild_id: room.guild_id,
                        channel_id: room.channel_id,
                        author_id,
                        content: envelope.content,
                        deleted: false,
                    };
                    if let Err(e) = store.record_delivery(&copy).await {
                        warn!(message_id = id, anchor, error = %e, "failed to record relayed copy");
                        return None;
                    }
                    Some(copy)
                })
            })
            .collect()
    }

    fn claim_self_delete(&self, message_id: MessageId, delay: Duration) {
        self.self_deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .claim(message_id, delay, Instant::now());
    }

    fn consume_self_delete(&self, message_id: MessageId) -> bool {
        self.self_deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take(message_id)
    }

    fn spawn_removal(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        delay: Duration,
    ) -> JoinHandle<()> {
        self.claim_self_delete(message_id, delay);
        let outbound = Arc::clone(&self.outbound);
        let self_deleted = Arc::clone(&self.self_deleted);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = outbound.delete_message(channel_id, message_id).await {
                self_deleted
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take(message_id);
                warn!(channel_id, message_id, error = %e, "failed to remove original message");
            }
        })
    }

    async fn remove_now(&self, channel_id: ChannelId, message_id: MessageId) {
        self.claim_self_delete(message_id, Duration::ZERO);
        if let Err(e) = self.outbound.delete_message(channel_id, message_id).await {
            self.consume_self_delete(message_id);
            warn!(channel_id, message_id, error = %e, "failed to remove message");
        }
    }

    async fn notify(&self, target: &NoticeTarget, text: &str) {
        if let Err(e) = self.outbound.send_notice(target, text).await {
            warn!(?target, error = %e, "failed to send notice");
        }
    }
}

fn channel_notice(channel_id: ChannelId, user_id: UserId) -> NoticeTarget {
    NoticeTarget::Channel {
        channel_id,
        user_id,
    }
}

fn with_attachments(mut content: String, attachments: &[String]) -> String {
    for url in attachments {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(url);
    }
    content
}
