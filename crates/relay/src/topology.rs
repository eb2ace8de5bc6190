//! Room ↔ topic registry.
//!
//! The in-memory view is always derived from persisted guild configs: every
//! mutation writes the config first and then rebuilds. A rebuild assembles the
//! new maps and filters completely before swapping them in, so a failed read
//! leaves the last good view in place.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, RwLock},
};

use {
    crosschat_common::{ChannelId, GuildId},
    tracing::{debug, info},
};

use crate::{
    Result,
    filter::{FilterRegistry, MessageFilter},
    store::{Database, GuildConfig},
};

/// A channel of a guild that takes part in the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Room {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Default)]
struct Maps {
    local: HashMap<ChannelId, (GuildId, String)>,
    topics: HashMap<String, BTreeSet<Room>>,
}

/// Counts reported by [`Topology::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    pub guilds: usize,
    pub rooms: usize,
    pub topics: usize,
}

pub struct Topology {
    maps: RwLock<Maps>,
    filters: Arc<FilterRegistry>,
}

impl Topology {
    pub fn new(filters: Arc<FilterRegistry>) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            filters,
        }
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    /// Reload every guild's bindings and banned words.
    pub async fn rebuild(&self, db: &dyn Database) -> Result<RebuildStats> {
        let configs = db.list_guild_configs().await?;

        let mut maps = Maps::default();
        let mut filters = HashMap::with_capacity(configs.len());
        for (guild_id, config) in &configs {
            for (channel_id, topic) in &config.channels {
                maps.local.insert(*channel_id, (*guild_id, topic.clone()));
                maps.topics.entry(topic.clone()).or_default().insert(Room {
                    guild_id: *guild_id,
                    channel_id: *channel_id,
                });
            }
            if !config.banned_words.is_empty() {
                filters.insert(*guild_id, self.filters.build(&config.banned_words));
            }
        }

        let stats = RebuildStats {
            guilds: configs.len(),
            rooms: maps.local.len(),
            topics: maps.topics.len(),
        };

        *self.maps.write().unwrap_or_else(|e| e.into_inner()) = maps;
        self.filters.replace_all(filters);

        info!(
            guilds = stats.guilds,
            rooms = stats.rooms,
            topics = stats.topics,
            "topology rebuilt"
        );
        Ok(stats)
    }

    /// Member rooms of a topic, ordered; empty when nobody joined it.
    pub fn rooms_for(&self, topic: &str) -> Vec<Room> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.topics
            .get(topic)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn topic_for(&self, channel_id: ChannelId) -> Option<String> {
        self.room(channel_id).map(|(_, topic)| topic)
    }

    /// The room a channel belongs to, with its topic.
    pub fn room(&self, channel_id: ChannelId) -> Option<(Room, String)> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.local.get(&channel_id).map(|(guild_id, topic)| {
            (
                Room {
                    guild_id: *guild_id,
                    channel_id,
                },
                topic.clone(),
            )
        })
    }

    /// Bind a channel to `topic`. Returns the topic it was bound to before.
    pub async fn link(
        &self,
        db: &dyn Database,
        guild_id: GuildId,
        channel_id: ChannelId,
        topic: &str,
    ) -> Result<Option<String>> {
        let previous = self
            .update(db, guild_id, |config| {
                config.channels.insert(channel_id, topic.to_string())
            })
            .await?;
        debug!(guild_id, channel_id, topic, ?previous, "room linked");
        Ok(previous)
    }

    /// Remove a channel from the relay. Returns its former topic.
    pub async fn unlink(
        &self,
        db: &dyn Database,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<String>> {
        let config = db.guild_config(guild_id).await?;
        if !config.channels.contains_key(&channel_id) {
            return Ok(None);
        }
        let previous = self
            .update(db, guild_id, |config| config.channels.remove(&channel_id))
            .await?;
        debug!(guild_id, channel_id, ?previous, "room unlinked");
        Ok(previous)
    }

    /// Add a banned word for a guild. `false` if it was already filtered or is
    /// not a word at all.
    pub async fn add_banned_word(
        &self,
        db: &dyn Database,
        guild_id: GuildId,
        word: &str,
    ) -> Result<bool> {
        self.edit_words(db, guild_id, |filter| filter.add(word)).await
    }

    /// Remove a guild's banned word. Baseline words are never removed.
    pub async fn remove_banned_word(
        &self,
        db: &dyn Database,
        guild_id: GuildId,
        word: &str,
    ) -> Result<bool> {
        self.edit_words(db, guild_id, |filter| filter.remove(word)).await
    }

    async fn edit_words<F>(&self, db: &dyn Database, guild_id: GuildId, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut MessageFilter) -> bool,
    {
        let mut config = db.guild_config(guild_id).await?;
        let mut filter = self.filters.build(&config.banned_words);
        if !edit(&mut filter) {
            return Ok(false);
        }
        config.banned_words = filter.guild_words().map(str::to_string).collect();
        db.update_guild_config(guild_id, &config).await?;
        self.rebuild(db).await?;
        Ok(true)
    }

    async fn update<T, F>(&self, db: &dyn Database, guild_id: GuildId, edit: F) -> Result<T>
    where
        F: FnOnce(&mut GuildConfig) -> T,
    {
        let mut config = db.guild_config(guild_id).await?;
        let out = edit(&mut config);
        db.update_guild_config(guild_id, &config).await?;
        self.rebuild(db).await?;
        Ok(out)
    }
}
