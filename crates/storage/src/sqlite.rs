use {
    async_trait::async_trait,
    crosschat_common::{GuildId, MessageId, UserId},
    crosschat_relay::{
        Error, Result,
        store::{BanInfo, CorrelationStore, Database, DeliveredMessage, GuildConfig, UserPermission},
    },
    sqlx::SqlitePool,
    tracing::trace,
};

// Snowflakes stay below 2^63, so they round-trip through SQLite's signed
// INTEGER unchanged.
fn to_db(id: u64) -> i64 {
    id as i64
}

fn from_db(id: i64) -> u64 {
    id as u64
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::storage(context, e)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    permissions: i64,
    banned: bool,
    ban_reason: Option<String>,
    ban_notify_dm: bool,
}

impl From<UserRow> for UserPermission {
    fn from(r: UserRow) -> Self {
        Self {
            id: from_db(r.id),
            level: r.permissions,
            ban: r.banned.then_some(BanInfo {
                reason: r.ban_reason,
                notify_direct: r.ban_notify_dm,
            }),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    correlation_id: Option<i64>,
    guild_id: i64,
    channel_id: i64,
    author_id: i64,
    content: String,
    deleted: bool,
}

impl From<MessageRow> for DeliveredMessage {
    fn from(r: MessageRow) -> Self {
        Self {
            id: from_db(r.id),
            correlation_id: r.correlation_id.map(from_db),
            guild_id: from_db(r.guild_id),
            channel_id: from_db(r.channel_id),
            author_id: from_db(r.author_id),
            content: r.content,
            deleted: r.deleted,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "id, correlation_id, guild_id, channel_id, author_id, content, deleted";

/// SQLite-backed guild, user and message store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for SqliteStore {
    async fn guild_config(&self, guild_id: GuildId) -> Result<GuildConfig> {
        let raw: Option<String> = sqlx::query_scalar("SELECT config FROM guilds WHERE id = ?")
            .bind(to_db(guild_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("load guild config"))?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(GuildConfig::default()),
        }
    }

    async fn update_guild_config(&self, guild_id: GuildId, config: &GuildConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        sqlx::query(
            r#"INSERT INTO guilds (id, config, created_at)
               VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET config = excluded.config"#,
        )
        .bind(to_db(guild_id))
        .bind(&json)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(db_err("store guild config"))?;
        trace!(guild_id, "guild config stored");
        Ok(())
    }

    async fn list_guild_configs(&self) -> Result<Vec<(GuildId, GuildConfig)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, config FROM guilds ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list guild configs"))?;
        rows.into_iter()
            .map(|(id, raw)| -> Result<_> { Ok((from_db(id), serde_json::from_str(&raw)?)) })
            .collect()
    }

    async fn user_permission(&self, user_id: UserId) -> Result<UserPermission> {
        sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)")
            .bind(to_db(user_id))
            .bind(now())
            .execute(&self.pool)
            .await
            .map_err(db_err("create user"))?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, permissions, banned, ban_reason, ban_notify_dm FROM users WHERE id = ?",
        )
        .bind(to_db(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("load user"))?;
        Ok(row.into())
    }

    async fn set_user_permission(&self, user_id: UserId, level: i64) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, permissions, created_at)
               VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET permissions = excluded.permissions"#,
        )
        .bind(to_db(user_id))
        .bind(level)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(db_err("set permission level"))?;
        Ok(())
    }

    async fn set_user_ban(&self, user_id: UserId, ban: Option<BanInfo>) -> Result<()> {
        let (banned, reason, notify_dm) = match ban {
            Some(ban) => (true, ban.reason, ban.notify_direct),
            None => (false, None, false),
        };
        sqlx::query(
            r#"INSERT INTO users (id, banned, ban_reason, ban_notify_dm, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 banned = excluded.banned,
                 ban_reason = excluded.ban_reason,
                 ban_notify_dm = excluded.ban_notify_dm"#,
        )
        .bind(to_db(user_id))
        .bind(banned)
        .bind(reason)
        .bind(notify_dm)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(db_err("set ban"))?;
        Ok(())
    }
}

#[async_trait]
impl CorrelationStore for SqliteStore {
    async fn record_delivery(&self, message: &DeliveredMessage) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO messages
                 (id, correlation_id, guild_id, channel_id, author_id, content, deleted, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(to_db(message.id))
        .bind(message.correlation_id.map(to_db))
        .bind(to_db(message.guild_id))
        .bind(to_db(message.channel_id))
        .bind(to_db(message.author_id))
        .bind(&message.content)
        .bind(message.deleted)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(db_err("record delivery"))?;
        Ok(())
    }

    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveredMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(to_db(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("load delivery"))?;
        Ok(row.map(Into::into))
    }

    async fn siblings(&self, correlation_id: MessageId) -> Result<Vec<DeliveredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE correlation_id = ? ORDER BY id"
        ))
        .bind(to_db(correlation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("load siblings"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_deleted(&self, id: MessageId, placeholder: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE messages SET deleted = 1, content = ? WHERE id = ? AND deleted = 0")
                .bind(placeholder)
                .bind(to_db(id))
                .execute(&self.pool)
                .await
                .map_err(db_err("mark deleted"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_content(&self, id: MessageId, content: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET content = ? WHERE id = ?")
            .bind(content)
            .bind(to_db(id))
            .execute(&self.pool)
            .await
            .map_err(db_err("update content"))?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::run_migrations, sqlx::sqlite::SqlitePoolOptions};

    async fn store() -> SqliteStore {
        // One connection: every new connection to :memory: is a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(
        id: MessageId,
        correlation_id: Option<MessageId>,
        channel_id: u64,
    ) -> DeliveredMessage {
        DeliveredMessage {
            id,
            correlation_id,
            guild_id: channel_id / 100,
            channel_id,
            author_id: 7,
            content: "hello".into(),
            deleted: false,
        }
    }

    #[tokio::test]
    async fn guild_config_round_trip() {
        let store = store().await;
        assert_eq!(store.guild_config(1).await.unwrap(), GuildConfig::default());

        let mut config = GuildConfig::default();
        config.channels.insert(101, "general".into());
        config.banned_words.push("heck".into());
        store.update_guild_config(1, &config).await.unwrap();
        assert_eq!(store.guild_config(1).await.unwrap(), config);

        config.channels.clear();
        store.update_guild_config(1, &config).await.unwrap();
        store.update_guild_config(2, &GuildConfig::default()).await.unwrap();

        let all = store.list_guild_configs().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, 1);
        assert!(all[0].1.channels.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_created_at_level_zero() {
        let store = store().await;
        let user = store.user_permission(42).await.unwrap();
        assert_eq!(user, UserPermission::new(42));

        store.set_user_permission(42, 100).await.unwrap();
        assert_eq!(store.user_permission(42).await.unwrap().level, 100);
    }

    #[tokio::test]
    async fn ban_round_trip() {
        let store = store().await;
        store.set_user_permission(42, 5).await.unwrap();
        let ban = BanInfo {
            reason: Some("spam".into()),
            notify_direct: true,
        };
        store.set_user_ban(42, Some(ban.clone())).await.unwrap();

        let user = store.user_permission(42).await.unwrap();
        assert_eq!(user.ban, Some(ban));
        assert_eq!(user.level, 5);

        store.set_user_ban(42, None).await.unwrap();
        assert!(!store.user_permission(42).await.unwrap().is_banned());
    }

    #[tokio::test]
    async fn siblings_exclude_the_anchor() {
        let store = store().await;
        store.record_delivery(&record(1, None, 101)).await.unwrap();
        for (id, channel) in [(11, 101), (12, 202), (13, 303)] {
            store.record_delivery(&record(id, Some(1), channel)).await.unwrap();
        }
        store.record_delivery(&record(21, Some(2), 101)).await.unwrap();

        let siblings = store.siblings(1).await.unwrap();
        assert_eq!(siblings.iter().map(|s| s.id).collect::<Vec<_>>(), vec![11, 12, 13]);
        assert_eq!(store.delivery(1).await.unwrap().unwrap().correlation_id, None);
        assert_eq!(store.delivery(12).await.unwrap().unwrap().guild_id, 2);
        assert!(store.delivery(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_deleted_claims_once() {
        let store = store().await;
        store.record_delivery(&record(11, Some(1), 101)).await.unwrap();

        assert!(store.mark_deleted(11, "gone").await.unwrap());
        assert!(!store.mark_deleted(11, "gone").await.unwrap());
        assert!(!store.mark_deleted(99, "gone").await.unwrap());

        let copy = store.delivery(11).await.unwrap().unwrap();
        assert!(copy.deleted);
        assert_eq!(copy.content, "gone");
    }

    #[tokio::test]
    async fn large_snowflakes_survive() {
        let store = store().await;
        let id = 1_234_567_890_123_456_789;
        store.record_delivery(&record(id, None, 101)).await.unwrap();
        store.update_content(id, "edited").await.unwrap();
        let got = store.delivery(id).await.unwrap().unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.content, "edited");
    }
}
