//! Wires storage, the relay engine and the Discord client together.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    anyhow::bail,
    crosschat_config::CrossChatConfig,
    crosschat_discord::{DiscordOutbound, RelayHandler},
    crosschat_relay::{
        RelayEngine, RelayPolicy, RelayServices, Topology,
        commands::AdminCommands,
        filter::{FilterRegistry, builtin_baseline, normalize_word},
        ratelimit::RateLimiter,
    },
    crosschat_storage::SqliteStore,
    secrecy::ExposeSecret,
    serenity::Client,
    tracing::{info, warn},
};

fn baseline(extra: &[String]) -> BTreeSet<String> {
    let mut words = builtin_baseline();
    words.extend(
        extra
            .iter()
            .map(|w| normalize_word(w))
            .filter(|w| !w.is_empty()),
    );
    words
}

pub async fn run(config: CrossChatConfig) -> anyhow::Result<()> {
    let token = config.discord.token.expose_secret();
    if token.is_empty() {
        bail!("discord.token is not set; add it to crosschat.toml or use ${{DISCORD_TOKEN}}");
    }

    let pool = crosschat_storage::connect(&config.database).await?;
    crosschat_storage::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let filters = Arc::new(FilterRegistry::new(baseline(&config.relay.baseline_words)));
    let topology = Arc::new(Topology::new(filters));
    let stats = topology.rebuild(store.as_ref()).await?;
    info!(
        guilds = stats.guilds,
        rooms = stats.rooms,
        topics = stats.topics,
        "relay topology loaded"
    );

    let handler = Arc::new(RelayHandler::new(config.discord.log_channel));
    let mut client = Client::builder(token, RelayHandler::intents())
        .event_handler_arc(Arc::clone(&handler))
        .await?;

    let outbound = Arc::new(DiscordOutbound::new(
        Arc::clone(&client.http),
        Arc::clone(&client.cache),
        Duration::from_secs(config.discord.notice_ttl_secs),
    ));
    let services = RelayServices {
        db: store.clone(),
        store: store.clone(),
        outbound: outbound.clone(),
        emojis: outbound,
        topology,
    };
    let engine = Arc::new(RelayEngine::new(
        services,
        RateLimiter::new(&config.rate_limit),
        RelayPolicy::from_config(&config.discord, &config.relay),
    ));
    let commands = Arc::new(AdminCommands::new(
        store,
        Arc::clone(&engine),
        config.discord.staff_guild,
    ));
    if !handler.attach(engine, commands) {
        bail!("relay engine attached twice");
    }

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutting down");
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_words_join_the_builtin_baseline() {
        let words = baseline(&["  ÉCLAIR ".into(), "123".into()]);
        assert!(words.contains("eclair"));
        assert!(!words.contains(""));
        assert!(builtin_baseline().is_subset(&words));
    }
}
