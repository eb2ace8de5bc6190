use {clap::Subcommand, crosschat_config::DatabaseConfig};

#[derive(Subcommand)]
pub enum DbAction {
    /// Create or upgrade the relay tables.
    Migrate,
}

pub async fn handle_db(action: DbAction, config: &DatabaseConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Migrate => run_migrations(config).await,
    }
}

async fn run_migrations(config: &DatabaseConfig) -> anyhow::Result<()> {
    println!("Running migrations for {}...", config.url);
    let pool = crosschat_storage::connect(config).await?;
    crosschat_storage::run_migrations(&pool).await?;
    pool.close().await;
    println!("All migrations complete.");
    Ok(())
}
