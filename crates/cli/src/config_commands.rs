use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    crosschat_config::CrossChatConfig,
    secrecy::{ExposeSecret, Secret},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with the bot token redacted.
    Show,
    /// Load the configuration file and report whether it parses.
    Check,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = redacted(crate::load(path)?);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
        ConfigAction::Check => check(path),
    }
}

fn check(path: Option<&Path>) -> Result<()> {
    let config = crate::load(path)?;
    match path {
        Some(path) => eprintln!("Checked {}", path.display()),
        None => eprintln!("Checked discovered configuration"),
    }
    if config.discord.token.expose_secret().is_empty() {
        eprintln!("warning: discord.token is empty; `crosschat run` will fail to log in");
    }
    if config.discord.command_prefixes.is_empty() {
        eprintln!("warning: discord.command_prefixes is empty; admin commands are disabled");
    }
    eprintln!("No errors found.");
    Ok(())
}

fn redacted(mut config: CrossChatConfig) -> CrossChatConfig {
    if !config.discord.token.expose_secret().is_empty() {
        config.discord.token = Secret::new("[REDACTED]".into());
    }
    config
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_never_prints_the_token() {
        let mut config = CrossChatConfig::default();
        config.discord.token = Secret::new("very-secret".into());
        let json = serde_json::to_string(&redacted(config)).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn empty_token_stays_empty() {
        let config = redacted(CrossChatConfig::default());
        assert!(config.discord.token.expose_secret().is_empty());
    }
}
