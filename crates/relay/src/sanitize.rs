//! Mention sanitation.
//!
//! Relayed copies land in guilds where the original mentions mean nothing, or
//! worse, would ping. Mass mentions are defused, user mentions become plain
//! `@name` text, and role/channel mentions become inert placeholders.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::message::MentionedUser;

const ZERO_WIDTH_SPACE: char = '\u{200B}';

#[allow(clippy::expect_used)]
static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("user mention pattern is valid"));

#[allow(clippy::expect_used)]
static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@&\d+>").expect("role mention pattern is valid"));

#[allow(clippy::expect_used)]
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#\d+>").expect("channel mention pattern is valid"));

#[allow(clippy::expect_used)]
static MASS_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(everyone|here)").expect("mass mention pattern is valid"));

pub fn sanitize_mentions(content: &str, mentions: &[MentionedUser]) -> String {
    let content = USER_MENTION.replace_all(content, |caps: &Captures<'_>| {
        let name = caps[1]
            .parse::<u64>()
            .ok()
            .and_then(|id| mentions.iter().find(|m| m.id == id))
            .map_or("unknown-user", |m| m.display_name.as_str());
        format!("@{name}")
    });
    let content = ROLE_MENTION.replace_all(&content, "@role");
    let content = CHANNEL_MENTION.replace_all(&content, "#channel");
    MASS_MENTION
        .replace_all(&content, |caps: &Captures<'_>| {
            format!("@{ZERO_WIDTH_SPACE}{}", &caps[1])
        })
        .into_owned()
}
