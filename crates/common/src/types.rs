//! Platform identifiers.
//!
//! Chat-platform snowflakes are unique platform-wide, so a bare `u64` is
//! enough to name a room (channel), a guild, a user or a message.

pub type GuildId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type UserId = u64;

/// Parse a user reference as typed in a command: a raw id, `<@id>` or `<@!id>`.
pub fn parse_user_ref(raw: &str) -> Option<UserId> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(trimmed);
    inner.parse().ok()
}

/// Parse a channel reference as typed in a command: a raw id or `<#id>`.
pub fn parse_channel_ref(raw: &str) -> Option<ChannelId> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    inner.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_refs() {
        assert_eq!(parse_user_ref("123"), Some(123));
        assert_eq!(parse_user_ref("<@456>"), Some(456));
        assert_eq!(parse_user_ref("<@!789>"), Some(789));
        assert_eq!(parse_user_ref("<@&789>"), None);
        assert_eq!(parse_user_ref("bob"), None);
    }

    #[test]
    fn channel_refs() {
        assert_eq!(parse_channel_ref("<#101>"), Some(101));
        assert_eq!(parse_channel_ref(" 202 "), Some(202));
        assert_eq!(parse_channel_ref("#general"), None);
    }
}
