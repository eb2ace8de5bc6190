//! Shared identifiers and the error type used by the configuration layer.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{ChannelId, GuildId, MessageId, UserId, parse_channel_ref, parse_user_ref},
};
