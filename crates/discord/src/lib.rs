//! Discord adapter for the relay, built on serenity.

pub mod convert;
pub mod handler;
pub mod outbound;

pub use {handler::RelayHandler, outbound::DiscordOutbound};
