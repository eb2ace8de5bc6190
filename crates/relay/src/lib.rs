//! Cross-guild message relay.
//!
//! Rooms (guild channels) opt into a named topic; a message sent in any room
//! bound to a topic is normalized and fanned out as a copy to every room on
//! that topic. Deletions and edits of the original cascade to the copies
//! through the correlation records kept in a [`store::CorrelationStore`].

pub mod badge;
pub mod commands;
pub mod emoji;
pub mod engine;
pub mod error;
pub mod filter;
pub mod message;
pub mod outbound;
pub mod ratelimit;
pub mod sanitize;
pub mod store;
pub mod topology;

#[cfg(test)]
mod test_support;

pub use {
    engine::{RelayEngine, RelayOutcome, RelayPolicy, RelayServices},
    error::{Error, Result},
    message::{Envelope, InboundMessage},
    outbound::{EmojiDirectory, RelayOutbound},
    store::{CorrelationStore, Database, DeliveredMessage},
    topology::Topology,
};
