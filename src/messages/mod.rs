//! Typed message values and payload parsing.

mod campaign;
mod inbound;
mod outbound;
pub mod payload;

pub use campaign::{Campaign, Region};
pub use inbound::InboundMessage;
pub use outbound::{OutboundMessage, SentStatus};

/// Which way a message travels: server-to-client or client-to-server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}
