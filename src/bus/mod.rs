//! In-process pub/sub for pipeline events.

mod events;
mod fanout;

pub use events::{Event, EventKind};
pub use fanout::{EventBus, EventHandler, SubscriptionToken};
