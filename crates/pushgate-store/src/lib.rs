//! SQLite-backed store of inbound message records.
//!
//! One confined connection guarded by a mutex; every multi-step read/write
//! sequence runs inside a [`StoreSession`] so concurrent tasks never observe
//! a half-written batch.

mod record;
mod session;
mod store;

pub use record::{
    CampaignState, DeliveryMethod, MessageIdentity, MessageType, Payload, SeenStatus, StoredRecord,
};
pub use session::StoreSession;
pub use store::MessageStore;
