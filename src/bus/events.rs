use crate::messages::InboundMessage;

/// Discriminator used when subscribing to a single event family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    NotificationTapped,
    DeliveryReportsSent,
    SeenStatusChanged,
}

/// Events announced on the [`EventBus`](crate::bus::EventBus).
///
/// Newly persisted location-trigger messages are deliberately absent here:
/// the location subsystem announces those on its own channel.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new non-location-trigger message was persisted.
    MessageReceived { message: InboundMessage },
    /// The user opened the app by tapping a notification.
    NotificationTapped { message: InboundMessage },
    /// A delivery report round-trip succeeded for these messages.
    DeliveryReportsSent { message_ids: Vec<String> },
    /// Seen status changed locally for these messages.
    SeenStatusChanged { message_ids: Vec<String> },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageReceived { .. } => EventKind::MessageReceived,
            Event::NotificationTapped { .. } => EventKind::NotificationTapped,
            Event::DeliveryReportsSent { .. } => EventKind::DeliveryReportsSent,
            Event::SeenStatusChanged { .. } => EventKind::SeenStatusChanged,
        }
    }
}
