//! Plain-text rendering of timeline events for log-style output.

use crate::{events::TimelineEvent, sync::SyncResponse};

/// Render a message-like event as `sender: body`.
///
/// Returns `None` for events without a textual representation.
pub fn format_message(event: &TimelineEvent) -> Option<String> {
    event
        .is_message_like()
        .then(|| format!("{}: {}", event.sender(), event.body()))
}

/// Lines for every message in joined rooms, room by room in server order.
pub fn joined_room_lines(response: &SyncResponse) -> Vec<String> {
    response
        .rooms
        .join
        .values()
        .flat_map(|room| room.timeline.events.iter())
        .filter_map(format_message)
        .collect()
}
