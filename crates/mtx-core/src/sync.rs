use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{
    events::{TimelineEvent, deserialize_events, json_kind},
    lenient,
};

/// Decoded body of a successful `/sync` call.
///
/// Only a missing or non-string `next_batch` rejects the body. Rooms that do
/// not decode are dropped one by one and malformed secondary fields fall back
/// to their defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SyncResponse {
    /// Continuation token for the next call.
    pub next_batch: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub rooms: Rooms,
}

impl SyncResponse {
    /// Number of timeline events across joined and left rooms.
    pub fn timeline_event_count(&self) -> usize {
        let joined: usize = self
            .rooms
            .join
            .values()
            .map(|room| room.timeline.events.len())
            .sum();
        let left: usize = self
            .rooms
            .leave
            .values()
            .map(|room| room.timeline.events.len())
            .sum();
        joined + left
    }
}

/// Rooms bucketed by the user's membership.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Rooms {
    #[serde(default, deserialize_with = "deserialize_rooms")]
    pub join: BTreeMap<String, JoinedRoom>,
    #[serde(default, deserialize_with = "deserialize_rooms")]
    pub invite: BTreeMap<String, InvitedRoom>,
    #[serde(default, deserialize_with = "deserialize_rooms")]
    pub leave: BTreeMap<String, LeftRoom>,
}

impl Rooms {
    pub fn is_empty(&self) -> bool {
        self.join.is_empty() && self.invite.is_empty() && self.leave.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JoinedRoom {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub timeline: Timeline,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub state: StateEvents,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub unread_notifications: UnreadNotifications,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InvitedRoom {
    /// Stripped state describing the room the user was invited to.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub invite_state: StateEvents,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LeftRoom {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub timeline: Timeline,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub state: StateEvents,
}

/// Timeline slice of one room, in server order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Timeline {
    #[serde(default, deserialize_with = "deserialize_events")]
    pub events: Vec<TimelineEvent>,
    /// The server skipped events between the previous batch and this one.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub limited: bool,
    /// Token for paginating backwards from the start of this slice.
    #[serde(default, deserialize_with = "lenient::option")]
    pub prev_batch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StateEvents {
    #[serde(default, deserialize_with = "deserialize_events")]
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct UnreadNotifications {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub highlight_count: u64,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub notification_count: u64,
}

/// Decode a room map entry by entry, dropping rooms that do not decode.
fn deserialize_rooms<'de, D, R>(deserializer: D) -> Result<BTreeMap<String, R>, D::Error>
where
    D: Deserializer<'de>,
    R: DeserializeOwned,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Object(raw) => raw,
        Value::Null => return Ok(BTreeMap::new()),
        other => {
            debug!(found = %json_kind(&other), "room map is not an object");
            return Ok(BTreeMap::new());
        }
    };

    let mut rooms = BTreeMap::new();
    for (room_id, value) in raw {
        if !value.is_object() {
            debug!(room_id = %room_id, found = %json_kind(&value), "dropping undecodable room");
            continue;
        }
        match R::deserialize(value) {
            Ok(room) => {
                rooms.insert(room_id, room);
            }
            Err(err) => debug!(room_id = %room_id, error = %err, "dropping undecodable room"),
        }
    }
    Ok(rooms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNC_BODY: &str = r#"{
        "next_batch": "s72595_4483_1934",
        "rooms": {
            "join": {
                "!cure:example.org": {
                    "timeline": {
                        "limited": true,
                        "prev_batch": "t34-23535_0_0",
                        "events": [
                            {"type": "m.room.message", "event_id": "$1", "sender": "@a:hs",
                             "content": {"msgtype": "m.text", "body": "first"}},
                            "garbage",
                            {"type": "m.room.message", "event_id": "$2", "sender": "@b:hs",
                             "content": {"msgtype": "m.notice", "body": "second"}},
                            {"type": "m.unknown.custom", "event_id": "$3", "sender": "@c:hs",
                             "content": {}}
                        ]
                    },
                    "unread_notifications": {"highlight_count": 1, "notification_count": 4}
                }
            },
            "invite": {
                "!party:example.org": {
                    "invite_state": {
                        "events": [
                            {"type": "m.room.name", "sender": "@d:hs", "state_key": "",
                             "content": {"name": "Party"}}
                        ]
                    }
                }
            },
            "leave": {
                "!old:example.org": {"timeline": {"events": []}}
            }
        },
        "presence": {"events": []}
    }"#;

    #[test]
    fn decodes_rooms_by_membership_and_keeps_timeline_order() {
        let response: SyncResponse = serde_json::from_str(SYNC_BODY).expect("sync body decodes");
        assert_eq!(response.next_batch, "s72595_4483_1934");

        let room = &response.rooms.join["!cure:example.org"];
        let ids: Vec<_> = room
            .timeline
            .events
            .iter()
            .map(|event| event.event_id())
            .collect();
        assert_eq!(ids, vec![Some("$1"), Some("$2"), Some("$3")]);
        assert!(room.timeline.limited);
        assert_eq!(room.timeline.prev_batch.as_deref(), Some("t34-23535_0_0"));
        assert_eq!(room.unread_notifications.notification_count, 4);

        let invite = &response.rooms.invite["!party:example.org"];
        assert_eq!(invite.invite_state.events.len(), 1);
        assert!(response.rooms.leave.contains_key("!old:example.org"));
        assert_eq!(response.timeline_event_count(), 3);
    }

    #[test]
    fn missing_rooms_decode_as_empty() {
        let response: SyncResponse =
            serde_json::from_str(r#"{"next_batch":"s1"}"#).expect("minimal body decodes");
        assert!(response.rooms.is_empty());
    }

    #[test]
    fn null_event_list_decodes_as_empty() {
        let response: SyncResponse = serde_json::from_str(
            r#"{"next_batch":"s1","rooms":{"join":{"!r:hs":{"timeline":{"events":null}}}}}"#,
        )
        .expect("null events decode");
        assert!(response.rooms.join["!r:hs"].timeline.events.is_empty());
    }

    #[test]
    fn bad_room_does_not_reject_its_neighbours() {
        let response: SyncResponse = serde_json::from_str(
            r#"{
                "next_batch": "s2",
                "rooms": {
                    "join": {
                        "!bad:hs": "not a room",
                        "!good:hs": {
                            "timeline": {
                                "limited": null,
                                "prev_batch": 12,
                                "events": [
                                    {"type": "m.room.message", "sender": "@a:hs",
                                     "content": {"msgtype": "m.text", "body": "hi"}}
                                ]
                            },
                            "state": {"events": {"not": "a list"}},
                            "unread_notifications": {"highlight_count": -1, "notification_count": 2}
                        }
                    },
                    "invite": ["not", "a", "map"]
                }
            }"#,
        )
        .expect("body with a bad room still decodes");

        assert_eq!(response.next_batch, "s2");
        assert_eq!(response.rooms.join.len(), 1);
        let room = &response.rooms.join["!good:hs"];
        assert_eq!(room.timeline.events.len(), 1);
        assert!(!room.timeline.limited);
        assert_eq!(room.timeline.prev_batch, None);
        assert!(room.state.events.is_empty());
        assert_eq!(room.unread_notifications.highlight_count, 0);
        assert_eq!(room.unread_notifications.notification_count, 2);
        assert!(response.rooms.invite.is_empty());
    }

    #[test]
    fn missing_next_batch_is_rejected() {
        let err = serde_json::from_str::<SyncResponse>(r#"{"rooms":{}}"#)
            .expect_err("next_batch is required");
        assert!(err.to_string().contains("next_batch"));
    }
}
