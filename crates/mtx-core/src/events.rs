//! Typed room events decoded from raw sync JSON.
//!
//! Every event the server sends maps to exactly one [`TimelineEvent`] variant.
//! Event types the client does not model, and known types whose content does
//! not fit the expected shape, become [`TimelineEvent::Unrecognized`] so that
//! they still carry a sender but are never treated as messages.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::lenient;

/// Errors for JSON values that cannot be an event at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("event is missing string field '{0}'")]
    MissingField(&'static str),
}

/// Fields common to every room event plus a kind-specific content payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent<C> {
    /// Absent for stripped state (invites).
    pub event_id: Option<String>,
    pub sender: String,
    /// Milliseconds since the Unix epoch; `0` when the server omitted it.
    pub origin_server_ts: u64,
    /// Present for state events only.
    pub state_key: Option<String>,
    pub content: C,
}

/// Content of `m.text`, `m.notice` and `m.emote` messages.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TextContent {
    pub body: String,
    #[serde(default, deserialize_with = "lenient::option")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub formatted_body: Option<String>,
}

/// Content of `m.audio`, `m.file`, `m.image` and `m.video` messages.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MediaContent {
    /// Textual fallback, usually the file name or a description.
    pub body: String,
    /// `mxc://` URI of the unencrypted upload.
    #[serde(default, deserialize_with = "lenient::option")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub info: Option<MediaInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MediaInfo {
    #[serde(default, deserialize_with = "lenient::option")]
    pub mimetype: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub w: Option<u64>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub h: Option<u64>,
    /// Playback length in milliseconds (audio and video).
    #[serde(default, deserialize_with = "lenient::option")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MemberContent {
    pub membership: String,
    #[serde(default, deserialize_with = "lenient::option")]
    pub displayname: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NameContent {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TopicContent {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub topic: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CreateContent {
    #[serde(default, deserialize_with = "lenient::option")]
    pub creator: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub room_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionContent {
    /// Event being redacted. Older room versions carry it at the top level.
    pub redacts: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct RedactionWire {
    #[serde(default, deserialize_with = "lenient::option")]
    redacts: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    reason: Option<String>,
}

/// Raw payload of an event the client does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedContent {
    pub event_type: String,
    pub content: Value,
}

/// One room event, closed over the kinds this client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    Audio(RoomEvent<MediaContent>),
    Emote(RoomEvent<TextContent>),
    File(RoomEvent<MediaContent>),
    Image(RoomEvent<MediaContent>),
    Notice(RoomEvent<TextContent>),
    Text(RoomEvent<TextContent>),
    Video(RoomEvent<MediaContent>),
    Member(RoomEvent<MemberContent>),
    Name(RoomEvent<NameContent>),
    Topic(RoomEvent<TopicContent>),
    Create(RoomEvent<CreateContent>),
    Redaction(RoomEvent<RedactionContent>),
    Unrecognized(RoomEvent<UnrecognizedContent>),
}

struct Envelope {
    event_type: String,
    event_id: Option<String>,
    sender: String,
    origin_server_ts: u64,
    state_key: Option<String>,
    redacts: Option<String>,
    content: Value,
}

impl Envelope {
    fn parse(raw: Value) -> Result<Self, EventDecodeError> {
        let Value::Object(mut map) = raw else {
            return Err(EventDecodeError::NotAnObject);
        };

        let event_type =
            take_string(&mut map, "type").ok_or(EventDecodeError::MissingField("type"))?;
        let sender =
            take_string(&mut map, "sender").ok_or(EventDecodeError::MissingField("sender"))?;

        Ok(Self {
            event_type,
            sender,
            event_id: take_string(&mut map, "event_id"),
            origin_server_ts: map
                .get("origin_server_ts")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            state_key: take_string(&mut map, "state_key"),
            redacts: take_string(&mut map, "redacts"),
            content: map
                .remove("content")
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
    }

    fn into_event<C>(self, content: C) -> RoomEvent<C> {
        RoomEvent {
            event_id: self.event_id,
            sender: self.sender,
            origin_server_ts: self.origin_server_ts,
            state_key: self.state_key,
            content,
        }
    }

    fn unrecognized(mut self) -> TimelineEvent {
        let content = UnrecognizedContent {
            event_type: std::mem::take(&mut self.event_type),
            content: self.content.take(),
        };
        TimelineEvent::Unrecognized(self.into_event(content))
    }

    fn typed<C, F>(self, wrap: F) -> TimelineEvent
    where
        C: DeserializeOwned,
        F: FnOnce(RoomEvent<C>) -> TimelineEvent,
    {
        match C::deserialize(&self.content) {
            Ok(content) => wrap(self.into_event(content)),
            Err(err) => {
                debug!(
                    event_type = %self.event_type,
                    error = %err,
                    "event content does not match its type"
                );
                self.unrecognized()
            }
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

impl TimelineEvent {
    /// Decode one raw event.
    ///
    /// Fails only when the value has no usable `type` and `sender`; anything
    /// else decodes to some variant.
    pub fn decode(raw: Value) -> Result<Self, EventDecodeError> {
        let envelope = Envelope::parse(raw)?;

        let event_type = envelope.event_type.clone();
        let event = match event_type.as_str() {
            "m.room.message" => {
                let msgtype = envelope
                    .content
                    .get("msgtype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                match msgtype.as_str() {
                    "m.audio" => envelope.typed(Self::Audio),
                    "m.emote" => envelope.typed(Self::Emote),
                    "m.file" => envelope.typed(Self::File),
                    "m.image" => envelope.typed(Self::Image),
                    "m.notice" => envelope.typed(Self::Notice),
                    "m.text" => envelope.typed(Self::Text),
                    "m.video" => envelope.typed(Self::Video),
                    _ => envelope.unrecognized(),
                }
            }
            "m.room.member" => envelope.typed(Self::Member),
            "m.room.name" => envelope.typed(Self::Name),
            "m.room.topic" => envelope.typed(Self::Topic),
            "m.room.create" => envelope.typed(Self::Create),
            "m.room.redaction" => match RedactionWire::deserialize(&envelope.content) {
                Ok(wire) => {
                    let content = RedactionContent {
                        redacts: wire.redacts.or_else(|| envelope.redacts.clone()),
                        reason: wire.reason,
                    };
                    Self::Redaction(envelope.into_event(content))
                }
                Err(_) => envelope.unrecognized(),
            },
            _ => envelope.unrecognized(),
        };

        Ok(event)
    }

    /// True for `m.room.message` events of the seven modelled message types.
    pub fn is_message_like(&self) -> bool {
        matches!(
            self,
            Self::Audio(_)
                | Self::Emote(_)
                | Self::File(_)
                | Self::Image(_)
                | Self::Notice(_)
                | Self::Text(_)
                | Self::Video(_)
        )
    }

    pub fn sender(&self) -> &str {
        match self {
            Self::Emote(e) | Self::Notice(e) | Self::Text(e) => &e.sender,
            Self::Audio(e) | Self::File(e) | Self::Image(e) | Self::Video(e) => &e.sender,
            Self::Member(e) => &e.sender,
            Self::Name(e) => &e.sender,
            Self::Topic(e) => &e.sender,
            Self::Create(e) => &e.sender,
            Self::Redaction(e) => &e.sender,
            Self::Unrecognized(e) => &e.sender,
        }
    }

    /// Textual fallback body of message-like events, empty for everything else.
    pub fn body(&self) -> &str {
        match self {
            Self::Emote(e) | Self::Notice(e) | Self::Text(e) => &e.content.body,
            Self::Audio(e) | Self::File(e) | Self::Image(e) | Self::Video(e) => &e.content.body,
            Self::Member(_)
            | Self::Name(_)
            | Self::Topic(_)
            | Self::Create(_)
            | Self::Redaction(_)
            | Self::Unrecognized(_) => "",
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Emote(e) | Self::Notice(e) | Self::Text(e) => e.event_id.as_deref(),
            Self::Audio(e) | Self::File(e) | Self::Image(e) | Self::Video(e) => {
                e.event_id.as_deref()
            }
            Self::Member(e) => e.event_id.as_deref(),
            Self::Name(e) => e.event_id.as_deref(),
            Self::Topic(e) => e.event_id.as_deref(),
            Self::Create(e) => e.event_id.as_deref(),
            Self::Redaction(e) => e.event_id.as_deref(),
            Self::Unrecognized(e) => e.event_id.as_deref(),
        }
    }

    /// Wire event type, for example `m.room.message`.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Audio(_)
            | Self::Emote(_)
            | Self::File(_)
            | Self::Image(_)
            | Self::Notice(_)
            | Self::Text(_)
            | Self::Video(_) => "m.room.message",
            Self::Member(_) => "m.room.member",
            Self::Name(_) => "m.room.name",
            Self::Topic(_) => "m.room.topic",
            Self::Create(_) => "m.room.create",
            Self::Redaction(_) => "m.room.redaction",
            Self::Unrecognized(e) => &e.content.event_type,
        }
    }

    /// `msgtype` of message-like events.
    pub fn msgtype(&self) -> Option<&'static str> {
        match self {
            Self::Audio(_) => Some("m.audio"),
            Self::Emote(_) => Some("m.emote"),
            Self::File(_) => Some("m.file"),
            Self::Image(_) => Some("m.image"),
            Self::Notice(_) => Some("m.notice"),
            Self::Text(_) => Some("m.text"),
            Self::Video(_) => Some("m.video"),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for TimelineEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Self::decode(raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode an event list, dropping entries that are not events at all.
pub(crate) fn deserialize_events<'de, D>(deserializer: D) -> Result<Vec<TimelineEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Array(raw) => raw,
        Value::Null => Vec::new(),
        other => {
            debug!(found = %json_kind(&other), "event list is not an array");
            Vec::new()
        }
    };
    let mut events = Vec::with_capacity(raw.len());
    for value in raw {
        match TimelineEvent::decode(value) {
            Ok(event) => events.push(event),
            Err(err) => debug!(error = %err, "dropping undecodable event"),
        }
    }
    Ok(events)
}
