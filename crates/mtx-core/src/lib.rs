//! Protocol contract shared by the Matrix client runtime and its consumers.
//!
//! This crate defines the session and sync option types, the typed timeline
//! event model, the `/sync` response model, request error classification, the
//! retry policy and the sync state machine. It performs no I/O.

/// Request error classification.
pub mod error;
/// Typed room events and their decoder.
pub mod events;
/// Plain-text rendering of timeline messages.
pub mod feed;
mod lenient;
/// Backoff policy used by the sync loop.
pub mod retry;
/// Continuation token ownership and sync phases.
pub mod state_machine;
/// Decoded `/sync` responses.
pub mod sync;
/// Session, request options and auxiliary endpoint payloads.
pub mod types;

pub use error::{
    ErrorCategory, FailedCall, MatrixError, RequestError, classify_failure, classify_http_status,
};
pub use events::{
    CreateContent, EventDecodeError, MediaContent, MediaInfo, MemberContent, NameContent,
    RedactionContent, RoomEvent, TextContent, TimelineEvent, TopicContent, UnrecognizedContent,
};
pub use feed::{format_message, joined_room_lines};
pub use retry::RetryPolicy;
pub use state_machine::{SyncPhase, SyncStateError, SyncStateMachine, SyncTicket};
pub use sync::{
    InvitedRoom, JoinedRoom, LeftRoom, Rooms, StateEvents, SyncResponse, Timeline,
    UnreadNotifications,
};
pub use types::{
    DEFAULT_SYNC_TIMEOUT, GroupProfile, JoinedGroups, LoginRequest, LoginResponse, MessageKind,
    PresenceState, SendResponse, Session, SyncOptions, UserIdentifier,
};
