use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Long-poll wait requested from the homeserver when none is configured.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated session state shared by every request of one client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Bearer token; `None` before login and after logout.
    pub access_token: Option<String>,
    /// Fully qualified Matrix user ID.
    pub user_id: Option<String>,
    /// Device ID assigned at login.
    pub device_id: Option<String>,
    /// Server name reported at login.
    pub home_server: Option<String>,
    /// Continuation token of the last successful sync.
    pub next_batch: Option<String>,
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Presence the client advertises while syncing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Offline,
    Unavailable,
}

impl PresenceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Parameters of one `/sync` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Continuation token; `None` requests an initial sync.
    pub since: Option<String>,
    /// How long the server may hold the request open. Zero returns immediately.
    pub timeout: Duration,
    /// Filter ID or inline filter JSON.
    pub filter: Option<String>,
    /// Return the full state of every room instead of a delta.
    pub full_state: bool,
    pub set_presence: Option<PresenceState>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            since: None,
            timeout: DEFAULT_SYNC_TIMEOUT,
            filter: None,
            full_state: false,
            set_presence: None,
        }
    }
}

impl SyncOptions {
    /// Query parameters in the order they are sent.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(5);
        if let Some(since) = &self.since {
            params.push(("since".to_owned(), since.clone()));
        }
        params.push(("timeout".to_owned(), self.timeout.as_millis().to_string()));
        if let Some(filter) = &self.filter {
            params.push(("filter".to_owned(), filter.clone()));
        }
        if self.full_state {
            params.push(("full_state".to_owned(), "true".to_owned()));
        }
        if let Some(presence) = self.set_presence {
            params.push(("set_presence".to_owned(), presence.as_str().to_owned()));
        }
        params
    }
}

/// Body of `POST /login` for the password flow.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginRequest {
    #[serde(rename = "type")]
    pub login_type: String,
    pub identifier: UserIdentifier,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_device_display_name: Option<String>,
}

impl LoginRequest {
    pub fn password(
        user: impl Into<String>,
        password: impl Into<String>,
        device_display_name: Option<String>,
    ) -> Self {
        Self {
            login_type: "m.login.password".to_owned(),
            identifier: UserIdentifier {
                id_type: "m.id.user".to_owned(),
                user: user.into(),
            },
            password: password.into(),
            initial_device_display_name: device_display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserIdentifier {
    #[serde(rename = "type")]
    pub id_type: String,
    pub user: String,
}

/// Response of `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: String,
    pub device_id: String,
    /// Deprecated by the protocol but still sent by most servers.
    #[serde(default)]
    pub home_server: Option<String>,
}

/// Message kinds the client can send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    /// Standard text message (`m.text`).
    Text,
    /// Notice message (`m.notice`), usually non-intrusive/system-like.
    Notice,
    /// Emote message (`m.emote`).
    Emote,
}

impl MessageKind {
    pub fn msgtype(self) -> &'static str {
        match self {
            Self::Text => "m.text",
            Self::Notice => "m.notice",
            Self::Emote => "m.emote",
        }
    }
}

/// Response of `PUT /rooms/{roomId}/send/{eventType}/{txnId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub event_id: String,
}

/// Response of `GET /joined_groups`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinedGroups {
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Response of `GET /groups/{groupId}/profile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(params: &[(String, String)]) -> Vec<&str> {
        params.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn initial_sync_omits_since() {
        let options = SyncOptions {
            timeout: Duration::ZERO,
            ..SyncOptions::default()
        };
        let params = options.query_params();
        assert_eq!(keys(&params), vec!["timeout"]);
        assert_eq!(params[0].1, "0");
    }

    #[test]
    fn incremental_sync_sends_params_in_stable_order() {
        let options = SyncOptions {
            since: Some("s72594_4483_1934".into()),
            timeout: Duration::from_secs(30),
            filter: Some("66696p746572".into()),
            full_state: true,
            set_presence: Some(PresenceState::Offline),
        };
        let params = options.query_params();
        assert_eq!(
            keys(&params),
            vec!["since", "timeout", "filter", "full_state", "set_presence"]
        );
        assert_eq!(params[1].1, "30000");
        assert_eq!(params[4].1, "offline");
    }

    #[test]
    fn full_state_false_is_not_sent() {
        let params = SyncOptions::default().query_params();
        assert!(!keys(&params).contains(&"full_state"));
    }

    #[test]
    fn login_request_uses_password_flow_shape() {
        let request = LoginRequest::password("alice", "secret", Some("room-feed".into()));
        let json = serde_json::to_value(&request).expect("login request should serialize");
        assert_eq!(json["type"], "m.login.password");
        assert_eq!(json["identifier"]["type"], "m.id.user");
        assert_eq!(json["identifier"]["user"], "alice");
        assert_eq!(json["initial_device_display_name"], "room-feed");
    }

    #[test]
    fn login_response_tolerates_missing_home_server() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"access_token":"abc","user_id":"@a:hs","device_id":"DEV","well_known":{}}"#,
        )
        .expect("login response should decode");
        assert_eq!(response.access_token, "abc");
        assert_eq!(response.home_server, None);
    }
}
