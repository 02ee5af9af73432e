use std::{sync::Arc, time::Duration};

use mtx_core::{FailedCall, RequestError, SyncOptions, SyncResponse, classify_failure};
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace};
use url::Url;

use crate::{
    session::SessionContext,
    transport::{HttpRequest, Transport},
};

/// Path prefix of the client-server API.
pub const CLIENT_API_PREFIX: &str = "/_matrix/client/v3";

/// Description of one client-server API call, relative to [`CLIENT_API_PREFIX`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub authenticated: bool,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authenticated: true,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, RequestError> {
        let encoded = serde_json::to_vec(body)
            .map_err(|err| classify_failure(FailedCall::Encode(&err.to_string())))?;
        self.body = Some(encoded);
        Ok(self)
    }

    /// Send without the bearer token (login, public endpoints).
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Percent-encode each key and value and join the pairs with `&`, keeping
/// the given order.
pub fn query_string(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode a value used as one path segment (room IDs, transaction IDs).
pub fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Builds, sends and decodes client-server API calls.
///
/// Never retries and never mutates the session; every failure is returned as
/// a classified [`RequestError`].
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    base_url: String,
    session: SessionContext,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, homeserver: &Url, session: SessionContext) -> Self {
        Self {
            transport,
            base_url: homeserver.as_str().trim_end_matches('/').to_owned(),
            session,
        }
    }

    pub fn url_for(&self, path: &str, query: &[(String, String)]) -> String {
        let mut url = format!("{}{CLIENT_API_PREFIX}{path}", self.base_url);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query_string(query));
        }
        url
    }

    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, RequestError> {
        let url = self.url_for(&request.path, &request.query);

        let mut headers = vec![("accept".to_owned(), "application/json".to_owned())];
        // Read at call time so a token installed after construction is used.
        if request.authenticated
            && let Some(token) = self.session.access_token().await
        {
            headers.push(("authorization".to_owned(), format!("Bearer {token}")));
        }
        if request.body.is_some() {
            headers.push(("content-type".to_owned(), "application/json".to_owned()));
        }

        debug!(method = %request.method, path = %request.path, "dispatching request");
        let response = self
            .transport
            .execute(HttpRequest {
                method: request.method,
                url,
                headers,
                body: request.body,
                timeout: request.timeout,
            })
            .await
            .map_err(|err| {
                debug!(
                    path = %request.path,
                    timed_out = err.timed_out,
                    error = %err,
                    "transport failure"
                );
                classify_failure(FailedCall::Transport(&err.to_string()))
            })?;

        let status = response.status;
        trace!(status, bytes = response.body.len(), path = %request.path, "response received");
        if !(200..300).contains(&status) {
            return Err(classify_failure(FailedCall::Status {
                status,
                body: &response.body,
            }));
        }

        serde_json::from_slice::<T>(&response.body).map_err(|err| {
            classify_failure(FailedCall::Decode {
                status,
                error: &err.to_string(),
            })
        })
    }

    /// Issue one `GET /sync`.
    pub async fn sync(
        &self,
        options: &SyncOptions,
        request_timeout: Option<Duration>,
    ) -> Result<SyncResponse, RequestError> {
        let mut request = ApiRequest::get("/sync").with_query(options.query_params());
        if let Some(timeout) = request_timeout {
            request = request.with_timeout(timeout);
        }
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde::de::IgnoredAny;

    use super::*;
    use crate::transport::ReqwestTransport;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn dispatcher(base: &str, session: SessionContext) -> RequestDispatcher {
        let transport =
            Arc::new(ReqwestTransport::new(Duration::from_secs(5)).expect("transport builds"));
        let url = Url::parse(base).expect("valid base url");
        RequestDispatcher::new(transport, &url, session)
    }

    async fn logged_in(token: &str) -> SessionContext {
        let session = SessionContext::default();
        session
            .replace(mtx_core::Session {
                access_token: Some(token.to_owned()),
                ..mtx_core::Session::default()
            })
            .await;
        session
    }

    #[test]
    fn query_string_encodes_pairs_independently_in_order() {
        let query = query_string(&pairs(&[
            ("since", "s72594_4483_1934"),
            ("filter", r#"{"room":{"timeline":{"limit":10}}}"#),
            ("a&b", "c=d"),
        ]));
        assert_eq!(
            query,
            "since=s72594_4483_1934\
             &filter=%7B%22room%22%3A%7B%22timeline%22%3A%7B%22limit%22%3A10%7D%7D%7D\
             &a%26b=c%3Dd"
        );
    }

    #[test]
    fn url_for_joins_base_prefix_path_and_query() {
        let d = dispatcher("https://matrix.example.org/", SessionContext::default());
        assert_eq!(
            d.url_for("/sync", &pairs(&[("timeout", "0")])),
            "https://matrix.example.org/_matrix/client/v3/sync?timeout=0"
        );
        assert_eq!(
            d.url_for("/joined_groups", &[]),
            "https://matrix.example.org/_matrix/client/v3/joined_groups"
        );
    }

    #[test]
    fn path_segment_escapes_room_ids() {
        assert_eq!(path_segment("!cure:example.org"), "%21cure%3Aexample.org");
    }

    #[tokio::test]
    async fn sync_sends_bearer_token_and_decodes_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/_matrix/client/v3/sync")
            .match_header("authorization", "Bearer abc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("since".into(), "s1".into()),
                Matcher::UrlEncoded("timeout".into(), "30000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"next_batch":"s2"}"#)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), logged_in("abc").await);
        let options = SyncOptions {
            since: Some("s1".into()),
            ..SyncOptions::default()
        };
        let response = d.sync(&options, None).await.expect("sync succeeds");

        assert_eq!(response.next_batch, "s2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn token_is_read_when_each_request_is_sent() {
        let mut server = Server::new_async().await;
        let old = server
            .mock("GET", "/_matrix/client/v3/joined_groups")
            .match_header("authorization", "Bearer old")
            .with_body(r#"{"groups":[]}"#)
            .expect(1)
            .create_async()
            .await;
        let new = server
            .mock("GET", "/_matrix/client/v3/joined_groups")
            .match_header("authorization", "Bearer new")
            .with_body(r#"{"groups":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let session = logged_in("old").await;
        let d = dispatcher(&server.url(), session.clone());
        d.send::<IgnoredAny>(ApiRequest::get("/joined_groups"))
            .await
            .expect("first call");

        session
            .replace(mtx_core::Session {
                access_token: Some("new".into()),
                ..mtx_core::Session::default()
            })
            .await;
        d.send::<IgnoredAny>(ApiRequest::get("/joined_groups"))
            .await
            .expect("second call");

        old.assert_async().await;
        new.assert_async().await;
    }

    #[tokio::test]
    async fn unauthenticated_requests_carry_no_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/_matrix/client/v3/login")
            .match_header("authorization", Matcher::Missing)
            .match_header("content-type", "application/json")
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), logged_in("abc").await);
        let request = ApiRequest::post("/login")
            .unauthenticated()
            .with_json(&serde_json::json!({"type": "m.login.password"}))
            .expect("body encodes");
        d.send::<IgnoredAny>(request).await.expect("login call");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_with_matrix_error_is_classified() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/_matrix/client/v3/sync")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"errcode":"M_UNKNOWN_TOKEN","error":"Unrecognised access token."}"#)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), logged_in("stale").await);
        let err = d
            .sync(&SyncOptions::default(), None)
            .await
            .expect_err("401 must fail");

        assert_eq!(err.status, Some(401));
        assert_eq!(err.matrix_error.errcode, "M_UNKNOWN_TOKEN");
        assert_eq!(err.parse_error, None);
        assert_eq!(err.transport, None);
    }

    #[tokio::test]
    async fn rate_limit_with_html_body_sets_status_and_parse_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/_matrix/client/v3/sync")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("<html>Too Many Requests</html>")
            .create_async()
            .await;

        let d = dispatcher(&server.url(), logged_in("abc").await);
        let err = d
            .sync(&SyncOptions::default(), None)
            .await
            .expect_err("429 must fail");

        assert_eq!(err.status, Some(429));
        assert!(err.parse_error.is_some());
        assert!(err.matrix_error.is_empty());
        assert_eq!(err.transport, None);
    }

    #[tokio::test]
    async fn wrong_top_level_shape_is_a_parse_error_with_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/_matrix/client/v3/sync")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rooms":{}}"#)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), logged_in("abc").await);
        let err = d
            .sync(&SyncOptions::default(), None)
            .await
            .expect_err("missing next_batch must fail");

        assert_eq!(err.status, Some(200));
        assert!(err.parse_error.is_some());
    }

    #[tokio::test]
    async fn connection_failure_sets_only_transport_field() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind a free port");
            listener.local_addr().expect("local addr").port()
        };
        let d = dispatcher(&format!("http://127.0.0.1:{port}"), logged_in("abc").await);
        let err = d
            .sync(&SyncOptions::default(), Some(Duration::from_secs(2)))
            .await
            .expect_err("connection must fail");

        assert!(err.transport.is_some());
        assert_eq!(err.status, None);
        assert!(err.matrix_error.is_empty());
        assert_eq!(err.parse_error, None);
    }
}
