use std::{sync::Arc, time::Duration};

use mtx_core::{
    GroupProfile, JoinedGroups, LoginRequest, LoginResponse, MessageKind, RequestError,
    SendResponse, Session, SyncOptions, SyncResponse,
};
use serde::de::IgnoredAny;
use serde_json::json;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    dispatcher::{ApiRequest, RequestDispatcher, path_segment},
    error::ClientError,
    session::SessionContext,
    sync_engine::{SyncEngine, SyncEngineConfig, SyncHandler},
    transport::{ReqwestTransport, Transport},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub homeserver: Url,
    pub device_display_name: Option<String>,
    /// Client-side timeout for requests that do not set their own.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Parse and validate the homeserver base URL.
    pub fn new(homeserver: &str) -> Result<Self, ClientError> {
        let url = Url::parse(homeserver.trim()).map_err(|err| ClientError::InvalidHomeserver {
            url: homeserver.to_owned(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidHomeserver {
                url: homeserver.to_owned(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(Self {
            homeserver: url,
            device_display_name: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_device_display_name(mut self, name: impl Into<String>) -> Self {
        self.device_display_name = Some(name.into());
        self
    }
}

#[derive(Debug)]
struct RunningSyncTask {
    stop: CancellationToken,
    task: JoinHandle<Option<String>>,
}

/// Client context: configuration, session, dispatcher and at most one
/// running sync loop.
pub struct MatrixClient {
    config: ClientConfig,
    session: SessionContext,
    dispatcher: RequestDispatcher,
    sync_task: Mutex<Option<RunningSyncTask>>,
}

impl MatrixClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let session = SessionContext::default();
        let dispatcher = RequestDispatcher::new(transport, &config.homeserver, session.clone());
        Self {
            config,
            session,
            dispatcher,
            sync_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.session
    }

    pub async fn session(&self) -> Session {
        self.session.snapshot().await
    }

    /// Install a previously obtained session, including its continuation token.
    ///
    /// Rejected while the sync loop runs; the loop owns the continuation token.
    pub async fn restore_session(&self, session: Session) -> Result<(), ClientError> {
        let guard = self.sync_task.lock().await;
        if guard.is_some() {
            return Err(ClientError::SyncAlreadyRunning);
        }

        debug!(
            user_id = ?session.user_id,
            resume = session.next_batch.is_some(),
            "restoring session"
        );
        self.session.replace(session).await;
        Ok(())
    }

    /// Password login. Failures are returned once and never retried.
    ///
    /// Rejected while the sync loop runs; a new login starts a new sync stream.
    pub async fn login(&self, user: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let guard = self.sync_task.lock().await;
        if guard.is_some() {
            return Err(ClientError::SyncAlreadyRunning);
        }

        let body =
            LoginRequest::password(user, password, self.config.device_display_name.clone());
        let request = ApiRequest::post("/login")
            .unauthenticated()
            .with_json(&body)?;

        let response: LoginResponse = self.dispatcher.send(request).await?;
        self.session.apply_login(&response).await;
        drop(guard);
        info!(user_id = %response.user_id, device_id = %response.device_id, "logged in");
        Ok(response)
    }

    /// Stop any running sync loop, invalidate the token server-side and forget
    /// the session.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if self.is_syncing().await {
            self.stop_sync().await?;
        }
        if !self.session.is_logged_in().await {
            return Err(ClientError::NotLoggedIn);
        }

        let request = ApiRequest::post("/logout").with_json(&json!({}))?;
        self.dispatcher.send::<IgnoredAny>(request).await?;
        self.session.clear().await;
        info!("logged out");
        Ok(())
    }

    /// One `/sync` call outside the managed loop. The session token is left
    /// untouched.
    pub async fn sync_once(&self, options: &SyncOptions) -> Result<SyncResponse, RequestError> {
        let request_timeout = options.timeout + self.config.request_timeout;
        self.dispatcher.sync(options, Some(request_timeout)).await
    }

    pub async fn send_message(
        &self,
        room_id: &str,
        kind: MessageKind,
        body: &str,
    ) -> Result<String, RequestError> {
        let txn_id = Uuid::new_v4().to_string();
        let path = format!(
            "/rooms/{}/send/m.room.message/{}",
            path_segment(room_id),
            path_segment(&txn_id)
        );
        let content = json!({ "msgtype": kind.msgtype(), "body": body });
        let request = ApiRequest::put(path).with_json(&content)?;

        let response: SendResponse = self.dispatcher.send(request).await?;
        debug!(room_id, txn_id = %txn_id, event_id = %response.event_id, "message sent");
        Ok(response.event_id)
    }

    pub async fn joined_groups(&self) -> Result<JoinedGroups, RequestError> {
        self.dispatcher.send(ApiRequest::get("/joined_groups")).await
    }

    pub async fn group_profile(&self, group_id: &str) -> Result<GroupProfile, RequestError> {
        let path = format!("/groups/{}/profile", path_segment(group_id));
        self.dispatcher.send(ApiRequest::get(path)).await
    }

    /// Spawn the sync loop. Resumes from the session's continuation token when
    /// one is present, otherwise starts with an initial sync.
    pub async fn start_sync<H: SyncHandler>(
        &self,
        config: SyncEngineConfig,
        handler: H,
    ) -> Result<(), ClientError> {
        let mut guard = self.sync_task.lock().await;
        if guard.is_some() {
            return Err(ClientError::SyncAlreadyRunning);
        }

        let session = self.session.snapshot().await;
        if !session.is_logged_in() {
            return Err(ClientError::NotLoggedIn);
        }

        let mut engine = SyncEngine::new(
            self.dispatcher.clone(),
            self.session.clone(),
            config,
            handler,
        );
        if let Some(since) = session.next_batch {
            engine = engine.resume_from(since);
        }

        let stop = CancellationToken::new();
        let task = tokio::spawn(engine.run(stop.child_token()));
        *guard = Some(RunningSyncTask { stop, task });
        Ok(())
    }

    /// Cancel the sync loop and wait for it. Returns the last confirmed
    /// continuation token.
    pub async fn stop_sync(&self) -> Result<Option<String>, ClientError> {
        let running = {
            let mut guard = self.sync_task.lock().await;
            guard.take()
        };

        let Some(running) = running else {
            return Err(ClientError::SyncNotRunning);
        };

        running.stop.cancel();
        running.task.await.map_err(|err| {
            warn!(error = %err, "sync task did not finish cleanly");
            ClientError::SyncTaskFailed(err.to_string())
        })
    }

    pub async fn is_syncing(&self) -> bool {
        self.sync_task.lock().await.is_some()
    }
}

impl Drop for MatrixClient {
    fn drop(&mut self) {
        if let Some(running) = self.sync_task.get_mut().take() {
            running.stop.cancel();
        }
    }
}
