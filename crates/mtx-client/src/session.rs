use std::sync::Arc;

use mtx_core::{LoginResponse, Session};
use tokio::sync::RwLock;

/// Session state shared between the client facade, the dispatcher and the
/// sync engine.
///
/// Writers per field:
/// - credentials (`access_token`, `user_id`, `device_id`, `home_server`):
///   login, logout and session restore on [`crate::MatrixClient`];
/// - `next_batch`: the running sync engine task.
///
/// Every read takes the lock, so readers see either the old or the new value
/// of a field, never a partial write.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Session>>,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.access_token.clone()
    }

    pub async fn next_batch(&self) -> Option<String> {
        self.inner.read().await.next_batch.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.inner.read().await.is_logged_in()
    }

    /// Install fresh credentials. A new login starts a new sync stream.
    pub(crate) async fn apply_login(&self, response: &LoginResponse) {
        let mut session = self.inner.write().await;
        *session = Session {
            access_token: Some(response.access_token.clone()),
            user_id: Some(response.user_id.clone()),
            device_id: Some(response.device_id.clone()),
            home_server: response.home_server.clone(),
            next_batch: None,
        };
    }

    pub(crate) async fn clear(&self) {
        *self.inner.write().await = Session::default();
    }

    pub(crate) async fn replace(&self, session: Session) {
        *self.inner.write().await = session;
    }

    pub(crate) async fn set_next_batch(&self, next_batch: String) {
        self.inner.write().await.next_batch = Some(next_batch);
    }
}
