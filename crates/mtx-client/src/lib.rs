//! Matrix client runtime.
//!
//! [`MatrixClient`] owns the session and at most one background sync loop;
//! requests go through a [`RequestDispatcher`] over a pluggable [`Transport`].

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod sync_engine;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{ClientConfig, MatrixClient};
pub use dispatcher::{ApiRequest, CLIENT_API_PREFIX, RequestDispatcher, path_segment, query_string};
pub use error::ClientError;
pub use session::SessionContext;
pub use sync_engine::{SyncEngine, SyncEngineConfig, SyncHandler};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
