//! The seam between [`ConnectionManager`](crate::ConnectionManager) and a native layer.
//!
//! A [`Backend`] knows how to establish a [`Session`] from
//! [`Credentials`]; the session is the native handle itself. The manager
//! owns at most one session at a time and is the only caller of these
//! methods, so implementations need no internal synchronization.

use crate::connection::Credentials;
use crate::error::Result;
use std::future::Future;

/// Factory for native sessions.
pub trait Backend {
    /// The native handle produced by a successful open.
    type Session: Session;

    /// Establish a session for `credentials`.
    ///
    /// Failures carry the native diagnostic; the manager wraps them in
    /// [`Error::Connect`](crate::Error::Connect).
    fn open(&self, credentials: &Credentials) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A live native handle.
pub trait Session: Send {
    /// Minimal round-trip confirming the resource still answers.
    fn ping(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the native resource.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
