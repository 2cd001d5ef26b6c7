//! Connection lifecycle: open, verify, release, reopen.

use crate::backend::{Backend, Session};
use crate::config::{env_var, SessionConfig};
use crate::dsn::split_dsn;
use crate::error::{Error, Result};
use crate::protocol::constants::{DRIVER_NAME, TNS_VERSION_DESIRED, TNS_VERSION_MINIMUM};
use std::fmt;

/// Who connects, and to what.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Database user.
    pub principal: String,
    /// Password.
    pub secret: String,
    /// Connect descriptor, EZConnect string, or empty when none is configured.
    pub target: String,
    /// Privileged (SYSDBA-style) connect.
    pub privileged: bool,
}

impl Credentials {
    pub fn new(
        principal: impl Into<String>,
        secret: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
            target: target.into(),
            privileged: false,
        }
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Build from a `user/password@target` string.
    pub fn from_dsn(dsn: &str) -> Self {
        let parts = split_dsn(dsn);
        Self::new(parts.username, parts.password, parts.target)
    }

    /// Read `ORACLE_DSN` and `ORACLE_PRIVILEGED`.
    ///
    /// A missing DSN yields empty credentials, so a later connect is skipped.
    pub fn from_env() -> Result<Self> {
        let credentials = env_var("ORACLE_DSN")
            .map(|dsn| Self::from_dsn(&dsn))
            .unwrap_or_else(|| Self::new("", "", ""));
        let privileged = match env_var("ORACLE_PRIVILEGED") {
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .map_err(|e| Error::config("ORACLE_PRIVILEGED", e.to_string()))?,
            None => false,
        };
        Ok(credentials.with_privileged(privileged))
    }

    /// Whether a target is configured at all.
    pub fn has_target(&self) -> bool {
        !self.target.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .field("target", &self.target)
            .field("privileged", &self.privileged)
            .finish()
    }
}

/// Observable state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Result of a successful [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session was established.
    Connected,
    /// The handle was already connected; nothing changed.
    AlreadyConnected,
    /// No target is configured; nothing was attempted.
    Skipped,
}

/// Versions this client advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientVersion {
    pub driver: &'static str,
    pub version: &'static str,
    pub tns_version_desired: u16,
    pub tns_version_minimum: u16,
}

/// Report the client library version.
pub fn client_version() -> ClientVersion {
    ClientVersion {
        driver: DRIVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
        tns_version_desired: TNS_VERSION_DESIRED,
        tns_version_minimum: TNS_VERSION_MINIMUM,
    }
}

/// Owner of a single logical connection.
///
/// The handle is either fully connected (a session is present) or fully
/// disconnected. It can be reconnected any number of times. All methods take
/// `&mut self`; sharing one manager between tasks needs external locking.
///
/// # Example
///
/// ```no_run
/// use oracle_session_rs::{ConnectionManager, Credentials, TnsBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let credentials = Credentials::new("scott", "tiger", "localhost:1521/FREEPDB1");
///     let mut manager = ConnectionManager::new(TnsBackend::new(), credentials);
///
///     manager.connect().await?;
///     manager.ping().await?;
///     manager.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct ConnectionManager<B: Backend> {
    backend: B,
    credentials: Credentials,
    session: Option<B::Session>,
    connect_count: u64,
}

impl<B: Backend> ConnectionManager<B> {
    /// Create a disconnected manager.
    pub fn new(backend: B, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials,
            session: None,
            connect_count: 0,
        }
    }

    /// Create a manager and connect it, applying `config.setup_failure` on failure.
    pub async fn open(
        backend: B,
        credentials: Credentials,
        config: &SessionConfig,
    ) -> Result<Self> {
        let mut manager = Self::new(backend, credentials);
        manager
            .connect()
            .await
            .map_err(|e| config.setup_failure.escalate(e))?;
        Ok(manager)
    }

    /// Establish the session.
    ///
    /// Already connected: no-op. No target configured: skipped with a warning.
    pub async fn connect(&mut self) -> Result<ConnectOutcome> {
        if self.session.is_some() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }
        if !self.credentials.has_target() {
            tracing::warn!(
                principal = %self.credentials.principal,
                "cannot connect without a target; skipping"
            );
            return Ok(ConnectOutcome::Skipped);
        }

        let session = self
            .backend
            .open(&self.credentials)
            .await
            .map_err(|e| Error::connect(self.credentials.target.clone(), e))?;
        self.session = Some(session);
        self.connect_count += 1;
        tracing::debug!(
            target_name = %self.credentials.target,
            connects = self.connect_count,
            "connected"
        );
        Ok(ConnectOutcome::Connected)
    }

    /// Release the session. Calling this while disconnected is a no-op.
    ///
    /// The handle is disconnected afterwards even if releasing the native
    /// resource failed; that failure is logged and returned.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        match session.close().await {
            Ok(()) => {
                tracing::debug!(target_name = %self.credentials.target, "disconnected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "releasing connection failed");
                Err(Error::disconnect(e))
            }
        }
    }

    /// Disconnect (ignoring release failures) and connect again.
    pub async fn reconnect(&mut self) -> Result<ConnectOutcome> {
        // Already logged by disconnect
        let _ = self.disconnect().await;
        self.connect().await
    }

    /// Whether a session is held. Local state only; see [`ping`](Self::ping).
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Confirm the remote resource answers. Leaves the state unchanged on failure.
    pub async fn ping(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        session.ping().await.map_err(Error::liveness)
    }

    /// The live session, e.g. to run statements through an [`Executor`](crate::Executor).
    pub fn session_mut(&mut self) -> Result<&mut B::Session> {
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of sessions established over the manager's lifetime.
    pub fn connect_count(&self) -> u64 {
        self.connect_count
    }
}

impl<B: Backend> fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("credentials", &self.credentials)
            .field("state", &self.state())
            .field("connect_count", &self.connect_count)
            .finish()
    }
}
