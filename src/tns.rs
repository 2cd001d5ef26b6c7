//! Backend that talks TNS to a listener.
//!
//! A session is a socket whose CONNECT the listener has accepted. Liveness is
//! checked twice over: the session socket must still be open, and the
//! listener must answer a ping on a separate connection.

use crate::backend::{Backend, Session};
use crate::config::SessionConfig;
use crate::connection::Credentials;
use crate::dsn::ConnectParams;
use crate::error::Result;
use crate::protocol::connect::{self, AcceptInfo};
use crate::protocol::constants::TNS_SDU_DEFAULT;
use crate::protocol::PacketStream;
use std::time::Duration;

/// Opens sessions over TCP.
#[derive(Debug, Clone)]
pub struct TnsBackend {
    connect_timeout: Duration,
    sdu: u32,
}

impl Default for TnsBackend {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            sdu: TNS_SDU_DEFAULT,
        }
    }
}

impl TnsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            sdu: config.sdu,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_sdu(mut self, sdu: u32) -> Self {
        self.sdu = sdu;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn params(&self, target: &str) -> Result<ConnectParams> {
        Ok(ConnectParams::parse(target)?
            .with_connect_timeout(self.connect_timeout)
            .with_sdu(self.sdu))
    }
}

impl Backend for TnsBackend {
    type Session = TnsSession;

    async fn open(&self, credentials: &Credentials) -> Result<TnsSession> {
        let params = self.params(&credentials.target)?;
        tracing::debug!(
            principal = %credentials.principal,
            privileged = credentials.privileged,
            address = %params.address(),
            "opening TNS session"
        );

        let mut stream = connect::open_stream(&params).await?;
        let accept = match connect::connect(&mut stream, &params).await {
            Ok(accept) => accept,
            Err(e) => {
                let _ = stream.shutdown().await;
                return Err(e);
            }
        };
        tracing::debug!(
            protocol_version = accept.protocol_version,
            sdu = accept.sdu,
            "listener accepted"
        );

        Ok(TnsSession {
            stream,
            params,
            accept,
        })
    }
}

/// An accepted TNS connection.
#[derive(Debug)]
pub struct TnsSession {
    stream: PacketStream,
    params: ConnectParams,
    accept: AcceptInfo,
}

impl TnsSession {
    /// Protocol version the listener accepted.
    pub fn protocol_version(&self) -> u16 {
        self.accept.protocol_version
    }

    /// Negotiated SDU.
    pub fn sdu(&self) -> u32 {
        self.accept.sdu
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }
}

impl Session for TnsSession {
    async fn ping(&mut self) -> Result<()> {
        self.stream.check_open()?;
        let answer = connect::ping_listener(&self.params).await?;
        tracing::trace!(version_number = ?answer.version_number, "listener answered ping");
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.stream.shutdown().await
    }
}
