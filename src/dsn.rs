//! Connect descriptors and DSN strings.
//!
//! Three forms are understood:
//!
//! * `user/password@target` credentials strings ([`split_dsn`])
//! * full descriptors such as the one produced by [`make_dsn`]
//! * EZConnect targets, `host[:port]/service_name`

use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_PORT, DRIVER_NAME, TNS_SDU_DEFAULT};
use base64::Engine;
use rand::RngCore;
use std::fmt;
use std::time::Duration;

/// Build a connect descriptor for `host:port`.
///
/// A non-empty `service_name` wins over `sid`.
///
/// ```
/// use oracle_session_rs::make_dsn;
///
/// assert_eq!(
///     make_dsn("localhost", 1521, "sid", ""),
///     "(DESCRIPTION=(ADDRESS_LIST=(ADDRESS=(PROTOCOL=TCP)(HOST=localhost)(PORT=1521)))(CONNECT_DATA=(SID=sid)))"
/// );
/// ```
pub fn make_dsn(host: &str, port: u16, sid: &str, service_name: &str) -> String {
    let connect_data = if service_name.is_empty() {
        format!("SID={sid}")
    } else {
        format!("SERVICE_NAME={service_name}")
    };
    format!(
        "(DESCRIPTION=(ADDRESS_LIST=(ADDRESS=(PROTOCOL=TCP)(HOST={host})(PORT={port})))(CONNECT_DATA=({connect_data})))"
    )
}

/// Components of a `user/password@target` string.
#[derive(Clone, PartialEq, Eq)]
pub struct DsnParts {
    pub username: String,
    pub password: String,
    pub target: String,
}

impl fmt::Debug for DsnParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsnParts")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

/// Split `user/password@target` into its parts.
///
/// The last `@` separates the target, so passwords may contain `@`.
/// `/@target` means external authentication (empty user and password).
/// A string without `@` has an empty target.
pub fn split_dsn(dsn: &str) -> DsnParts {
    let dsn = dsn.trim();
    let (login, target) = match dsn.rsplit_once('@') {
        Some((login, target)) => (login, target),
        None => (dsn, ""),
    };
    let (username, password) = match login.split_once('/') {
        Some((user, pass)) => (user, pass),
        None => (login, ""),
    };
    DsnParts {
        username: username.to_string(),
        password: password.to_string(),
        target: target.to_string(),
    }
}

/// What the listener should hand the connection to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    ServiceName(String),
    Sid(String),
}

impl ConnectTarget {
    pub fn name(&self) -> &str {
        match self {
            ConnectTarget::ServiceName(name) | ConnectTarget::Sid(name) => name,
        }
    }
}

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Host address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Service name or SID.
    pub target: ConnectTarget,
    /// SDU (Session Data Unit) size.
    pub sdu: u32,
    /// DNS and TCP connection timeout (default: 20 seconds).
    pub connect_timeout: Duration,
}

impl ConnectParams {
    /// Create new connection parameters for a service name.
    pub fn new(host: impl Into<String>, port: u16, service_name: impl Into<String>) -> Self {
        Self::with_target(host, port, ConnectTarget::ServiceName(service_name.into()))
    }

    /// Create new connection parameters for a SID.
    pub fn with_sid(host: impl Into<String>, port: u16, sid: impl Into<String>) -> Self {
        Self::with_target(host, port, ConnectTarget::Sid(sid.into()))
    }

    fn with_target(host: impl Into<String>, port: u16, target: ConnectTarget) -> Self {
        Self {
            host: host.into(),
            port,
            target,
            sdu: TNS_SDU_DEFAULT,
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Set the connection timeout.
    ///
    /// ```
    /// use oracle_session_rs::ConnectParams;
    /// use std::time::Duration;
    ///
    /// let params = ConnectParams::new("localhost", 1521, "ORCL")
    ///     .with_connect_timeout(Duration::from_secs(5));
    /// assert_eq!(params.connect_timeout, Duration::from_secs(5));
    /// ```
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the requested SDU.
    pub fn with_sdu(mut self, sdu: u32) -> Self {
        self.sdu = sdu;
        self
    }

    /// Parse a descriptor or an EZConnect string.
    pub fn parse(conn_str: &str) -> Result<Self> {
        let conn_str = conn_str.trim();
        if conn_str.is_empty() {
            return Err(Error::InvalidConnectString {
                message: "empty connect string".to_string(),
            });
        }
        if conn_str.starts_with('(') {
            Self::parse_descriptor(conn_str)
        } else {
            Self::parse_easy_connect(conn_str)
        }
    }

    fn parse_easy_connect(conn_str: &str) -> Result<Self> {
        // Format: host:port/service_name or host/service_name (default port 1521)
        let (addr_part, service_name) =
            conn_str
                .split_once('/')
                .ok_or_else(|| Error::InvalidConnectString {
                    message: "Expected format: host:port/service_name".to_string(),
                })?;

        let (host, port) = if let Some((h, p)) = addr_part.split_once(':') {
            (h.to_string(), parse_port(p)?)
        } else {
            (addr_part.to_string(), DEFAULT_PORT)
        };
        if host.is_empty() || service_name.is_empty() {
            return Err(Error::InvalidConnectString {
                message: "Expected format: host:port/service_name".to_string(),
            });
        }

        Ok(Self::new(host, port, service_name))
    }

    fn parse_descriptor(descriptor: &str) -> Result<Self> {
        let host = descriptor_value(descriptor, "HOST").ok_or_else(|| {
            Error::InvalidConnectString {
                message: "descriptor has no HOST".to_string(),
            }
        })?;
        let port = match descriptor_value(descriptor, "PORT") {
            Some(p) => parse_port(p)?,
            None => DEFAULT_PORT,
        };
        if let Some(service) = descriptor_value(descriptor, "SERVICE_NAME") {
            Ok(Self::new(host, port, service))
        } else if let Some(sid) = descriptor_value(descriptor, "SID") {
            Ok(Self::with_sid(host, port, sid))
        } else {
            Err(Error::InvalidConnectString {
                message: "descriptor has neither SERVICE_NAME nor SID".to_string(),
            })
        }
    }

    /// Build the connect descriptor sent in the CONNECT packet.
    pub fn build_connect_string(&self) -> String {
        let username = whoami::username();

        // Local hostname (for CID, not the database server hostname)
        let local_hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());

        // CONNECTION_ID: 16 random bytes, base64 encoded
        let mut connection_id_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut connection_id_bytes);
        let connection_id = base64::engine::general_purpose::STANDARD.encode(connection_id_bytes);

        let target = match &self.target {
            ConnectTarget::ServiceName(name) => format!("SERVICE_NAME={name}"),
            ConnectTarget::Sid(sid) => format!("SID={sid}"),
        };

        format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=tcp)(HOST={})(PORT={}))(CONNECT_DATA=({})(CID=(PROGRAM={})(HOST={})(USER={}))(CONNECTION_ID={})))",
            self.host, self.port, target, DRIVER_NAME, local_hostname, username, connection_id
        )
    }

    /// Descriptor asking the listener to answer a ping.
    pub fn build_ping_string(&self) -> String {
        format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=tcp)(HOST={})(PORT={}))(CONNECT_DATA=(COMMAND=ping)))",
            self.host, self.port
        )
    }

    /// `host:port` used for address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(p: &str) -> Result<u16> {
    p.trim().parse::<u16>().map_err(|_| Error::InvalidConnectString {
        message: format!("Invalid port: {}", p),
    })
}

/// Value of the first `(KEY=value)` pair in a descriptor, matched case-insensitively.
pub(crate) fn descriptor_value<'a>(descriptor: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("({}=", key.to_ascii_uppercase());
    // ASCII uppercasing keeps byte offsets aligned with the original.
    let upper = descriptor.to_ascii_uppercase();
    let start = upper.find(&pattern)? + pattern.len();
    let len = descriptor[start..].find(')')?;
    Some(descriptor[start..start + len].trim())
}
