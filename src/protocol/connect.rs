//! TNS connection establishment (CONNECT/ACCEPT handshake) and listener ping.

use crate::dsn::{descriptor_value, ConnectParams, ConnectTarget};
use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::messages::ConnectMessage;
use crate::protocol::packet::{Packet, PacketStream};
use bytes::Buf;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// What the listener agreed to in its ACCEPT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptInfo {
    /// Negotiated protocol version.
    pub protocol_version: u16,
    /// Negotiated SDU.
    pub sdu: u32,
}

/// Contents of a REFUSE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefuseInfo {
    pub user_reason: u8,
    pub system_reason: u8,
    /// Descriptor text such as `(DESCRIPTION=(ERR=12514)...)`.
    pub data: String,
}

impl RefuseInfo {
    /// Parse a REFUSE payload.
    pub fn parse(mut payload: &[u8]) -> Result<Self> {
        if payload.remaining() < 4 {
            return Err(Error::protocol("REFUSE packet too short"));
        }
        let user_reason = payload.get_u8();
        let system_reason = payload.get_u8();
        let data_len = payload.get_u16() as usize;
        let data = &payload[..data_len.min(payload.len())];
        Ok(Self {
            user_reason,
            system_reason,
            data: String::from_utf8_lossy(data).into_owned(),
        })
    }

    /// The `ERR=` code from the descriptor text, if any.
    pub fn error_code(&self) -> Option<u32> {
        descriptor_value(&self.data, "ERR")?.parse().ok()
    }

    /// The listener's `VSNNUM=` version number, if any.
    pub fn version_number(&self) -> Option<u32> {
        descriptor_value(&self.data, "VSNNUM")?.parse().ok()
    }
}

/// Resolve `params` and open a TCP connection, both bounded by the connect timeout.
pub async fn open_stream(params: &ConnectParams) -> Result<PacketStream> {
    let timed_out = || Error::ConnectionTimeout {
        host: params.host.clone(),
        port: params.port,
        timeout: params.connect_timeout,
    };

    let addrs = timeout(params.connect_timeout, lookup_host(params.address()))
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| {
            let text = e.to_string();
            if e.kind() == std::io::ErrorKind::NotFound
                || text.contains("could not resolve")
                || text.contains("Name or service not known")
                || text.contains("nodename nor servname provided")
                || text.contains("failed to lookup address")
            {
                Error::DnsResolutionFailed {
                    hostname: params.host.clone(),
                    message: text,
                }
            } else {
                Error::Io(e)
            }
        })?;

    let mut last_error = None;
    for addr in addrs {
        match timeout(params.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(tcp_stream)) => {
                tcp_stream.set_nodelay(true)?;
                return Ok(PacketStream::new(tcp_stream));
            }
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "TCP connect failed");
                last_error = Some(Error::Io(e));
            }
            Err(_) => return Err(timed_out()),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::DnsResolutionFailed {
        hostname: params.host.clone(),
        message: "No addresses returned".to_string(),
    }))
}

async fn send_connect(stream: &mut PacketStream, connect_string: &[u8], sdu: u32) -> Result<()> {
    let msg = ConnectMessage {
        connect_string,
        sdu,
    };
    stream.send_message(TNS_PACKET_TYPE_CONNECT, &msg).await?;

    // Connect data too large for the CONNECT packet goes in a DATA packet
    if !msg.connect_data_in_packet() {
        stream.send_data(connect_string, 0).await?;
    }
    Ok(())
}

/// Send a CONNECT packet and handle the listener's answer.
pub async fn connect(stream: &mut PacketStream, params: &ConnectParams) -> Result<AcceptInfo> {
    let connect_string = params.build_connect_string();
    tracing::debug!(descriptor = %connect_string, "sending CONNECT");

    send_connect(stream, connect_string.as_bytes(), params.sdu).await?;

    loop {
        let response = stream.read_packet().await?;

        match response.packet_type {
            TNS_PACKET_TYPE_ACCEPT => return handle_accept(response, stream),
            TNS_PACKET_TYPE_REFUSE => return Err(handle_refuse(&response, params)),
            TNS_PACKET_TYPE_REDIRECT => {
                return Err(Error::protocol("Redirect not supported"));
            }
            TNS_PACKET_TYPE_RESEND => {
                tracing::debug!("listener asked for RESEND");
                send_connect(stream, connect_string.as_bytes(), params.sdu).await?;
            }
            other => {
                return Err(Error::UnexpectedPacketType {
                    expected: TNS_PACKET_TYPE_ACCEPT,
                    actual: other,
                });
            }
        }
    }
}

/// Handle ACCEPT packet.
fn handle_accept(packet: Packet, stream: &mut PacketStream) -> Result<AcceptInfo> {
    let mut buf = packet.payload;
    let short = || Error::protocol("ACCEPT packet too short");

    if buf.remaining() < 2 {
        return Err(short());
    }
    let protocol_version = buf.get_u16();
    if protocol_version < TNS_VERSION_MIN_ACCEPTED {
        return Err(Error::ServerVersionNotSupported {
            min_version: TNS_VERSION_MIN_ACCEPTED,
        });
    }

    // options (2), skipped fields (10), nsi flags (1), skipped (9), sdu (4)
    if buf.remaining() < 26 {
        return Err(short());
    }
    let _protocol_options = buf.get_u16();
    buf.advance(10);

    let nsi_flags1 = buf.get_u8();
    if (nsi_flags1 & TNS_NSI_NA_REQUIRED) != 0 {
        return Err(Error::protocol("Native Network Encryption not supported"));
    }
    buf.advance(9);

    let sdu = buf.get_u32();
    stream.set_sdu(sdu);

    // Python uses 4-byte headers for protocol_version >= 315, regardless of SDU size
    stream.set_large_sdu(protocol_version >= TNS_VERSION_MIN_LARGE_SDU);

    if protocol_version >= TNS_VERSION_MIN_OOB_CHECK && buf.remaining() >= 9 {
        buf.advance(5);
        let flags2 = buf.get_u32();
        tracing::debug!(flags2, "accept flags");
    }

    Ok(AcceptInfo {
        protocol_version,
        sdu,
    })
}

/// Map a REFUSE packet to an error.
fn handle_refuse(packet: &Packet, params: &ConnectParams) -> Error {
    let refuse = match RefuseInfo::parse(&packet.payload) {
        Ok(refuse) => refuse,
        Err(e) => return e,
    };

    match (refuse.error_code(), &params.target) {
        (Some(TNS_ERR_INVALID_SERVICE_NAME), target) => Error::InvalidServiceName {
            service_name: target.name().to_string(),
        },
        (Some(TNS_ERR_INVALID_SID), ConnectTarget::Sid(sid)) => Error::InvalidSid {
            sid: sid.clone(),
        },
        _ => Error::ConnectionRefused {
            message: refuse.data,
        },
    }
}

/// Listener answer to a ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPing {
    /// Listener version number (`VSNNUM`), when reported.
    pub version_number: Option<u32>,
}

/// Ask the listener at `params` to answer a ping on a fresh socket.
///
/// A listener answers with a REFUSE packet carrying `(ERR=0)`.
pub async fn ping_listener(params: &ConnectParams) -> Result<ListenerPing> {
    let mut stream = open_stream(params).await?;
    let ping_string = params.build_ping_string();
    send_connect(&mut stream, ping_string.as_bytes(), params.sdu).await?;

    let response = stream.read_packet().await?;
    let result = match response.packet_type {
        TNS_PACKET_TYPE_REFUSE => {
            let refuse = RefuseInfo::parse(&response.payload)?;
            match refuse.error_code() {
                Some(TNS_ERR_NONE) => Ok(ListenerPing {
                    version_number: refuse.version_number(),
                }),
                _ => Err(Error::ConnectionRefused {
                    message: refuse.data,
                }),
            }
        }
        other => Err(Error::UnexpectedPacketType {
            expected: TNS_PACKET_TYPE_REFUSE,
            actual: other,
        }),
    };

    if let Err(e) = stream.shutdown().await {
        tracing::debug!(error = %e, "closing ping socket failed");
    }
    result
}
