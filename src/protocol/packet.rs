//! TNS packet structure and I/O.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::messages::Message;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TNS packet header size.
pub const HEADER_SIZE: usize = PACKET_HEADER_SIZE;

/// A TNS packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet type.
    pub packet_type: u8,
    /// Packet flags.
    pub packet_flags: u8,
    /// Packet payload (excluding header).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given type and payload.
    pub fn new(packet_type: u8, payload: Bytes) -> Self {
        Self {
            packet_type,
            packet_flags: 0,
            payload,
        }
    }

    /// Get the total packet size (header + payload).
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the packet to bytes.
    pub fn to_bytes(&self, use_large_sdu: bool) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total_size());
        write_packet_header(
            &mut buf,
            self.packet_type,
            self.packet_flags,
            self.total_size(),
            use_large_sdu,
        );
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Write an 8-byte TNS packet header.
pub fn write_packet_header(
    buf: &mut BytesMut,
    packet_type: u8,
    packet_flags: u8,
    total_size: usize,
    use_large_sdu: bool,
) {
    if use_large_sdu {
        buf.put_u32(total_size as u32);
    } else {
        buf.put_u16(total_size as u16);
        buf.put_u16(0); // Checksum (unused)
    }
    buf.put_u8(packet_type);
    buf.put_u8(packet_flags);
    buf.put_u16(0); // Header checksum (unused)
}

/// TNS packet reader/writer for a TCP stream.
pub struct PacketStream {
    stream: TcpStream,
    /// Whether to use 4-byte length (large SDU) or 2-byte length.
    use_large_sdu: bool,
    /// Maximum packet size (SDU).
    sdu: u32,
    /// Partial buffer for incomplete packets.
    partial_buf: BytesMut,
}

impl std::fmt::Debug for PacketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("peer", &self.stream.peer_addr().ok())
            .field("use_large_sdu", &self.use_large_sdu)
            .field("sdu", &self.sdu)
            .finish()
    }
}

impl PacketStream {
    /// Create a new packet stream.
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            use_large_sdu: false,
            sdu: TNS_SDU_DEFAULT,
            partial_buf: BytesMut::new(),
        }
    }

    /// Set whether to use large SDU (4-byte length).
    pub fn set_large_sdu(&mut self, use_large_sdu: bool) {
        self.use_large_sdu = use_large_sdu;
    }

    /// Set the SDU size.
    pub fn set_sdu(&mut self, sdu: u32) {
        self.sdu = sdu;
    }

    /// Get the SDU size.
    pub fn sdu(&self) -> u32 {
        self.sdu
    }

    /// Read a packet from the stream.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        self.fill_to(HEADER_SIZE).await?;

        let packet_len = if self.use_large_sdu {
            u32::from_be_bytes([
                self.partial_buf[0],
                self.partial_buf[1],
                self.partial_buf[2],
                self.partial_buf[3],
            ]) as usize
        } else {
            u16::from_be_bytes([self.partial_buf[0], self.partial_buf[1]]) as usize
        };
        if packet_len < HEADER_SIZE {
            return Err(Error::protocol(format!(
                "packet length {packet_len} shorter than header"
            )));
        }

        self.fill_to(packet_len).await?;

        let packet_data = self.partial_buf.split_to(packet_len).freeze();
        Ok(Packet {
            packet_type: packet_data[4],
            packet_flags: packet_data[5],
            payload: packet_data.slice(HEADER_SIZE..),
        })
    }

    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.partial_buf.len() < len {
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.partial_buf.extend_from_slice(&buf[..n]);
        }
        Ok(())
    }

    /// Write a packet to the stream.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes(self.use_large_sdu);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send a DATA packet.
    pub async fn send_data(&mut self, data: &[u8], data_flags: u16) -> Result<()> {
        let mut payload = BytesMut::with_capacity(data.len() + 2);
        payload.put_u16(data_flags);
        payload.put_slice(data);
        let packet = Packet::new(TNS_PACKET_TYPE_DATA, payload.freeze());
        self.write_packet(&packet).await
    }

    /// Send a message as a specific packet type in a single allocation.
    pub async fn send_message<M: Message>(&mut self, packet_type: u8, msg: &M) -> Result<()> {
        let total_size = HEADER_SIZE + msg.wire_size();
        let mut buf = BytesMut::with_capacity(total_size);

        write_packet_header(&mut buf, packet_type, 0, total_size, self.use_large_sdu);
        msg.write_to(&mut buf)?;

        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Check, without blocking, that the peer has not closed the stream.
    ///
    /// Bytes that arrive unprompted are kept for the next `read_packet`.
    pub fn check_open(&mut self) -> Result<()> {
        let mut buf = [0u8; 512];
        match self.stream.try_read(&mut buf) {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(n) => {
                self.partial_buf.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Shut down the write half and release the socket.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
