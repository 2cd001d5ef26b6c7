//! TNS messages sent before a session exists.
//!
//! Each message implements the `Message` trait so its packet can be
//! serialized with a single allocation.

use crate::error::Result;
use bytes::BytesMut;

pub mod connect;

pub use connect::ConnectMessage;

/// A message that can calculate its wire size and serialize to bytes.
pub trait Message {
    /// Calculate the serialized size in bytes (excluding packet header).
    fn wire_size(&self) -> usize;

    /// Write message content to buffer.
    fn write_to(&self, buf: &mut BytesMut) -> Result<()>;
}
