//! TNS protocol pieces needed to open, probe and close a session.

pub mod connect;
pub mod constants;
pub mod messages;
pub mod packet;

pub use connect::{AcceptInfo, ListenerPing, RefuseInfo};
pub use messages::{ConnectMessage, Message};
pub use packet::{Packet, PacketStream};
