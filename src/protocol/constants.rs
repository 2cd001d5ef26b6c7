//! TNS protocol constants used by the session handshake and listener ping.

// Packet types
pub const TNS_PACKET_TYPE_CONNECT: u8 = 1;
pub const TNS_PACKET_TYPE_ACCEPT: u8 = 2;
pub const TNS_PACKET_TYPE_REFUSE: u8 = 4;
pub const TNS_PACKET_TYPE_REDIRECT: u8 = 5;
pub const TNS_PACKET_TYPE_DATA: u8 = 6;
pub const TNS_PACKET_TYPE_RESEND: u8 = 11;

// Protocol versions
pub const TNS_VERSION_DESIRED: u16 = 319;
pub const TNS_VERSION_MINIMUM: u16 = 300;
pub const TNS_VERSION_MIN_ACCEPTED: u16 = 315; // 12.1
pub const TNS_VERSION_MIN_LARGE_SDU: u16 = 315;
pub const TNS_VERSION_MIN_OOB_CHECK: u16 = 318;

// Connect flags
pub const TNS_GSO_DONT_CARE: u16 = 0x0001;
pub const TNS_NSI_NA_REQUIRED: u8 = 0x10;
pub const TNS_NSI_DISABLE_NA: u8 = 0x04;
pub const TNS_NSI_SUPPORT_SECURITY_RENEG: u8 = 0x80;

// Other connection constants
pub const TNS_PROTOCOL_CHARACTERISTICS: u16 = 0x4f98;
pub const TNS_MAX_CONNECT_DATA: u16 = 230;
pub const TNS_CONNECT_DATA_OFFSET: u16 = 74;
pub const TNS_SDU_DEFAULT: u32 = 8192;
pub const PACKET_HEADER_SIZE: usize = 8;

// Listener error codes reported in REFUSE packets
pub const TNS_ERR_NONE: u32 = 0;
pub const TNS_ERR_INVALID_SID: u32 = 12505;
pub const TNS_ERR_INVALID_SERVICE_NAME: u32 = 12514;

pub const DEFAULT_PORT: u16 = 1521;
pub const DRIVER_NAME: &str = "oracle-session-rs";
