//! CONNECT packet payload.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::messages::Message;
use bytes::{BufMut, BytesMut};

/// TNS CONNECT packet message.
///
/// This is sent as the first packet on every socket, both for a session and
/// for a listener ping. It's a raw packet (not a DATA packet), so it doesn't
/// have data_flags.
pub struct ConnectMessage<'a> {
    /// Connect descriptor string (e.g., "(DESCRIPTION=...)")
    pub connect_string: &'a [u8],
    /// SDU size to request
    pub sdu: u32,
}

impl ConnectMessage<'_> {
    /// Whether the connect data fits in the CONNECT packet itself.
    /// If longer, data must be sent in a separate DATA packet.
    pub fn connect_data_in_packet(&self) -> bool {
        self.connect_string.len() <= TNS_MAX_CONNECT_DATA as usize
    }
}

impl Message for ConnectMessage<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;

        size += 2; // version_desired
        size += 2; // version_minimum
        size += 2; // service_options
        size += 2; // sdu (16-bit)
        size += 2; // tdu (16-bit)
        size += 2; // protocol_characteristics
        size += 2; // line_turnaround
        size += 2; // value_of_1
        size += 2; // connect_data_length
        size += 2; // connect_data_offset
        size += 4; // max_receivable_data
        size += 1; // nsi_flags_1
        size += 1; // nsi_flags_2
        size += 24; // padding (3 x u64)
        size += 4; // large_sdu
        size += 4; // large_tdu
        size += 4; // connect_flags_1
        size += 4; // connect_flags_2

        if self.connect_data_in_packet() {
            size += self.connect_string.len();
        }

        size
    }

    fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        let connect_data_len = u16::try_from(self.connect_string.len()).map_err(|_| {
            Error::InvalidConnectString {
                message: format!(
                    "connect descriptor too long ({} bytes)",
                    self.connect_string.len()
                ),
            }
        })?;

        buf.put_u16(TNS_VERSION_DESIRED);
        buf.put_u16(TNS_VERSION_MINIMUM);

        // Service options - no OOB for async
        buf.put_u16(TNS_GSO_DONT_CARE);

        buf.put_u16(self.sdu.min(u16::MAX as u32) as u16); // SDU
        buf.put_u16(self.sdu.min(u16::MAX as u32) as u16); // TDU
        buf.put_u16(TNS_PROTOCOL_CHARACTERISTICS);
        buf.put_u16(0); // Line turnaround
        buf.put_u16(1); // Value of 1

        buf.put_u16(connect_data_len);
        buf.put_u16(TNS_CONNECT_DATA_OFFSET);
        buf.put_u32(0); // Max receivable data

        let nsi_flags = TNS_NSI_SUPPORT_SECURITY_RENEG | TNS_NSI_DISABLE_NA;
        buf.put_u8(nsi_flags);
        buf.put_u8(nsi_flags);

        // Obsolete fields
        buf.put_bytes(0, 24);

        buf.put_u32(self.sdu);
        buf.put_u32(self.sdu);

        buf.put_u32(0); // connect_flags_1
        buf.put_u32(0); // connect_flags_2

        if self.connect_data_in_packet() {
            buf.put_slice(self.connect_string);
        }

        Ok(())
    }
}
