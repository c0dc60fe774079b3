//! Setup packet encoding
//!
//! The setup stage travels as 8 bytes with multi-byte fields little-endian:
//! ```text
//! [bmRequestType][bRequest][wValue: u16 LE][wIndex: u16 LE][wLength: u16 LE]
//! ```

use crate::SetupPacket;
use byteorder::{ByteOrder, LittleEndian};

/// Size of a setup packet on the wire
pub const SETUP_PACKET_SIZE: usize = 8;

/// Encode a setup packet into its 8-byte wire form
pub fn encode_setup(setup: &SetupPacket) -> [u8; SETUP_PACKET_SIZE] {
    let mut bytes = [0u8; SETUP_PACKET_SIZE];
    bytes[0] = setup.request_type;
    bytes[1] = setup.request;
    LittleEndian::write_u16(&mut bytes[2..4], setup.value);
    LittleEndian::write_u16(&mut bytes[4..6], setup.index);
    LittleEndian::write_u16(&mut bytes[6..8], setup.length);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_set_configuration_zero() {
        let bytes = encode_setup(&SetupPacket::set_configuration(0));
        assert_eq!(bytes, [0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_multibyte_fields_little_endian() {
        let setup = SetupPacket {
            request_type: 0x80,
            request: 0x06,
            value: 0x0100,
            index: 0x0409,
            length: 0x0012,
        };
        let bytes = encode_setup(&setup);
        assert_eq!(bytes, [0x80, 0x06, 0x00, 0x01, 0x09, 0x04, 0x12, 0x00]);
    }
}
