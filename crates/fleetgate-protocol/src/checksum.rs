//! CRC16/Kermit and the fixed binary-protocol replies.
//!
//! The binary protocol trails every frame with a CRC16/Kermit checksum:
//! reflected polynomial `0x8408`, seed `0x0000`, LSB-first, no final XOR.
//!
//! The server answers each processed frame with one of two fixed 6-byte
//! replies:
//!
//! ```text
//! 00 02 | 00 | 01 | crc_hi crc_lo     ACK
//! 00 02 | 00 | 00 | crc_hi crc_lo     NACK
//! len     cmd  status  crc16(first 4 bytes), big-endian
//! ```
//!
//! Both are computed at compile time.

/// Kermit polynomial in reflected form.
const POLY_REFLECTED: u16 = 0x8408;

/// Compute the CRC16/Kermit checksum of `bytes`.
///
/// # Examples
///
/// ```
/// use fleetgate_protocol::crc16;
///
/// // Standard check value for CRC-16/KERMIT
/// assert_eq!(crc16(b"123456789"), 0x2189);
/// ```
#[must_use]
pub const fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    let mut i = 0;
    while i < bytes.len() {
        crc ^= bytes[i] as u16;
        let mut bit = 0;
        while bit < 8 {
            let carry = crc & 1;
            crc >>= 1;
            if carry != 0 {
                crc ^= POLY_REFLECTED;
            }
            bit += 1;
        }
        i += 1;
    }
    crc
}

const fn reply(status: u8) -> [u8; 6] {
    let head = [0x00, 0x02, 0x00, status];
    let crc = crc16(&head).to_be_bytes();
    [head[0], head[1], head[2], head[3], crc[0], crc[1]]
}

/// Positive acknowledgement sent after a binary frame was consumed.
pub const ACK: [u8; 6] = reply(0x01);

/// Negative acknowledgement, asks the device to retransmit.
pub const NACK: [u8; 6] = reply(0x00);

/// Checksum carried by a complete binary frame and the one computed over the
/// bytes that precede it, as `(carried, computed)`.
///
/// Returns `None` if the frame is too short to carry a checksum.
#[must_use]
pub fn frame_checksums(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < 4 {
        return None;
    }
    let (body, trailer) = frame.split_at(frame.len() - 2);
    let carried = u16::from_be_bytes([trailer[0], trailer[1]]);
    Some((carried, crc16(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_embeds_crc_of_header() {
        let crc = crc16(&[0x00, 0x02, 0x00, 0x01]);
        assert_eq!(&ACK[4..], &crc.to_be_bytes());
        assert_eq!(ACK, [0x00, 0x02, 0x00, 0x01, 0xA4, 0x31]);
    }

    #[test]
    fn test_nack_differs_only_in_status() {
        assert_eq!(&NACK[..3], &ACK[..3]);
        assert_eq!(NACK[3], 0x00);
        assert_eq!(&NACK[4..], &crc16(&NACK[..4]).to_be_bytes());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_frame_checksums() {
        let (carried, computed) = frame_checksums(&ACK).unwrap();
        assert_eq!(carried, computed);

        let mut corrupted = ACK;
        corrupted[5] ^= 0xFF;
        let (carried, computed) = frame_checksums(&corrupted).unwrap();
        assert_ne!(carried, computed);

        assert!(frame_checksums(&[0x00, 0x01, 0x02]).is_none());
    }
}
