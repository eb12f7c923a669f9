//! The two one-byte checksum conventions of BCM/XCP.
//!
//! Outbound commands carry the two's complement of the byte sum of
//! `[start][length][command...]`. Inbound frames are accepted when the sum of
//! every byte in the frame, trailing checksum included, is zero.

/// Checksum byte to append to an outbound command frame.
///
/// `data` runs from the start byte through the last command byte.
pub fn command_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, byte| sum.wrapping_sub(*byte))
}

/// Byte sum (mod 256) of a complete response frame.
pub fn response_sum(frame: &[u8]) -> u8 {
    frame.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Validate a complete response frame, start byte through checksum byte.
pub fn validate(frame: &[u8]) -> bool {
    response_sum(frame) == 0
}
