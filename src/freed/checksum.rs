//! # FreeD XOR Checksum
//!
//! The D1 checksum is the XOR of every byte preceding the checksum byte.

/// XOR all bytes together
///
/// # Arguments
///
/// * `data` - Bytes covered by the checksum (everything except the checksum byte)
///
/// # Returns
///
/// * `u8` - Checksum value
///
/// # Examples
///
/// ```
/// use freed_reader::freed::checksum::xor_checksum;
///
/// assert_eq!(xor_checksum(&[0xD1, 0x01]), 0xD0);
/// assert_eq!(xor_checksum(&[]), 0x00);
/// ```
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc ^ byte)
}
