//! NUL-padded wire strings.
//!
//! CA writes strings NUL-terminated and zero-padded to a multiple of
//! 8 bytes; reading trims at the first NUL.

use bytes::Bytes;

/// Length of `n` bytes rounded up to the nearest multiple of 8.
pub fn padded_len(n: usize) -> usize {
    n.div_ceil(8) * 8
}

/// Encode a string payload: the bytes, a terminating NUL, zero padding to
/// a multiple of 8.
pub fn padded_string_payload(s: &[u8]) -> Bytes {
    let total = padded_len(s.len() + 1);
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(s);
    buf.resize(total, 0);
    Bytes::from(buf)
}

/// The prefix of `bytes` up to (not including) the first NUL.
pub fn trim_string(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
