//! MD5 checksum computation for the data file and journal records.
//!
//! Every journal record carries a 16-byte digest and the data file is paired
//! with a hex digest sidecar. Any mismatch is corruption.

use md5::{Digest, Md5};

/// Size of a raw digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// Computes the raw 16-byte MD5 digest of `data`.
///
/// Deterministic: the same input always produces the same output.
pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the lowercase hex digest of `data`, as stored in the
/// `.md5sum` sidecar file.
pub fn hex_digest(data: &[u8]) -> String {
    digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Verifies that `data` hashes to `expected`.
pub fn verify(data: &[u8], expected: &[u8; DIGEST_LEN]) -> bool {
    digest(data) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let data = b"journal payload bytes";
        assert_eq!(digest(data), digest(data));
    }

    #[test]
    fn digest_detects_single_bit_flip() {
        let mut data = vec![0x00, 0x01, 0x02, 0x03];
        let original = digest(&data);
        data[2] ^= 0x01;
        assert_ne!(original, digest(&data));
    }

    #[test]
    fn hex_digest_is_32_lowercase_chars() {
        let hex = hex_digest(b"abc");
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_success_and_failure() {
        let data = b"payload to verify";
        let mut d = digest(data);
        assert!(verify(data, &d));
        d[0] ^= 0xFF;
        assert!(!verify(data, &d));
    }
}
