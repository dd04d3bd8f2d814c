//! Password digest helper
//!
//! Passwords are stored as lowercase hex SHA-256 digests.

use sha2::{Digest, Sha256};

/// SHA-256 of the input as 64 lowercase hex characters
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_64_hex_chars() {
        let digest = sha256_hex("secret");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
