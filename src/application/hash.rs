//! Passcode hashing for vault key checks
//!
//! A configuration records the hex SHA-256 of the passcode its values were
//! encrypted with (`header.key_hash`). Loading compares it against the hash of
//! the passcode the configured vault reports.

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 of `passcode`.
///
/// # Examples
/// ```
/// use nodeconf::application::hash::passcode_hash;
///
/// assert_eq!(passcode_hash("secret").len(), 64);
/// ```
pub fn passcode_hash(passcode: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(passcode.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a recorded key hash with the hash of `passcode`, ignoring case.
pub fn passcode_matches(key_hash: &str, passcode: &str) -> bool {
    key_hash.trim().eq_ignore_ascii_case(&passcode_hash(passcode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passcode_hash_deterministic() {
        assert_eq!(passcode_hash("hello world"), passcode_hash("hello world"));
        assert_ne!(passcode_hash("hello"), passcode_hash("world"));
    }

    #[test]
    fn test_passcode_hash_known_value() {
        assert_eq!(
            passcode_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_passcode_matches_ignores_case() {
        let upper = passcode_hash("abc").to_uppercase();
        assert!(passcode_matches(&upper, "abc"));
        assert!(!passcode_matches(&upper, "abd"));
    }
}
