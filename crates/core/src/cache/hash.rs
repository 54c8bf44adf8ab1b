//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the on-disk file name for a cached image.
///
/// Names come from clients, so they are never used as paths directly.
pub fn compute_cache_key(image_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `file_name` looks like a key produced by [`compute_cache_key`].
pub fn is_cache_key(file_name: &str) -> bool {
    file_name.len() == 64 && file_name.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("poster.jpg");
        let hash2 = compute_cache_key("poster.jpg");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_names() {
        assert_ne!(compute_cache_key("a.jpg"), compute_cache_key("b.jpg"));
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("../../etc/passwd");
        assert!(is_cache_key(&hash));
        assert!(!hash.contains('/'));
    }

    #[test]
    fn test_is_cache_key_rejects_other_names() {
        assert!(!is_cache_key("poster.jpg"));
        assert!(!is_cache_key(""));
        assert!(!is_cache_key(&"g".repeat(64)));
    }
}
