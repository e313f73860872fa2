use super::HASH_LEN;

/// Compute the content hash used for cache validity checks and entry
/// filenames. Blake3, hex-encoded, truncated to a fixed short length;
/// content-only, so two files with identical preprocessed text share a
/// hash.
pub fn content_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    hash.to_hex().as_str()[..HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(content_hash("# Hello"), content_hash("# Hello"));
    }

    #[test]
    fn test_hash_distinguishes_content() {
        assert_ne!(content_hash("# Hello"), content_hash("# Hello!"));
    }

    #[test]
    fn test_hash_length() {
        assert_eq!(content_hash("").len(), HASH_LEN);
    }
}
