use sha1::{Digest, Sha1};

/// Compute the SHA-1 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

/// Build a strong HTTP entity tag for the given content.
///
/// The tag is the quoted SHA-1 hex digest, e.g. `"2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"`.
#[must_use]
pub fn content_etag(data: &[u8]) -> String {
    format!("\"{}\"", sha1_hex(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex() {
        // Known SHA-1 of "hello world"
        assert_eq!(
            sha1_hex(b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_sha1_hex_empty() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_content_etag_is_quoted() {
        let etag = content_etag(b"hello world");
        assert_eq!(etag, "\"2aae6c35c94fcfb415dbe95f408b9ce91ee846ed\"");
    }

    #[test]
    fn test_content_etag_differs_for_different_content() {
        assert_ne!(content_etag(b"a"), content_etag(b"b"));
    }
}
