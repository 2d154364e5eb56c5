use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic, case-insensitive digest over `(title, description, body[..200])`.
/// Used for in-run deduplication (`services::dedup`) and as part of the
/// persisted `(ticker, source, content_hash)` uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn compute(title: &str, description: &str, body: &str) -> Self {
        let truncated_body: String = body.chars().take(200).collect();

        let mut hasher = Sha256::new();
        hasher.update(title.trim().to_lowercase().as_bytes());
        hasher.update(b"\0");
        hasher.update(description.trim().to_lowercase().as_bytes());
        hasher.update(b"\0");
        hasher.update(truncated_body.trim().to_lowercase().as_bytes());

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        let a = ContentHash::compute("Apple Beats Estimates", "Q3 earnings", "Body text here");
        let b = ContentHash::compute("APPLE BEATS ESTIMATES", "Q3 EARNINGS", "BODY TEXT HERE");
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_content() {
        let a = ContentHash::compute("Apple Beats Estimates", "Q3 earnings", "Body text here");
        let b = ContentHash::compute("Apple Misses Estimates", "Q3 earnings", "Body text here");
        assert_ne!(a, b);
    }

    #[test]
    fn only_first_200_chars_of_body_matter() {
        let long_body = "x".repeat(500);
        let mut different_tail = "x".repeat(200);
        different_tail.push_str(&"y".repeat(300));

        let a = ContentHash::compute("t", "d", &long_body);
        let b = ContentHash::compute("t", "d", &different_tail);
        assert_eq!(a, b);
    }
}
