//! Session id generation.
//!
//! Ids are embedded in the remote-control URL and the QR code shown by the
//! host, so they stay short. Collisions are possible; the registry retries.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Default number of characters in a session id.
pub const DEFAULT_ID_LENGTH: usize = 8;

/// Source of candidate session ids.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random lowercase alphanumeric ids of a fixed length.
#[derive(Debug, Clone)]
pub struct ShortIdGenerator {
    length: usize,
}

impl ShortIdGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for ShortIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for ShortIdGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_length() {
        let id = ShortIdGenerator::default().generate();
        assert_eq!(id.len(), DEFAULT_ID_LENGTH);
    }

    #[test]
    fn test_charset_is_url_safe() {
        let generator = ShortIdGenerator::new(64);
        for _ in 0..50 {
            let id = generator.generate();
            assert!(
                id.bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
            );
        }
    }

    #[test]
    fn test_zero_length_is_bumped() {
        assert_eq!(ShortIdGenerator::new(0).generate().len(), 1);
    }

    #[test]
    fn test_ids_rarely_repeat() {
        let generator = ShortIdGenerator::default();
        let ids: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
