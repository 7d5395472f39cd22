//! Deterministic short code generation.
//!
//! Codes are derived from a keyed hash of the long URL, so the same URL under
//! the same secret always maps to the same code. A redelivered stream entry
//! therefore recomputes the code it already produced.

use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;

use crate::domain::entities::Algorithm;

/// Output alphabet, most significant digit value first.
pub const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default code length when none is configured.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Number of leading digest bytes that seed the code.
const DIGEST_PREFIX_BYTES: usize = 6;

/// A pure function from long URL to short code.
pub trait UrlEncoder: Send + Sync {
    fn encode(&self, long_url: &str) -> String;

    /// Tag stored next to each code produced by this encoder.
    fn algorithm(&self) -> Algorithm;
}

/// HMAC-SHA256 + base62 encoder.
///
/// The first six digest bytes are read as a big-endian integer and repeatedly
/// divided by 62 until `length` digits have been collected. Once the integer
/// is exhausted the remaining digits are `0`, so every output has exactly
/// `length` characters.
///
/// Distinct URLs can collide: only 48 bits of the digest are used. Collisions
/// are detected at persistence time, not here.
#[derive(Clone)]
pub struct Base62Encoder {
    mac: Hmac<Sha256>,
    length: usize,
}

impl Base62Encoder {
    /// Creates an encoder keyed with `secret_key`.
    ///
    /// # Errors
    ///
    /// HMAC accepts keys of any length, so this only fails if the underlying
    /// MAC implementation rejects the key.
    pub fn new(secret_key: &str, length: usize) -> Result<Self, InvalidLength> {
        let mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())?;
        Ok(Self { mac, length })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl UrlEncoder for Base62Encoder {
    fn encode(&self, long_url: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(long_url.as_bytes());
        let digest = mac.finalize().into_bytes();

        encode_base62(&digest[..DIGEST_PREFIX_BYTES], self.length)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Base62
    }
}

/// Encodes up to eight bytes as a fixed-width base62 string.
fn encode_base62(data: &[u8], length: usize) -> String {
    let mut num = data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

    let mut digits = Vec::with_capacity(length);
    while digits.len() < length {
        digits.push(BASE62_ALPHABET[(num % 62) as usize]);
        num /= 62;
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

/// Returns true if `s` is non-empty and only contains base62 characters.
pub fn is_base62(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn encoder(secret: &str, length: usize) -> Base62Encoder {
        Base62Encoder::new(secret, length).unwrap()
    }

    #[test]
    fn test_encode_is_deterministic() {
        let enc = encoder("s3cr3t", 8);
        let first = enc.encode("https://example.com/page");
        let second = enc.encode("https://example.com/page");
        assert_eq!(first, second);

        let other_instance = encoder("s3cr3t", 8);
        assert_eq!(other_instance.encode("https://example.com/page"), first);
    }

    #[test]
    fn test_encode_uses_base62_alphabet() {
        let enc = encoder("s3cr3t", 12);
        for i in 0..200 {
            let code = enc.encode(&format!("https://example.com/{i}"));
            assert!(
                code.bytes().all(|b| BASE62_ALPHABET.contains(&b)),
                "unexpected character in {code}"
            );
        }
    }

    #[test]
    fn test_encode_has_configured_length() {
        for length in [1, 6, 8, 10, 16, 32] {
            let enc = encoder("s3cr3t", length);
            assert_eq!(enc.encode("https://example.com").len(), length);
            assert_eq!(enc.encode("").len(), length);
        }
    }

    #[test]
    fn test_encode_is_key_sensitive() {
        let a = encoder("key-one", 8);
        let b = encoder("key-two", 8);

        let differing = (0..50)
            .map(|i| format!("https://example.com/item/{i}"))
            .filter(|url| a.encode(url) != b.encode(url))
            .count();
        assert_eq!(differing, 50);
    }

    #[test]
    fn test_distinct_urls_spread_out() {
        let enc = encoder("s3cr3t", 8);
        let codes: HashSet<String> = (0..1000)
            .map(|i| enc.encode(&format!("https://example.com/{i}")))
            .collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_empty_secret_is_accepted() {
        let enc = encoder("", 8);
        assert_eq!(enc.encode("https://example.com").len(), 8);
    }

    #[test]
    fn test_encode_base62_known_values() {
        assert_eq!(encode_base62(&[0], 4), "0000");
        assert_eq!(encode_base62(&[61], 2), "0Z");
        assert_eq!(encode_base62(&[62], 2), "10");
        assert_eq!(encode_base62(&[0x01, 0x00], 3), "048");
    }

    #[test]
    fn test_is_base62() {
        assert!(is_base62("aZ09"));
        assert!(!is_base62(""));
        assert!(!is_base62("ab-c"));
        assert!(!is_base62("ab_c"));
        assert!(!is_base62("ü"));
    }
}
