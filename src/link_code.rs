use std::{fmt, ops::RangeInclusive};

use thiserror::Error;

/// Characters a [`LinkCode`] may consist of.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Allowed length (in characters) of a [`LinkCode`].
pub const LENGTH: RangeInclusive<usize> = 6..=8;

/// Valid codes that would be shadowed by a fixed route.
pub const RESERVED: &[&str] = &["healthz"];

/// The short identifier of a link, guaranteed to match `[A-Za-z0-9]{6,8}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkCode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkCodeValidationError {
    #[error("code must be {min} to {max} characters long, got {length}", min = LENGTH.start(), max = LENGTH.end())]
    InvalidLength { length: usize },
    #[error("code may only contain letters and digits; found {invalid_chars:?}")]
    InvalidCharacters { invalid_chars: String },
}

impl LinkCode {
    /// # Errors
    /// Will return [`Err`] if `code` does not match `[A-Za-z0-9]{6,8}`.
    pub fn new(code: String) -> Result<Self, LinkCodeValidationError> {
        let invalid_chars: String = code.chars().filter(|c| !c.is_ascii_alphanumeric()).collect();
        if !invalid_chars.is_empty() {
            return Err(LinkCodeValidationError::InvalidCharacters { invalid_chars });
        }

        // NOTE: only ASCII remains at this point, so bytes == chars
        if !LENGTH.contains(&code.len()) {
            return Err(LinkCodeValidationError::InvalidLength {
                length: code.len(),
            });
        }

        Ok(Self(code))
    }

    /// Generates a random code of random (allowed) length.
    #[must_use]
    pub fn generate() -> Self {
        let length = rand::random_range(LENGTH);
        let code = std::iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
            .take(length)
            .collect();
        Self(code)
    }

    /// Whether `GET /{code}` would hit another route instead of the redirect.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        RESERVED.contains(&self.0.as_str())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LinkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_new_accepts_boundary_lengths() {
        for code in ["abc123", "ABCdef1", "a1B2c3D4"] {
            assert_eq!(LinkCode::new(code.to_owned()).unwrap().as_str(), code);
        }
    }

    #[test]
    fn test_new_rejects_too_short() {
        assert_eq!(
            LinkCode::new("abc12".to_owned()),
            Err(LinkCodeValidationError::InvalidLength { length: 5 })
        );
    }

    #[test]
    fn test_new_rejects_too_long() {
        assert_eq!(
            LinkCode::new("abcdef123".to_owned()),
            Err(LinkCodeValidationError::InvalidLength { length: 9 })
        );
    }

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(
            LinkCode::new(String::new()),
            Err(LinkCodeValidationError::InvalidLength { length: 0 })
        );
    }

    #[test]
    fn test_new_reports_every_invalid_char() {
        assert_eq!(
            LinkCode::new("ab-c_d é".to_owned()),
            Err(LinkCodeValidationError::InvalidCharacters {
                invalid_chars: "-_ é".to_owned()
            })
        );
    }

    #[test]
    fn test_new_rejects_non_ascii_alphanumerics() {
        // 6 chars, but 'ä' is outside [A-Za-z0-9]
        assert!(matches!(
            LinkCode::new("abcdeä".to_owned()),
            Err(LinkCodeValidationError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn test_generate_matches_pattern() {
        for _ in 0..1000 {
            let code = LinkCode::generate();
            assert!(LENGTH.contains(&code.as_str().len()), "bad length: {code}");
            assert!(code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
            assert_eq!(LinkCode::new(code.clone().into_inner()), Ok(code));
        }
    }

    #[test]
    fn test_generate_covers_every_length() {
        let lengths: HashSet<_> = (0..1000)
            .map(|_| LinkCode::generate().as_str().len())
            .collect();
        assert_eq!(lengths, LENGTH.collect::<HashSet<_>>());
    }

    #[test]
    fn test_reserved_codes_are_otherwise_valid() {
        for &reserved in RESERVED {
            let code = LinkCode::new(reserved.to_owned()).unwrap();
            assert!(code.is_reserved(), "{reserved}");
        }
        assert!(!LinkCode::new("HEALTHZ".to_owned()).unwrap().is_reserved());
    }

    #[test]
    fn test_alphabet_is_62_unique_alphanumerics() {
        let unique: HashSet<_> = ALPHABET.iter().collect();
        assert_eq!(unique.len(), 62);
        assert!(ALPHABET.iter().all(u8::is_ascii_alphanumeric));
    }
}
