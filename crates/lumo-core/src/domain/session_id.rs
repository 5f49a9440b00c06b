//! Session identifiers: the short pairing code a remote types in.
//!
//! A session code is 8 characters drawn from an alphabet that leaves out the
//! visually confusable characters `0`, `O`, `1` and `I`, so a code read off a
//! teleprompter screen across a room can be typed on a phone without
//! guessing.  Codes are case-insensitive: both sides normalise to uppercase
//! before comparing or routing.
//!
//! # Two ways to build one
//!
//! - [`SessionId::parse`] is strict and is what clients use for user input.
//! - [`SessionId::from_path_segment`] is lenient and is what the relay uses
//!   for the `/session/{id}` path.  The relay does not validate codes beyond
//!   basic hygiene; it simply creates an empty session for any code it has
//!   not seen before.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters a generated session code may contain.
pub const SESSION_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a generated session code.
pub const SESSION_ID_LEN: usize = 8;

/// Upper bound on the length of a path segment the relay will accept as a
/// session identifier.
pub const MAX_PATH_SEGMENT_LEN: usize = 64;

/// Reasons a user-supplied session code is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    /// The code is empty after trimming whitespace.
    #[error("session code is empty")]
    Empty,

    /// The code does not have exactly [`SESSION_ID_LEN`] characters.
    #[error("session code must be {SESSION_ID_LEN} characters, got {0}")]
    WrongLength(usize),

    /// The code contains a character outside [`SESSION_ALPHABET`].
    #[error("session code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A case-normalised session identifier.
///
/// The inner string is always uppercase.  Serialises as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random code from [`SESSION_ALPHABET`].
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code: String = (0..SESSION_ID_LEN)
            .map(|_| SESSION_ALPHABET[rng.random_range(0..SESSION_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parses a code typed by a user.
    ///
    /// Surrounding whitespace is ignored and lowercase letters are accepted,
    /// so `" qx7k2m9p "` parses to `QX7K2M9P`.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionIdError`] if the code is empty, has the wrong
    /// length, or contains a character outside the session alphabet.
    pub fn parse(input: &str) -> Result<Self, SessionIdError> {
        let normalised = input.trim().to_ascii_uppercase();
        if normalised.is_empty() {
            return Err(SessionIdError::Empty);
        }
        let len = normalised.chars().count();
        if len != SESSION_ID_LEN {
            return Err(SessionIdError::WrongLength(len));
        }
        if let Some(bad) = normalised
            .chars()
            .find(|c| !c.is_ascii() || !SESSION_ALPHABET.contains(&(*c as u8)))
        {
            return Err(SessionIdError::InvalidCharacter(bad));
        }
        Ok(Self(normalised))
    }

    /// Builds an identifier from a URL path segment on the relay side.
    ///
    /// Accepts any non-empty ASCII alphanumeric segment up to
    /// [`MAX_PATH_SEGMENT_LEN`] characters and uppercases it.  Returns `None`
    /// for anything else.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        if segment.is_empty()
            || segment.len() > MAX_PATH_SEGMENT_LEN
            || !segment.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        Some(Self(segment.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_eight_characters_from_alphabet() {
        for _ in 0..200 {
            let id = SessionId::generate();
            assert_eq!(id.as_str().len(), SESSION_ID_LEN);
            assert!(
                id.as_str().bytes().all(|b| SESSION_ALPHABET.contains(&b)),
                "{id} contains a character outside the alphabet"
            );
        }
    }

    #[test]
    fn test_generated_codes_parse_back() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()), Ok(id));
    }

    #[test]
    fn test_alphabet_excludes_confusable_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!SESSION_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_parse_normalises_case_and_whitespace() {
        // Arrange / Act
        let id = SessionId::parse("  qx7k2m9p\n").unwrap();

        // Assert
        assert_eq!(id.as_str(), "QX7K2M9P");
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert_eq!(SessionId::parse("   "), Err(SessionIdError::Empty));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(SessionId::parse("ABC"), Err(SessionIdError::WrongLength(3)));
    }

    #[test]
    fn test_parse_rejects_confusable_character() {
        // 'O' is not part of the alphabet even though it looks like a letter code.
        assert_eq!(
            SessionId::parse("QX7K2MOP"),
            Err(SessionIdError::InvalidCharacter('O'))
        );
    }

    #[test]
    fn test_from_path_segment_uppercases() {
        let id = SessionId::from_path_segment("abc123").unwrap();
        assert_eq!(id.as_str(), "ABC123");
    }

    #[test]
    fn test_from_path_segment_rejects_empty_and_punctuation() {
        assert!(SessionId::from_path_segment("").is_none());
        assert!(SessionId::from_path_segment("ab-cd").is_none());
        assert!(SessionId::from_path_segment(&"A".repeat(MAX_PATH_SEGMENT_LEN + 1)).is_none());
    }

    #[test]
    fn test_serialises_as_plain_string() {
        let id = SessionId::parse("QX7K2M9P").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"QX7K2M9P\"");
    }
}
