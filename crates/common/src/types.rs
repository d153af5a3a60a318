//! Room identifiers and participant credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum accepted length of a room identifier.
pub const MAX_ROOM_ID_LENGTH: usize = 64;

/// Maximum accepted length of a participant token.
pub const MAX_TOKEN_LENGTH: usize = 128;

/// Rejected identifier or token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidIdentifier {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier exceeds {0} characters")]
    TooLong(usize),

    #[error("identifier contains a disallowed character")]
    BadCharacter,
}

fn validate(raw: &str, max_len: usize) -> Result<(), InvalidIdentifier> {
    if raw.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }
    if raw.len() > max_len {
        return Err(InvalidIdentifier::TooLong(max_len));
    }
    if !raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(InvalidIdentifier::BadCharacter);
    }
    Ok(())
}

/// Opaque room identifier.
///
/// Doubles as the store key namespace and the realtime channel name, so it is
/// restricted to `[A-Za-z0-9_-]` and can be embedded in keys, cookie names and
/// URLs without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room identifier taken from a path or a store key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if the value is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        validate(raw, MAX_ROOM_ID_LENGTH)?;
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key of the room metadata hash.
    #[must_use]
    pub fn meta_key(&self) -> String {
        format!("meta:{}", self.0)
    }

    /// Store key of the room message log.
    #[must_use]
    pub fn messages_key(&self) -> String {
        format!("messages:{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value, MAX_ROOM_ID_LENGTH)?;
        Ok(Self(value))
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

/// Opaque per-(browser, room) credential proving room membership.
///
/// `Debug` is redacted; use [`ParticipantToken::expose`] when the raw value
/// has to be written to the store or a cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ParticipantToken(String);

impl ParticipantToken {
    /// Wrap a token presented by a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` for values that could never have been
    /// issued (empty, oversized, or containing separators).
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        validate(raw, MAX_TOKEN_LENGTH)?;
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ParticipantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParticipantToken([REDACTED])")
    }
}
