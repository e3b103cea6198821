//! Room code generation and management
//!
//! Room codes are six characters drawn from a restricted alphabet that
//! omits easily-confused glyphs, so they can be read off a shared screen
//! and typed on a phone without ambiguity. The issuer draws candidates at
//! random and probes the store until it finds a free one.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::{
    constants::room::{CODE_ALPHABET, CODE_LENGTH, CODE_MAX_ATTEMPTS},
    error::{EngineError, EngineResult},
    store::RoomStore,
};

/// A unique identifier for an active room
///
/// Codes are uppercase alphanumeric and exactly six characters. Generated
/// codes only ever use the restricted alphabet, but parsing accepts the
/// full `[A-Z0-9]` range so that codes typed by clients round-trip.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct RoomCode(String);

impl RoomCode {
    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error returned when a string is not a well-formed room code
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid room code")]
pub struct ParseCodeError;

impl FromStr for RoomCode {
    type Err = ParseCodeError;

    /// Parses a room code, requiring exactly six `[A-Z0-9]` characters
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == CODE_LENGTH
            && s.chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            Ok(Self(s.to_owned()))
        } else {
            Err(ParseCodeError)
        }
    }
}

/// Source of candidate room codes
///
/// Abstracted so tests can pin the draw sequence; production uses
/// [`RandomCodes`].
pub trait CodeSource: Send + Sync {
    /// Draws one candidate code
    fn draw(&self) -> RoomCode;
}

/// Draws codes uniformly from the restricted alphabet
#[derive(Debug, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn draw(&self) -> RoomCode {
        let alphabet = CODE_ALPHABET.as_bytes();
        let code = (0..CODE_LENGTH)
            .map(|_| alphabet[fastrand::usize(..alphabet.len())] as char)
            .collect();
        RoomCode(code)
    }
}

/// Allocates codes that are not currently in use
///
/// Collisions are resolved by redrawing; after the attempt budget is spent
/// the issuer reports exhaustion, which in practice signals a store fault
/// rather than a full alphabet.
pub struct RoomCodeIssuer {
    source: Box<dyn CodeSource>,
}

impl RoomCodeIssuer {
    /// Creates an issuer drawing from the given source
    pub fn new(source: Box<dyn CodeSource>) -> Self {
        Self { source }
    }

    /// Returns a code with no active room behind it
    ///
    /// # Errors
    ///
    /// `EngineError::CodeExhausted` if every draw collided, or a store
    /// error if the free-probe itself failed.
    pub async fn issue(&self, store: &RoomStore) -> EngineResult<RoomCode> {
        for _ in 0..CODE_MAX_ATTEMPTS {
            let code = self.source.draw();
            if !store.exists(&code).await? {
                return Ok(code);
            }
        }
        Err(EngineError::CodeExhausted)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{CodeSource, RoomCode};

    /// Hands out a fixed sequence of codes, repeating the last one forever.
    pub struct FixedCodes {
        remaining: Mutex<Vec<RoomCode>>,
        last: RoomCode,
    }

    impl FixedCodes {
        pub fn new(codes: &[&str]) -> Self {
            let mut parsed: Vec<RoomCode> = codes.iter().map(|c| c.parse().unwrap()).collect();
            let last = parsed.last().cloned().unwrap();
            parsed.reverse();
            Self {
                remaining: Mutex::new(parsed),
                last,
            }
        }
    }

    impl CodeSource for FixedCodes {
        fn draw(&self) -> RoomCode {
            self.remaining
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| self.last.clone())
        }
    }
}
