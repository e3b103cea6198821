//! Engine error taxonomy
//!
//! Every client-facing operation resolves to either a typed success payload
//! or one of these errors. The `Display` strings are exactly what goes back
//! over the wire in acknowledgement callbacks; they stay short and never
//! leak internals.

use thiserror::Error;

use crate::store::StoreError;

/// Result alias used by manager and engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced through acknowledgement callbacks.
///
/// The variants map one-to-one onto the error classes the protocol defines:
/// validation, not-found, authorization, conflict, precondition, and
/// service-unavailable.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Payload failed schema validation; the message concatenates every
    /// violation. No state was touched.
    #[error("{0}")]
    Validation(String),

    /// The room code does not resolve to an active room.
    #[error("Room not found")]
    RoomNotFound,

    /// A host-only operation was attempted by a non-host connection.
    #[error("Only host can {0}")]
    NotHost(&'static str),

    /// Another player in the room already uses this name
    /// (case-insensitively).
    #[error("Name already taken")]
    NameTaken,

    /// The player already submitted an answer for the current question.
    #[error("Already answered")]
    AlreadyAnswered,

    /// The room is not in the question phase, or the question window has
    /// closed.
    #[error("Not accepting answers")]
    NotAcceptingAnswers,

    /// Join attempted while the room's game is running.
    #[error("Game already in progress")]
    GameInProgress,

    /// The room is at its configured player capacity.
    #[error("Room is full")]
    RoomFull,

    /// The code issuer exhausted its draw attempts; indicates a store fault
    /// rather than genuine alphabet exhaustion.
    #[error("Failed to allocate a room code")]
    CodeExhausted,

    /// Start requested with fewer connected players than the room requires.
    #[error("Need at least {0} players")]
    NeedPlayers(u32),

    /// Start requested before any questions were loaded.
    #[error("No questions loaded")]
    NoQuestions,

    /// The question pipeline produced nothing for the requested category.
    #[error("Failed to generate questions")]
    QuizGenerationFailed,

    /// Cache or downstream I/O failure; the action that failed is named,
    /// the cause is logged server-side only.
    #[error("Failed to {0}")]
    Unavailable(&'static str),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => EngineError::RoomNotFound,
            StoreError::CodeInUse => EngineError::Unavailable("create room"),
            StoreError::Conflict(_) | StoreError::Backend(_) => {
                EngineError::Unavailable("update room")
            }
        }
    }
}
