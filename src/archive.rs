//! Game session archival
//!
//! Write-only port for recording that a game happened: one record at
//! start, one at end, plus a per-player outcome row. The engine treats
//! every archive call as best-effort; failures are logged and swallowed
//! and never affect gameplay.

use std::error::Error;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Error raised by archive backends.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The backend could not be reached or rejected the write.
    #[error("archive unavailable: {message}")]
    Unavailable {
        /// What the engine was trying to record.
        message: String,
        /// The backend's own failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Record written when a game starts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    /// Code of the room the game ran in.
    pub room_code: String,
    /// Display name of the hosting screen, when one was given.
    pub host_name: Option<String>,
    /// Category the questions came from.
    pub category: String,
    /// Questions in the game.
    pub question_count: usize,
    /// Players at start time.
    pub player_count: usize,
    /// Epoch milliseconds of the start.
    pub started_at: u64,
}

/// Record written when a game ends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnd {
    /// Reference returned by [`SessionArchive::session_started`].
    pub session_ref: String,
    /// Epoch milliseconds of the end.
    pub ended_at: u64,
}

/// Per-player outcome row written alongside the end record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutcome {
    /// Reference of the session this outcome belongs to.
    pub session_ref: String,
    /// Final dense rank.
    pub final_rank: u32,
    /// Final score.
    pub final_score: u32,
    /// Player display name.
    pub player_name: String,
    /// Questions the game had.
    pub total_questions: usize,
}

/// Sink for game-session records. Never read by the engine.
#[async_trait]
pub trait SessionArchive: Send + Sync {
    /// Records a game start and returns a reference for the end record.
    async fn session_started(&self, record: SessionStart) -> Result<String, ArchiveError>;

    /// Records a game end with its per-player outcomes.
    async fn session_finished(
        &self,
        record: SessionEnd,
        outcomes: Vec<PlayerOutcome>,
    ) -> Result<(), ArchiveError>;
}

/// Archive that drops everything; for deployments without durable
/// storage.
#[derive(Debug, Default)]
pub struct NullArchive;

#[async_trait]
impl SessionArchive for NullArchive {
    async fn session_started(&self, _record: SessionStart) -> Result<String, ArchiveError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn session_finished(
        &self,
        _record: SessionEnd,
        _outcomes: Vec<PlayerOutcome>,
    ) -> Result<(), ArchiveError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Archive that remembers every record it was handed.
    #[derive(Default)]
    pub struct RecordingArchive {
        pub starts: Mutex<Vec<SessionStart>>,
        pub ends: Mutex<Vec<(SessionEnd, Vec<PlayerOutcome>)>>,
    }

    #[async_trait]
    impl SessionArchive for RecordingArchive {
        async fn session_started(&self, record: SessionStart) -> Result<String, ArchiveError> {
            let reference = format!("session-{}", self.starts.lock().unwrap().len());
            self.starts.lock().unwrap().push(record);
            Ok(reference)
        }

        async fn session_finished(
            &self,
            record: SessionEnd,
            outcomes: Vec<PlayerOutcome>,
        ) -> Result<(), ArchiveError> {
            self.ends.lock().unwrap().push((record, outcomes));
            Ok(())
        }
    }

    /// Archive whose writes always fail; for the swallow-and-log paths.
    pub struct BrokenArchive;

    #[async_trait]
    impl SessionArchive for BrokenArchive {
        async fn session_started(&self, _record: SessionStart) -> Result<String, ArchiveError> {
            Err(ArchiveError::Unavailable {
                message: "session start".into(),
                source: "disk on fire".into(),
            })
        }

        async fn session_finished(
            &self,
            _record: SessionEnd,
            _outcomes: Vec<PlayerOutcome>,
        ) -> Result<(), ArchiveError> {
            Err(ArchiveError::Unavailable {
                message: "session end".into(),
                source: "disk on fire".into(),
            })
        }
    }
}
