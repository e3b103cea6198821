//! Wire protocol: typed client payloads and server events
//!
//! The transport carries JSON events with a name and a single payload
//! object. Inbound payloads decode into the request structs here and are
//! validated before any state mutation; outbound traffic is the
//! [`ServerEvent`] enum, each variant knowing its wire name and payload.
//!
//! Question broadcasts use a projection that never contains the correct
//! answer; the full question record only ever leaves the server inside a
//! reveal.

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    code::RoomCode,
    constants::{
        player::{MAX_NAME_LENGTH, MIN_NAME_LENGTH},
        settings::{
            MAX_MAX_PLAYERS, MAX_QUESTION_COUNT, MAX_TIME_LIMIT, MIN_MAX_PLAYERS, MIN_MIN_PLAYERS,
            MIN_QUESTION_COUNT, MIN_TIME_LIMIT,
        },
    },
    error::EngineError,
    events::SocketId,
    room::{Choice, Difficulty, Phase, Player, Question, Room, RoomSettings},
    scorer::{LeaderboardEntry, QuestionResult},
    validate,
};

// ---------------------------------------------------------------------------
// Client → server payloads
// ---------------------------------------------------------------------------

/// `room:create`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Display name of the hosting screen
    #[garde(skip)]
    #[serde(default)]
    pub host_name: Option<String>,
    /// Stable device identifier from the handshake
    #[garde(skip)]
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Player details inside a join payload
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinPlayer {
    /// Requested display name
    #[garde(
        length(chars, min = MIN_NAME_LENGTH, max = MAX_NAME_LENGTH),
        custom(validate::player_name)
    )]
    pub name: String,
    /// Requested avatar; granted when free
    #[garde(inner(custom(validate::avatar)))]
    #[serde(default)]
    pub avatar: Option<String>,
    /// Celebration asset choice
    #[garde(skip)]
    #[serde(default)]
    pub jingle_id: Option<String>,
}

/// Which side of the screen is joining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// The hosting TV re-attaching to its room channel
    Tv,
    /// A mobile player
    Player,
}

/// `room:join`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// tv or player
    #[garde(skip)]
    #[serde(rename = "type")]
    pub kind: JoinKind,
    /// Player details; required for player joins
    #[garde(dive)]
    #[serde(default)]
    pub player: Option<JoinPlayer>,
}

/// `room:rejoin`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejoinRoomRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Name of the player record to rebind
    #[garde(
        length(chars, min = MIN_NAME_LENGTH, max = MAX_NAME_LENGTH),
        custom(validate::player_name)
    )]
    pub player_name: String,
    /// Avatar to use if the rejoin falls back to a fresh join
    #[garde(inner(custom(validate::avatar)))]
    #[serde(default)]
    pub player_avatar: Option<String>,
    /// Jingle to use if the rejoin falls back to a fresh join
    #[garde(skip)]
    #[serde(default)]
    pub player_jingle_id: Option<String>,
}

/// `room:leave`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    /// Room to leave; defaults to the connection's subscribed room
    #[garde(inner(custom(validate::room_code)))]
    #[serde(default)]
    pub room_code: Option<String>,
}

/// `room:kick`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KickPlayerRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Player to remove
    #[garde(skip)]
    pub player_id: SocketId,
}

/// Partial settings accepted by `room:update-settings`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    /// Questions per game
    #[garde(range(min = MIN_QUESTION_COUNT, max = MAX_QUESTION_COUNT))]
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Per-question time limit in seconds
    #[garde(range(min = MIN_TIME_LIMIT, max = MAX_TIME_LIMIT))]
    #[serde(default)]
    pub time_limit: Option<u32>,
    /// Requested difficulty
    #[garde(skip)]
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Catalog category id
    #[garde(skip)]
    #[serde(default)]
    pub category: Option<String>,
    /// Room capacity
    #[garde(range(min = MIN_MAX_PLAYERS, max = MAX_MAX_PLAYERS))]
    #[serde(default)]
    pub max_players: Option<u32>,
    /// Players required to start
    #[garde(range(min = MIN_MIN_PLAYERS))]
    #[serde(default)]
    pub min_players: Option<u32>,
}

impl SettingsPatch {
    /// Shallow-merges the patch into existing settings
    pub fn apply_to(&self, settings: &mut RoomSettings) {
        if let Some(question_count) = self.question_count {
            settings.question_count = question_count;
        }
        if let Some(time_limit) = self.time_limit {
            settings.time_limit = time_limit;
        }
        if let Some(difficulty) = self.difficulty {
            settings.difficulty = difficulty;
        }
        if let Some(category) = &self.category {
            settings.category = category.clone();
        }
        if let Some(max_players) = self.max_players {
            settings.max_players = max_players;
        }
        if let Some(min_players) = self.min_players {
            settings.min_players = min_players;
        }
    }
}

/// `room:update-settings`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Fields to change
    #[garde(dive)]
    pub settings: SettingsPatch,
}

/// `player:update`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateRequest {
    /// Target room; defaults to the connection's subscribed room
    #[garde(inner(custom(validate::room_code)))]
    #[serde(default)]
    pub room_code: Option<String>,
    /// New jingle choice
    #[garde(skip)]
    #[serde(default)]
    pub jingle_id: Option<String>,
    /// New readiness flag
    #[garde(skip)]
    #[serde(default)]
    pub is_ready: Option<bool>,
}

/// Payload shared by the host game-control events
/// (`game:start`, `game:next-question`, `game:pause`, `game:resume`,
/// `game:end`, `game:restart`, `answer:timeout`)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameControlRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
}

/// `answer:submit`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// The chosen option
    #[garde(skip)]
    pub answer: Choice,
    /// Client-side submission timestamp in epoch milliseconds
    #[garde(skip)]
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// `quiz:generate`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Category to draw questions from
    #[garde(length(min = 1))]
    pub category: String,
    /// How many questions to produce
    #[garde(range(min = MIN_QUESTION_COUNT, max = MAX_QUESTION_COUNT))]
    pub question_count: u32,
    /// Requested difficulty
    #[garde(skip)]
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Whether the category is a free-form player topic
    #[garde(skip)]
    #[serde(default)]
    pub is_custom_topic: Option<bool>,
    /// Catalog id of the custom topic, when one exists
    #[garde(skip)]
    #[serde(default)]
    pub topic_id: Option<String>,
}

/// `quiz:select-category`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectCategoryRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Catalog id of the chosen category
    #[garde(length(min = 1))]
    pub category_id: String,
    /// Display name of the chosen category
    #[garde(skip)]
    pub category_name: String,
}

/// `quiz:set-options`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetOptionsRequest {
    /// Target room
    #[garde(custom(validate::room_code))]
    pub room_code: String,
    /// Questions per game
    #[garde(range(min = MIN_QUESTION_COUNT, max = MAX_QUESTION_COUNT))]
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Requested difficulty
    #[garde(skip)]
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Per-question time limit in seconds
    #[garde(range(min = MIN_TIME_LIMIT, max = MAX_TIME_LIMIT))]
    #[serde(default)]
    pub time_limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

/// Client-safe projection of a room record
///
/// Carried in create/join/rejoin acks. Questions are reduced to a count so
/// no correct answer can leak through a room snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room code
    pub code: RoomCode,
    /// Current phase
    pub phase: Phase,
    /// Players in join order
    pub players: Vec<Player>,
    /// How many questions are loaded
    pub question_count: usize,
    /// Index of the active question
    pub current_question_index: usize,
    /// Current settings
    pub settings: RoomSettings,
    /// Creation timestamp in epoch milliseconds
    pub created_at: u64,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            phase: room.phase,
            players: room.players.clone(),
            question_count: room.questions.len(),
            current_question_index: room.current_question_index,
            settings: room.settings.clone(),
            created_at: room.created_at,
        }
    }
}

/// Question projection broadcast while answers are open; never contains
/// the correct answer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    /// The question text
    pub text: String,
    /// The four options
    pub options: crate::room::AnswerOptions,
    /// Effective time limit in seconds
    pub time_limit: u32,
    /// Optional illustration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PublicQuestion {
    /// Projects a question, resolving its effective time limit
    pub fn from_question(question: &Question, default_time_limit: u32) -> Self {
        Self {
            text: question.text.clone(),
            options: question.options.clone(),
            time_limit: question.time_limit.unwrap_or(default_time_limit),
            image_url: question.image_url.clone(),
        }
    }
}

/// Payload of `game:question`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBroadcast {
    /// Zero-based index of the question
    pub question_index: usize,
    /// Total questions this game
    pub total_questions: usize,
    /// The sanitized question
    pub question: PublicQuestion,
    /// Effective time limit in seconds
    pub time_limit: u32,
}

/// Payload shared by `answer:received` and `player:answered`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerProgress {
    /// Who just answered
    pub player_id: SocketId,
    /// Answers collected so far
    pub answer_count: usize,
    /// Connected players expected to answer
    pub total_players: usize,
}

/// Payload of `game:reveal`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealBroadcast {
    /// The correct option
    pub correct_answer: Choice,
    /// Per-player results, best first
    pub results: Vec<QuestionResult>,
    /// Standings after this question
    pub standings: Vec<LeaderboardEntry>,
    /// Best correct scorer, if anyone scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_winner: Option<QuestionResult>,
}

/// Payload of `game:finished`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedBroadcast {
    /// Final standings
    pub standings: Vec<LeaderboardEntry>,
    /// The overall winner, absent only for an empty room
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<LeaderboardEntry>,
}

/// Every event the engine can put on the bus
#[derive(Debug, Clone, derive_more::From)]
pub enum ServerEvent {
    /// Room created; sent to the host alongside the ack
    RoomCreated {
        /// The new room's code
        room_code: RoomCode,
        /// Snapshot of the new room
        room: RoomSnapshot,
    },
    /// A player joined the lobby
    PlayerJoined {
        /// The new player
        player: Player,
        /// Players now in the room
        player_count: usize,
    },
    /// A player reattached to their record
    PlayerRejoined {
        /// The connection id the record was bound to before
        old_player_id: SocketId,
        /// The rebound player
        player: Player,
    },
    /// A player left or was removed
    PlayerLeft {
        /// Who left
        player_id: SocketId,
        /// Players remaining
        player_count: usize,
    },
    /// A player's connection dropped mid-room
    PlayerDisconnected {
        /// Who dropped
        player_id: SocketId,
    },
    /// The hosting TV's connection dropped
    TvDisconnected,
    /// Targeted notice to a kicked player
    Kicked,
    /// Settings changed
    SettingsUpdated {
        /// The full settings after the merge
        settings: RoomSettings,
    },
    /// A player changed their jingle or readiness
    PlayerUpdated {
        /// The updated player
        player: Player,
    },
    /// Every connected player is ready and the room can start
    AllPlayersReady,
    /// Start countdown began
    GameStarting {
        /// Countdown length in seconds
        countdown: u32,
    },
    /// One second of the start countdown
    GameCountdown {
        /// Seconds remaining
        count: u32,
    },
    /// Countdown finished; first question is next
    GameStarted {
        /// Always the question phase
        phase: Phase,
        /// Total questions this game
        question_count: usize,
        /// Index of the first question
        current_question: usize,
    },
    /// A question is open for answers
    #[from]
    GameQuestion(QuestionBroadcast),
    /// One second of the question countdown
    TimerTick {
        /// Seconds remaining in the window
        time_remaining: u32,
    },
    /// The question window closed
    TimerEnd,
    /// Answer progress, legacy name
    AnswerReceived(AnswerProgress),
    /// Answer progress, current name; same payload as `AnswerReceived`
    PlayerAnswered(AnswerProgress),
    /// Every connected player has answered
    AnswerAllReceived,
    /// Question resolved; correct answer and results
    #[from]
    GameReveal(RevealBroadcast),
    /// Standings interstitial; reserved for the variant that surfaces one,
    /// the direct reveal path does not emit it
    GameLeaderboard {
        /// Standings to display
        standings: Vec<LeaderboardEntry>,
    },
    /// Game over
    #[from]
    GameFinished(FinishedBroadcast),
    /// Host paused the game
    GamePaused,
    /// Host resumed the game
    GameResumed,
    /// Scores zeroed and questions cleared; back to the lobby
    GameRestarted {
        /// Always the lobby phase
        phase: Phase,
    },
    /// Question generation started
    QuizGenerating,
    /// Question generation finished
    QuizGenerated {
        /// How many questions are loaded
        questions: usize,
    },
    /// Host picked a category
    QuizCategorySelected {
        /// Catalog id
        category_id: String,
        /// Display name
        category_name: String,
    },
    /// Question generation failed
    QuizError {
        /// Short user-facing reason
        error: String,
    },
}

impl ServerEvent {
    /// The event's wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room:created",
            Self::PlayerJoined { .. } => "room:player-joined",
            Self::PlayerRejoined { .. } => "room:player-rejoined",
            Self::PlayerLeft { .. } => "room:player-left",
            Self::PlayerDisconnected { .. } => "room:player-disconnected",
            Self::TvDisconnected => "room:tv-disconnected",
            Self::Kicked => "room:kicked",
            Self::SettingsUpdated { .. } => "room:settings-updated",
            Self::PlayerUpdated { .. } => "room:player-updated",
            Self::AllPlayersReady => "room:all-players-ready",
            Self::GameStarting { .. } => "game:starting",
            Self::GameCountdown { .. } => "game:countdown",
            Self::GameStarted { .. } => "game:started",
            Self::GameQuestion(_) => "game:question",
            Self::TimerTick { .. } => "timer:tick",
            Self::TimerEnd => "timer:end",
            Self::AnswerReceived(_) => "answer:received",
            Self::PlayerAnswered(_) => "player:answered",
            Self::AnswerAllReceived => "answer:all-received",
            Self::GameReveal(_) => "game:reveal",
            Self::GameLeaderboard { .. } => "game:leaderboard",
            Self::GameFinished(_) => "game:finished",
            Self::GamePaused => "game:paused",
            Self::GameResumed => "game:resumed",
            Self::GameRestarted { .. } => "game:restarted",
            Self::QuizGenerating => "quiz:generating",
            Self::QuizGenerated { .. } => "quiz:generated",
            Self::QuizCategorySelected { .. } => "quiz:category-selected",
            Self::QuizError { .. } => "quiz:error",
        }
    }

    /// The event's JSON payload
    ///
    /// # Panics
    ///
    /// Serialization of these payloads cannot fail with the default
    /// serializer.
    pub fn payload(&self) -> Value {
        match self {
            Self::RoomCreated { room_code, room } => {
                json!({ "roomCode": room_code, "room": room })
            }
            Self::PlayerJoined {
                player,
                player_count,
            } => json!({ "player": player, "playerCount": player_count }),
            Self::PlayerRejoined {
                old_player_id,
                player,
            } => json!({ "oldPlayerId": old_player_id, "player": player }),
            Self::PlayerLeft {
                player_id,
                player_count,
            } => json!({ "playerId": player_id, "playerCount": player_count }),
            Self::PlayerDisconnected { player_id } => json!({ "playerId": player_id }),
            Self::TvDisconnected
            | Self::Kicked
            | Self::AllPlayersReady
            | Self::TimerEnd
            | Self::AnswerAllReceived
            | Self::GamePaused
            | Self::GameResumed
            | Self::QuizGenerating => json!({}),
            Self::SettingsUpdated { settings } => json!({ "settings": settings }),
            Self::PlayerUpdated { player } => json!({ "player": player }),
            Self::GameStarting { countdown } => json!({ "countdown": countdown }),
            Self::GameCountdown { count } => json!({ "count": count }),
            Self::GameStarted {
                phase,
                question_count,
                current_question,
            } => json!({
                "phase": phase,
                "questionCount": question_count,
                "currentQuestion": current_question,
            }),
            Self::GameQuestion(broadcast) => {
                serde_json::to_value(broadcast).expect("default serializer cannot fail")
            }
            Self::TimerTick { time_remaining } => json!({ "timeRemaining": time_remaining }),
            Self::AnswerReceived(progress) | Self::PlayerAnswered(progress) => {
                serde_json::to_value(progress).expect("default serializer cannot fail")
            }
            Self::GameReveal(reveal) => {
                serde_json::to_value(reveal).expect("default serializer cannot fail")
            }
            Self::GameLeaderboard { standings } => json!({ "standings": standings }),
            Self::GameFinished(finished) => {
                serde_json::to_value(finished).expect("default serializer cannot fail")
            }
            Self::GameRestarted { phase } => json!({ "phase": phase }),
            Self::QuizGenerated { questions } => json!({ "questions": questions }),
            Self::QuizCategorySelected {
                category_id,
                category_name,
            } => json!({ "categoryId": category_id, "categoryName": category_name }),
            Self::QuizError { error } => json!({ "error": error }),
        }
    }
}

// ---------------------------------------------------------------------------
// Acknowledgement envelope
// ---------------------------------------------------------------------------

/// Builds a success acknowledgement, merging `extra` fields into the
/// envelope
pub fn ack_ok(extra: Value) -> Value {
    let mut envelope = json!({ "success": true });
    if let (Some(envelope_map), Value::Object(extra_map)) = (envelope.as_object_mut(), extra) {
        for (key, value) in extra_map {
            envelope_map.insert(key, value);
        }
    }
    envelope
}

/// Builds a failure acknowledgement carrying the error's wire message
pub fn ack_err(error: &EngineError) -> Value {
    json!({ "success": false, "error": error.to_string() })
}
