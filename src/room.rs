//! Room data model
//!
//! This module defines the per-game aggregate that lives in the cache: the
//! room itself, its players, the loaded questions, collected answers, and
//! the adjustable settings. The record is serialized as JSON and is the
//! single source of truth for a game; everything observable by clients is
//! derived from it.

use serde::{Deserialize, Serialize};

use crate::{code::RoomCode, events::SocketId};

/// The current state of a room's game state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for players; settings and questions can change
    Lobby,
    /// Start countdown is running
    Starting,
    /// A question is on screen and answers are being admitted
    Question,
    /// Correct answer and per-question results are shown
    Reveal,
    /// Standings interstitial between questions; the engine currently takes
    /// the direct reveal path and does not enter this phase
    Leaderboard,
    /// Game over; standings are final
    #[serde(rename = "final")]
    Final,
}

/// One of the four answer options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    /// Option A
    A,
    /// Option B
    B,
    /// Option C
    C,
    /// Option D
    D,
}

impl Choice {
    /// Parses a single-letter option label
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

/// The four option texts of a question, all required and non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOptions {
    /// Text shown for option A
    #[serde(rename = "A")]
    pub a: String,
    /// Text shown for option B
    #[serde(rename = "B")]
    pub b: String,
    /// Text shown for option C
    #[serde(rename = "C")]
    pub c: String,
    /// Text shown for option D
    #[serde(rename = "D")]
    pub d: String,
}

/// A single trivia question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Catalog identifier
    pub id: String,
    /// The question text
    pub text: String,
    /// The four answer options
    pub options: AnswerOptions,
    /// Which option is correct; only ever revealed after the question closes
    pub correct_answer: Choice,
    /// Per-question time limit in seconds; falls back to the room setting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    /// Optional illustration shown with the question
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A player's submitted answer for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Who answered
    pub player_id: SocketId,
    /// Which question this answer belongs to
    pub question_index: usize,
    /// The chosen option
    pub answer: Choice,
    /// Client-reported submission timestamp in epoch milliseconds
    pub timestamp: u64,
    /// Server-computed milliseconds since the question was broadcast
    pub time_elapsed: u64,
}

/// Difficulty requested from the question sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy questions only
    Easy,
    /// Medium questions only
    Medium,
    /// Hard questions only
    Hard,
    /// A blend of all difficulties
    Mixed,
}

/// Adjustable per-room settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Questions per game
    pub question_count: u32,
    /// Default per-question time limit in seconds
    pub time_limit: u32,
    /// Requested difficulty
    pub difficulty: Difficulty,
    /// Catalog category the questions come from
    pub category: String,
    /// Room capacity
    pub max_players: u32,
    /// Players required before the game can start
    pub min_players: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            question_count: 10,
            time_limit: 20,
            difficulty: Difficulty::Mixed,
            category: String::new(),
            max_players: 50,
            min_players: 2,
        }
    }
}

/// A participant who joined the room from a mobile device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Connection identity at join time; rebound on rejoin
    pub id: SocketId,
    /// Display name, unique within the room case-insensitively
    pub name: String,
    /// Emoji avatar from the fixed set
    pub avatar: String,
    /// Total points earned this game; never decreases except on restart
    pub score: u32,
    /// Consecutive correct answers; reset to zero on a miss
    pub streak: u32,
    /// Celebration asset chosen by the player
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jingle_id: Option<String>,
    /// Whether the player's connection is currently live
    pub is_connected: bool,
    /// Informational host marker
    pub is_host: bool,
    /// Lobby readiness flag
    pub is_ready: bool,
}

impl Player {
    /// Creates a freshly-joined, connected player
    pub fn new(id: SocketId, name: String, avatar: String, jingle_id: Option<String>) -> Self {
        Self {
            id,
            name,
            avatar,
            score: 0,
            streak: 0,
            jingle_id,
            is_connected: true,
            is_host: false,
            is_ready: false,
        }
    }
}

/// The top-level aggregate for one game instance
///
/// Player order is join order and is observable to clients. Questions are
/// set exactly once per game (before the phase leaves lobby) and cleared
/// only by restart. Answers are collected during the question phase and
/// cleared when the next question begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Six-character identifier, unique across active rooms
    pub code: RoomCode,
    /// Connection id of the hosting TV
    pub host_id: SocketId,
    /// Current state machine phase
    pub phase: Phase,
    /// Players ordered by join time
    pub players: Vec<Player>,
    /// The question list for the running game
    pub questions: Vec<Question>,
    /// Index of the active question; equals `questions.len()` only once the
    /// game is final
    pub current_question_index: usize,
    /// Answers collected for the active question
    pub current_answers: Vec<Answer>,
    /// Epoch milliseconds when the active question was broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_start_time: Option<u64>,
    /// Adjustable settings
    pub settings: RoomSettings,
    /// Epoch milliseconds of room creation
    pub created_at: u64,
}

impl Room {
    /// Creates a new room in the lobby phase with no players
    pub fn new(code: RoomCode, host_id: SocketId, settings: RoomSettings, created_at: u64) -> Self {
        Self {
            code,
            host_id,
            phase: Phase::Lobby,
            players: Vec::new(),
            questions: Vec::new(),
            current_question_index: 0,
            current_answers: Vec::new(),
            question_start_time: None,
            settings,
            created_at,
        }
    }

    /// Finds a player by connection id
    pub fn player(&self, id: &SocketId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Finds a player by connection id, mutably
    pub fn player_mut(&mut self, id: &SocketId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Finds a player by name, compared case-insensitively
    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Finds a player by name, compared case-insensitively, mutably
    pub fn player_by_name_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Number of players whose connection is live
    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected).count()
    }

    /// The question at the current index, if the game has one active
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    /// Effective time limit in seconds for the question at `index`
    pub fn time_limit_for(&self, index: usize) -> u32 {
        self.questions
            .get(index)
            .and_then(|q| q.time_limit)
            .unwrap_or(self.settings.time_limit)
    }

    /// Whether the player already answered the question at `index`
    pub fn has_answered(&self, player_id: &SocketId, index: usize) -> bool {
        self.current_answers
            .iter()
            .any(|a| a.question_index == index && &a.player_id == player_id)
    }

    /// Answers recorded for the question at `index`
    pub fn answers_for(&self, index: usize) -> Vec<Answer> {
        self.current_answers
            .iter()
            .filter(|a| a.question_index == index)
            .cloned()
            .collect()
    }

    /// Whether every connected player has marked themselves ready and the
    /// room holds enough players to start
    pub fn all_ready(&self) -> bool {
        self.players.len() >= self.settings.min_players as usize
            && self
                .players
                .iter()
                .filter(|p| p.is_connected)
                .all(|p| p.is_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room::new(
            "AB2C3D".parse().unwrap(),
            SocketId::from("tv-1"),
            RoomSettings::default(),
            1_000,
        )
    }

    fn question(correct: Choice) -> Question {
        Question {
            id: "q1".into(),
            text: "Q1".into(),
            options: AnswerOptions {
                a: "a".into(),
                b: "b".into(),
                c: "c".into(),
                d: "d".into(),
            },
            correct_answer: correct,
            time_limit: None,
            image_url: None,
        }
    }

    #[test]
    fn default_settings_match_the_documented_values() {
        let settings = RoomSettings::default();
        assert_eq!(settings.question_count, 10);
        assert_eq!(settings.time_limit, 20);
        assert_eq!(settings.max_players, 50);
        assert_eq!(settings.min_players, 2);
        assert!(matches!(settings.difficulty, Difficulty::Mixed));
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let mut room = room();
        room.players.push(Player::new(
            SocketId::from("p1"),
            "Alice".into(),
            "🦊".into(),
            None,
        ));
        assert!(room.player_by_name("alice").is_some());
        assert!(room.player_by_name("ALICE").is_some());
        assert!(room.player_by_name("Bob").is_none());
    }

    #[test]
    fn time_limit_falls_back_to_settings() {
        let mut room = room();
        room.questions.push(question(Choice::B));
        room.questions.push(Question {
            time_limit: Some(7),
            ..question(Choice::A)
        });
        assert_eq!(room.time_limit_for(0), 20);
        assert_eq!(room.time_limit_for(1), 7);
    }

    #[test]
    fn answers_are_tracked_per_question_index() {
        let mut room = room();
        let pid = SocketId::from("p1");
        room.current_answers.push(Answer {
            player_id: pid.clone(),
            question_index: 0,
            answer: Choice::B,
            timestamp: 0,
            time_elapsed: 500,
        });
        assert!(room.has_answered(&pid, 0));
        assert!(!room.has_answered(&pid, 1));
        assert_eq!(room.answers_for(0).len(), 1);
        assert!(room.answers_for(1).is_empty());
    }

    #[test]
    fn readiness_requires_min_players_and_all_connected_ready() {
        let mut room = room();
        let mut p1 = Player::new(SocketId::from("p1"), "Alice".into(), "🦊".into(), None);
        p1.is_ready = true;
        room.players.push(p1);
        // One ready player is not enough for a two-player minimum.
        assert!(!room.all_ready());

        let mut p2 = Player::new(SocketId::from("p2"), "Bob".into(), "🐼".into(), None);
        p2.is_ready = false;
        room.players.push(p2);
        assert!(!room.all_ready());

        room.players[1].is_ready = true;
        assert!(room.all_ready());

        // A disconnected unready player does not block readiness.
        room.players[1].is_ready = false;
        room.players[1].is_connected = false;
        assert!(room.all_ready());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut room = room();
        room.questions.push(question(Choice::B));
        room.players.push(Player::new(
            SocketId::from("p1"),
            "Alice".into(),
            "🦊".into(),
            Some("jingle-7".into()),
        ));
        let json = serde_json::to_string(&room).unwrap();
        let back: Room = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, room.code);
        assert_eq!(back.players.len(), 1);
        assert_eq!(back.players[0].name, "Alice");
        assert_eq!(back.questions[0].correct_answer, Choice::B);
        assert!(matches!(back.phase, Phase::Lobby));
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Lobby).unwrap(), "\"lobby\"");
        assert_eq!(serde_json::to_string(&Phase::Final).unwrap(), "\"final\"");
        assert_eq!(
            serde_json::to_string(&Phase::Leaderboard).unwrap(),
            "\"leaderboard\""
        );
    }
}
