//! Configuration constants for the trivia engine
//!
//! This module contains the fixed limits and tuning values used throughout
//! the engine: room code shape, scoring formula inputs, phase timing, and
//! the avatar set handed out to joining players.

/// Room identity constants
pub mod room {
    /// Alphabet room codes are drawn from; omits 0/O/I/1/L to avoid
    /// ambiguity when read off a TV screen
    pub const CODE_ALPHABET: &str = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    /// Number of characters in a room code
    pub const CODE_LENGTH: usize = 6;
    /// How many draws the issuer attempts before giving up
    pub const CODE_MAX_ATTEMPTS: usize = 10;
    /// Sliding TTL of a room record in the cache, refreshed on every write
    pub const TTL_SECS: u64 = 4 * 60 * 60;
    /// Cache key prefix for room records
    pub const KEY_PREFIX: &str = "room:";
    /// Cache key of the active-rooms set
    pub const ACTIVE_SET_KEY: &str = "active:rooms";
}

/// Scoring formula constants
pub mod scoring {
    /// Base points awarded for any correct answer
    pub const BASE_POINTS: u32 = 1000;
    /// Fraction of the base recoverable as a speed bonus
    pub const TIME_MULT: f64 = 0.5;
    /// Points added per consecutive prior correct answer
    pub const STREAK_STEP: u32 = 100;
    /// Ceiling on the streak bonus
    pub const STREAK_CAP: u32 = 500;
}

/// Player-facing field limits
pub mod player {
    /// Minimum player name length in characters
    pub const MIN_NAME_LENGTH: usize = 1;
    /// Maximum player name length in characters
    pub const MAX_NAME_LENGTH: usize = 20;
}

/// Room settings bounds
pub mod settings {
    /// Minimum questions per game
    pub const MIN_QUESTION_COUNT: u32 = 5;
    /// Maximum questions per game
    pub const MAX_QUESTION_COUNT: u32 = 30;
    /// Minimum per-question time limit in seconds
    pub const MIN_TIME_LIMIT: u32 = 5;
    /// Maximum per-question time limit in seconds
    pub const MAX_TIME_LIMIT: u32 = 60;
    /// Minimum room capacity
    pub const MIN_MAX_PLAYERS: u32 = 1;
    /// Maximum room capacity
    pub const MAX_MAX_PLAYERS: u32 = 50;
    /// Lower bound on the start-game player requirement
    pub const MIN_MIN_PLAYERS: u32 = 2;
}

/// Phase timing defaults in seconds
pub mod timing {
    /// Lobby-to-question countdown length
    pub const COUNTDOWN_SECS: u32 = 3;
    /// How long the reveal screen is shown
    pub const REVEAL_SECS: u32 = 5;
    /// Extra reveal time when a per-question winner's jingle plays
    pub const WINNER_JINGLE_SECS: u32 = 3;
    /// Slack added to the question deadline to absorb client-to-server
    /// answer latency
    pub const ANSWER_GRACE_SECS: u32 = 1;
    /// Upper bound on a question provider call
    pub const PROVIDER_TIMEOUT_SECS: u64 = 30;
}

/// The fixed avatar set; one per player within a room
pub const AVATARS: [&str; 16] = [
    "🦊", "🐼", "🐸", "🐨", "🦁", "🐯", "🐵", "🐷", "🐮", "🐙", "🦄", "🐲", "🦉", "🐳", "🦖", "🐺",
];
