//! Scoring and leaderboard computation
//!
//! Pure functions, no I/O. A correct answer earns a fixed base plus a
//! speed bonus that decays linearly over the question window, plus a
//! capped bonus for the player's streak going into the question. Wrong or
//! absent answers earn nothing and break the streak.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    constants::scoring::{BASE_POINTS, STREAK_CAP, STREAK_STEP, TIME_MULT},
    events::SocketId,
    room::{Answer, Choice, Player, Question, Room},
};

/// Outcome of one question for one player
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    /// Who this result belongs to
    pub player_id: SocketId,
    /// The submitted option, if the player answered
    pub answer: Option<Choice>,
    /// Whether the submitted option was the correct one
    pub is_correct: bool,
    /// Points earned on this question
    pub points_earned: u32,
    /// The player's total after this question
    pub new_score: u32,
    /// The player's streak after this question
    pub streak: u32,
    /// Milliseconds from question broadcast to submission
    pub time_elapsed: Option<u64>,
}

/// One row of the standings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Who this row belongs to
    pub player_id: SocketId,
    /// Display name
    pub name: String,
    /// Emoji avatar
    pub avatar: String,
    /// Total points
    pub score: u32,
    /// Dense rank, starting at 1; equal scores share a rank
    pub rank: u32,
}

/// Points for a single correct answer
///
/// `prior_streak` is the player's streak before this question resolves.
pub fn points_for_correct(elapsed_ms: u64, time_limit_secs: u32, prior_streak: u32) -> u32 {
    let window_ms = u64::from(time_limit_secs) * 1000;
    let time_ratio = (1.0 - elapsed_ms as f64 / window_ms as f64).max(0.0);
    let time_bonus = (f64::from(BASE_POINTS) * time_ratio * TIME_MULT).floor() as u32;
    let streak_bonus = (prior_streak * STREAK_STEP).min(STREAK_CAP);
    BASE_POINTS + time_bonus + streak_bonus
}

/// Computes one result per player in the room for a resolved question
///
/// Results are sorted by points earned descending, ties broken by elapsed
/// time ascending. Scores and streaks in the results reflect the state the
/// players should be persisted with.
pub fn compute_results(
    room: &Room,
    question: &Question,
    answers: &[Answer],
) -> Vec<QuestionResult> {
    room.players
        .iter()
        .map(|player| {
            let answer = answers.iter().find(|a| a.player_id == player.id);
            let is_correct = answer.is_some_and(|a| a.answer == question.correct_answer);
            let points_earned = if is_correct {
                let elapsed = answer.map_or(0, |a| a.time_elapsed);
                let limit = question.time_limit.unwrap_or(room.settings.time_limit);
                points_for_correct(elapsed, limit, player.streak)
            } else {
                0
            };
            QuestionResult {
                player_id: player.id.clone(),
                answer: answer.map(|a| a.answer),
                is_correct,
                points_earned,
                new_score: player.score + points_earned,
                streak: if is_correct { player.streak + 1 } else { 0 },
                time_elapsed: answer.map(|a| a.time_elapsed),
            }
        })
        .sorted_by(|a, b| {
            b.points_earned.cmp(&a.points_earned).then(
                a.time_elapsed
                    .unwrap_or(u64::MAX)
                    .cmp(&b.time_elapsed.unwrap_or(u64::MAX)),
            )
        })
        .collect()
}

/// The per-question winner among computed results, if anyone scored
///
/// Results are already ordered best-first, so the winner is the first
/// correct, point-earning entry.
pub fn question_winner(results: &[QuestionResult]) -> Option<&QuestionResult> {
    results.iter().find(|r| r.is_correct && r.points_earned > 0)
}

/// Ranks players into standings
///
/// Ordered by score descending; ties keep join order (the players slice is
/// already in join order), then name ascending. Ranks are dense: equal
/// scores share a rank and the next distinct score takes the next rank.
pub fn rank_leaderboard(players: &[Player]) -> Vec<LeaderboardEntry> {
    let ordered = players
        .iter()
        .enumerate()
        .sorted_by(|(ai, a), (bi, b)| {
            b.score
                .cmp(&a.score)
                .then(ai.cmp(bi))
                .then(a.name.cmp(&b.name))
        })
        .map(|(_, p)| p)
        .collect_vec();

    let mut entries = Vec::with_capacity(ordered.len());
    let mut rank = 0u32;
    let mut previous_score = None;
    for player in ordered {
        if previous_score != Some(player.score) {
            rank += 1;
            previous_score = Some(player.score);
        }
        entries.push(LeaderboardEntry {
            player_id: player.id.clone(),
            name: player.name.clone(),
            avatar: player.avatar.clone(),
            score: player.score,
            rank,
        });
    }
    entries
}
