//! Game phase state machine
//!
//! The engine drives a room through `starting → question → reveal → …`
//! until the final standings, consuming host commands, player answers, and
//! timer firings. Every transition commits through the room store's
//! per-code lock before its broadcasts go out, and every timer callback
//! re-reads the phase under that lock before acting, so a firing that lost
//! a race with a newer transition is always a no-op.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;

use crate::{
    archive::{PlayerOutcome, SessionArchive, SessionEnd, SessionStart},
    code::RoomCode,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    events::{ConnectionRegistry, Role, SharedBus, SocketId},
    protocol::{
        AnswerProgress, FinishedBroadcast, GameControlRequest, PublicQuestion, QuestionBroadcast,
        RevealBroadcast, ServerEvent, SubmitAnswerRequest,
    },
    room::{Answer, Phase, Room},
    scorer::{self, LeaderboardEntry},
    store::RoomStore,
    timer::{Clock, TimerRegistry},
    validate,
};

/// Drives the per-room game state machine
pub struct GameEngine {
    store: Arc<RoomStore>,
    bus: SharedBus,
    registry: Arc<ConnectionRegistry>,
    timers: Arc<TimerRegistry>,
    archive: Arc<dyn SessionArchive>,
    clock: Clock,
    config: EngineConfig,
    /// Archive references for running games, keyed by room code. Process
    /// local and best-effort, like the archive itself.
    sessions: DashMap<String, String>,
}

impl GameEngine {
    /// Wires an engine from its collaborators
    pub fn new(
        store: Arc<RoomStore>,
        bus: SharedBus,
        registry: Arc<ConnectionRegistry>,
        timers: Arc<TimerRegistry>,
        archive: Arc<dyn SessionArchive>,
        clock: Clock,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            timers,
            archive,
            clock,
            config,
            sessions: DashMap::new(),
        }
    }

    fn require_host(&self, socket: &SocketId, action: &'static str) -> EngineResult<()> {
        match self.registry.role(socket) {
            Some(Role::Tv) => Ok(()),
            _ => Err(EngineError::NotHost(action)),
        }
    }

    fn parse_code(raw: &str) -> EngineResult<RoomCode> {
        raw.parse().map_err(|_| EngineError::RoomNotFound)
    }

    /// Starts the game: countdown, then the first question
    ///
    /// Rejects when the caller is not the host, the room is not in the
    /// lobby, too few players joined, or no questions are loaded. The
    /// session-start record is written after the transition commits,
    /// outside the room lock.
    pub async fn start_game(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "start the game")?;
        let code = Self::parse_code(&request.room_code)?;

        let session;
        {
            let _guard = self.store.lock(&code).await;
            let mut room = self.store.get(&code).await?;
            if room.phase != Phase::Lobby {
                return Err(EngineError::GameInProgress);
            }
            if room.players.len() < room.settings.min_players as usize {
                return Err(EngineError::NeedPlayers(room.settings.min_players));
            }
            if room.questions.is_empty() {
                return Err(EngineError::NoQuestions);
            }

            room.phase = Phase::Starting;
            self.store.put(&room).await?;

            let countdown = self.config.countdown_secs;
            self.bus
                .broadcast(&code, ServerEvent::GameStarting { countdown })
                .await;

            let bus = Arc::clone(&self.bus);
            let tick_code = code.clone();
            self.timers.start_ticks(
                &code,
                countdown,
                Box::new(move |count| {
                    let bus = Arc::clone(&bus);
                    let code = tick_code.clone();
                    Box::pin(async move {
                        if count > 0 {
                            bus.broadcast(&code, ServerEvent::GameCountdown { count })
                                .await;
                        }
                    })
                }),
            );

            let engine = Arc::clone(self);
            let fire_code = code.clone();
            self.timers.set_deadline(
                &code,
                Duration::from_secs(u64::from(countdown)),
                Box::new(move || {
                    Box::pin(async move {
                        engine.countdown_complete(&fire_code).await;
                    })
                }),
            );

            session = SessionStart {
                room_code: code.to_string(),
                host_name: self
                    .registry
                    .get(&room.host_id)
                    .and_then(|data| data.host_name),
                category: room.settings.category.clone(),
                question_count: room.questions.len(),
                player_count: room.players.len(),
                started_at: self.clock.now_ms(),
            };
            tracing::info!(%code, players = room.players.len(), "game starting");
        }

        match self.archive.session_started(session).await {
            Ok(reference) => {
                self.sessions.insert(code.to_string(), reference);
            }
            Err(err) => {
                tracing::warn!(%code, error = %err, "session start not recorded");
            }
        }
        Ok(())
    }

    /// Fires when the start countdown is exhausted
    async fn countdown_complete(self: &Arc<Self>, code: &RoomCode) {
        let _guard = self.store.lock(code).await;
        let Ok(mut room) = self.store.get(code).await else {
            return;
        };
        if room.phase != Phase::Starting {
            tracing::debug!(%code, "stale countdown completion dropped");
            return;
        }

        self.bus
            .broadcast(
                code,
                ServerEvent::GameStarted {
                    phase: Phase::Question,
                    question_count: room.questions.len(),
                    current_question: 0,
                },
            )
            .await;
        if let Err(err) = self.enter_question(&mut room, 0).await {
            tracing::warn!(%code, error = %err, "failed to enter first question");
        }
    }

    /// Transitions the room into the question at `index`
    ///
    /// The caller holds the room guard. Clears collected answers, stamps
    /// the start time, commits, broadcasts the sanitized question, and
    /// registers the tick stream and the question deadline before the
    /// guard is released.
    fn enter_question<'a>(
        self: &'a Arc<Self>,
        room: &'a mut Room,
        index: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            room.current_question_index = index;
            room.current_answers.clear();
            room.question_start_time = Some(self.clock.now_ms());
            room.phase = Phase::Question;
            self.store.put(room).await?;

            let question = &room.questions[index];
            let time_limit = room.time_limit_for(index);
            self.bus
                .broadcast(
                    &room.code,
                    QuestionBroadcast {
                        question_index: index,
                        total_questions: room.questions.len(),
                        question: PublicQuestion::from_question(question, room.settings.time_limit),
                        time_limit,
                    }
                    .into(),
                )
                .await;

            let bus = Arc::clone(&self.bus);
            let tick_code = room.code.clone();
            self.timers.start_ticks(
                &room.code,
                time_limit,
                Box::new(move |remaining| {
                    let bus = Arc::clone(&bus);
                    let code = tick_code.clone();
                    Box::pin(async move {
                        if remaining > 0 {
                            bus.broadcast(
                                &code,
                                ServerEvent::TimerTick {
                                    time_remaining: remaining,
                                },
                            )
                            .await;
                        } else {
                            bus.broadcast(&code, ServerEvent::TimerEnd).await;
                        }
                    })
                }),
            );

            let engine = Arc::clone(self);
            let fire_code = room.code.clone();
            self.timers.set_deadline(
                &room.code,
                Duration::from_secs(u64::from(time_limit + self.config.answer_grace_secs)),
                Box::new(move || {
                    Box::pin(async move {
                        engine.resolve_question(&fire_code, index).await;
                    })
                }),
            );

            tracing::debug!(code = %room.code, index, time_limit, "question opened");
            Ok(())
        })
    }

    /// Admits a player's answer for the current question
    ///
    /// Answers are accepted only while the room is in the question phase
    /// and inside the question window; one answer per player per question.
    /// When the last connected player answers, the deadline is cancelled
    /// and the question resolves immediately.
    pub async fn submit_answer(
        self: &Arc<Self>,
        socket: &SocketId,
        request: SubmitAnswerRequest,
    ) -> EngineResult<bool> {
        validate::check(&request)?;
        let code = Self::parse_code(&request.room_code)?;

        let index;
        let resolve_now;
        {
            let _guard = self.store.lock(&code).await;
            let mut room = self.store.get(&code).await?;
            if room.phase != Phase::Question {
                return Err(EngineError::NotAcceptingAnswers);
            }
            index = room.current_question_index;
            if room.player(socket).is_none() {
                return Err(EngineError::Validation("Invalid player".into()));
            }
            if room.has_answered(socket, index) {
                return Err(EngineError::AlreadyAnswered);
            }
            let started = room
                .question_start_time
                .ok_or(EngineError::NotAcceptingAnswers)?;
            let time_elapsed = self.clock.now_ms().saturating_sub(started);
            let window_ms = u64::from(room.time_limit_for(index)) * 1000;
            if time_elapsed > window_ms {
                return Err(EngineError::NotAcceptingAnswers);
            }

            room.current_answers.push(Answer {
                player_id: socket.clone(),
                question_index: index,
                answer: request.answer,
                timestamp: request.timestamp.unwrap_or_else(|| self.clock.now_ms()),
                time_elapsed,
            });
            self.store.put(&room).await?;

            let progress = AnswerProgress {
                player_id: socket.clone(),
                answer_count: room.answers_for(index).len(),
                total_players: room.connected_count(),
            };
            self.bus
                .broadcast(&code, ServerEvent::AnswerReceived(progress.clone()))
                .await;
            self.bus
                .broadcast(&code, ServerEvent::PlayerAnswered(progress.clone()))
                .await;

            resolve_now =
                progress.total_players > 0 && progress.answer_count >= progress.total_players;
            if resolve_now {
                self.bus
                    .broadcast(&code, ServerEvent::AnswerAllReceived)
                    .await;
                self.timers.cancel(&code);
            }
        }

        if resolve_now {
            self.resolve_question(&code, index).await;
        }
        Ok(true)
    }

    /// Resolves the question at `index`: scores, reveal, and the advance
    /// deadline
    ///
    /// Safe to call from the deadline, the all-answered shortcut, and the
    /// host's timeout; a call that arrives after the room moved on is
    /// dropped.
    pub async fn resolve_question(self: &Arc<Self>, code: &RoomCode, index: usize) {
        let _guard = self.store.lock(code).await;
        let Ok(mut room) = self.store.get(code).await else {
            return;
        };
        if room.phase != Phase::Question || room.current_question_index != index {
            tracing::debug!(%code, index, "stale question resolution dropped");
            return;
        }
        let Some(question) = room.questions.get(index).cloned() else {
            return;
        };

        let answers = room.answers_for(index);
        let results = scorer::compute_results(&room, &question, &answers);
        for result in &results {
            if let Some(player) = room.player_mut(&result.player_id) {
                player.score = result.new_score;
                player.streak = result.streak;
            }
        }
        let winner = scorer::question_winner(&results).cloned();

        room.phase = Phase::Reveal;
        room.question_start_time = None;
        if let Err(err) = self.store.put(&room).await {
            tracing::warn!(%code, error = %err, "failed to persist question results");
            return;
        }
        self.timers.cancel(code);

        let standings = scorer::rank_leaderboard(&room.players);
        self.bus
            .broadcast(
                code,
                RevealBroadcast {
                    correct_answer: question.correct_answer,
                    results,
                    standings,
                    question_winner: winner.clone(),
                }
                .into(),
            )
            .await;

        let delay = self.config.reveal_secs
            + if winner.is_some() {
                self.config.winner_jingle_secs
            } else {
                0
            };
        let engine = Arc::clone(self);
        let fire_code = code.clone();
        self.timers.set_deadline(
            code,
            Duration::from_secs(u64::from(delay)),
            Box::new(move || {
                Box::pin(async move {
                    engine.advance(&fire_code).await;
                })
            }),
        );
        tracing::debug!(%code, index, "question resolved");
    }

    /// Moves past a reveal: next question, or the final standings
    pub async fn advance(self: &Arc<Self>, code: &RoomCode) {
        let mut finished = None;
        {
            let _guard = self.store.lock(code).await;
            let Ok(mut room) = self.store.get(code).await else {
                return;
            };
            if room.phase != Phase::Reveal {
                tracing::debug!(%code, "stale advance dropped");
                return;
            }
            let next = room.current_question_index + 1;
            if next < room.questions.len() {
                if let Err(err) = self.enter_question(&mut room, next).await {
                    tracing::warn!(%code, error = %err, "failed to enter next question");
                }
            } else {
                match self.finish_room(&mut room).await {
                    Ok(standings) => finished = Some((standings, room.questions.len())),
                    Err(err) => {
                        tracing::warn!(%code, error = %err, "failed to finish game");
                    }
                }
            }
        }
        if let Some((standings, total_questions)) = finished {
            self.archive_end(code, &standings, total_questions).await;
        }
    }

    /// Ends the game from any phase at the host's request
    pub async fn end_game(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "end the game")?;
        let code = Self::parse_code(&request.room_code)?;

        let finished;
        {
            let _guard = self.store.lock(&code).await;
            let mut room = self.store.get(&code).await?;
            if room.phase == Phase::Final {
                return Ok(());
            }
            let standings = self.finish_room(&mut room).await?;
            finished = (standings, room.questions.len());
        }
        self.archive_end(&code, &finished.0, finished.1).await;
        Ok(())
    }

    /// Host shortcut that skips the rest of a reveal
    ///
    /// Valid during the reveal phase; anywhere else it is a quiet no-op.
    pub async fn next_question(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "advance the game")?;
        let code = Self::parse_code(&request.room_code)?;
        self.advance(&code).await;
        Ok(())
    }

    /// Host shortcut that closes the current question immediately
    pub async fn answer_timeout(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "close the question")?;
        let code = Self::parse_code(&request.room_code)?;
        let room = self.store.get(&code).await?;
        if room.phase == Phase::Question {
            self.timers.cancel(&code);
            self.resolve_question(&code, room.current_question_index)
                .await;
        }
        Ok(())
    }

    /// Pauses the game, aborting any in-flight question
    ///
    /// The room returns to the lobby phase with timers cancelled, matching
    /// the original behavior.
    // TODO: a dedicated paused phase that retains currentQuestionIndex and
    // questionStartTime would let resume continue mid-round instead of
    // abandoning the question.
    pub async fn pause_game(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "pause the game")?;
        let code = Self::parse_code(&request.room_code)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        self.timers.cancel(&code);
        room.phase = Phase::Lobby;
        room.question_start_time = None;
        self.store.put(&room).await?;
        self.bus.broadcast(&code, ServerEvent::GamePaused).await;
        tracing::info!(%code, "game paused");
        Ok(())
    }

    /// Announces a resume; pause put the room back in the lobby, so this
    /// only notifies clients
    pub async fn resume_game(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "resume the game")?;
        let code = Self::parse_code(&request.room_code)?;
        self.store.get(&code).await?;
        self.bus.broadcast(&code, ServerEvent::GameResumed).await;
        Ok(())
    }

    /// Resets the room for another game with the same players
    ///
    /// Scores and streaks are zeroed, questions and answers cleared, and
    /// the room returns to the lobby. Valid once a game is over (or from
    /// the lobby, where it is just a reset).
    pub async fn restart_game(
        self: &Arc<Self>,
        socket: &SocketId,
        request: GameControlRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "restart the game")?;
        let code = Self::parse_code(&request.room_code)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        if !matches!(room.phase, Phase::Final | Phase::Lobby) {
            return Err(EngineError::GameInProgress);
        }
        self.timers.cancel(&code);
        for player in &mut room.players {
            player.score = 0;
            player.streak = 0;
        }
        room.questions.clear();
        room.current_answers.clear();
        room.current_question_index = 0;
        room.question_start_time = None;
        room.phase = Phase::Lobby;
        self.store.put(&room).await?;

        self.bus
            .broadcast(
                &code,
                ServerEvent::GameRestarted {
                    phase: Phase::Lobby,
                },
            )
            .await;
        tracing::info!(%code, "game restarted");
        Ok(())
    }

    /// Moves the room to the final phase and announces the standings
    ///
    /// The caller holds the room guard.
    async fn finish_room(&self, room: &mut Room) -> EngineResult<Vec<LeaderboardEntry>> {
        room.phase = Phase::Final;
        room.current_question_index = room.questions.len();
        room.question_start_time = None;
        self.timers.cancel(&room.code);
        self.store.put(room).await?;

        let standings = scorer::rank_leaderboard(&room.players);
        self.bus
            .broadcast(
                &room.code,
                FinishedBroadcast {
                    standings: standings.clone(),
                    winner: standings.first().cloned(),
                }
                .into(),
            )
            .await;
        tracing::info!(code = %room.code, "game finished");
        Ok(standings)
    }

    /// Writes the session-end record; failures are logged and swallowed
    async fn archive_end(
        &self,
        code: &RoomCode,
        standings: &[LeaderboardEntry],
        total_questions: usize,
    ) {
        let Some((_, reference)) = self.sessions.remove(code.as_str()) else {
            return;
        };
        let outcomes = standings
            .iter()
            .map(|entry| PlayerOutcome {
                session_ref: reference.clone(),
                final_rank: entry.rank,
                final_score: entry.score,
                player_name: entry.name.clone(),
                total_questions,
            })
            .collect();
        let record = SessionEnd {
            session_ref: reference,
            ended_at: self.clock.now_ms(),
        };
        if let Err(err) = self.archive.session_finished(record, outcomes).await {
            tracing::warn!(%code, error = %err, "session end not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        room::Choice,
        test_support::{Harness, question},
    };

    fn tv() -> SocketId {
        SocketId::from("tv-1")
    }

    fn control(code: &RoomCode) -> GameControlRequest {
        GameControlRequest {
            room_code: code.to_string(),
        }
    }

    fn answer(code: &RoomCode, choice: Choice) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            room_code: code.to_string(),
            answer: choice,
            timestamp: None,
        }
    }

    async fn two_player_room(harness: &Harness) -> RoomCode {
        let code = harness.create_room("tv-1").await;
        harness.join(&code, "p-alice", "Alice", "🦊").await;
        harness.join(&code, "p-bob", "Bob", "🐼").await;
        harness
            .load_questions(&code, vec![question("q1", "Q1", Choice::B)])
            .await;
        harness.bus.clear();
        code
    }

    fn reveal_of(harness: &Harness, code: &RoomCode) -> Vec<RevealBroadcast> {
        harness
            .bus
            .room_events(code)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::GameReveal(reveal) => Some(reveal),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn full_single_question_game() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;

        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        assert!(
            harness
                .bus
                .room_event_names(&code)
                .contains(&"game:starting")
        );

        // Countdown runs for three seconds, then the first question opens.
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let names = harness.bus.room_event_names(&code);
        assert_eq!(names.iter().filter(|n| **n == "game:countdown").count(), 3);
        assert!(names.contains(&"game:started"));
        assert!(names.contains(&"game:question"));

        let question_event = harness
            .bus
            .room_events(&code)
            .into_iter()
            .find(|e| e.name() == "game:question")
            .unwrap();
        let rendered = question_event.payload().to_string();
        assert!(!rendered.contains("correctAnswer"));

        // Alice answers correctly one second into the window.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(
            harness
                .engine
                .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::B))
                .await
                .unwrap()
        );
        let progress = harness
            .bus
            .room_events(&code)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::AnswerReceived(progress) => Some(progress),
                _ => None,
            })
            .next()
            .unwrap();
        assert_eq!(progress.answer_count, 1);
        assert_eq!(progress.total_players, 2);

        // Bob answers wrong a second later; everyone has now answered, so
        // the question resolves well before the window elapses.
        tokio::time::sleep(Duration::from_secs(1)).await;
        harness
            .engine
            .submit_answer(&SocketId::from("p-bob"), answer(&code, Choice::A))
            .await
            .unwrap();

        let names = harness.bus.room_event_names(&code);
        assert!(names.contains(&"answer:all-received"));

        let reveals = reveal_of(&harness, &code);
        assert_eq!(reveals.len(), 1);
        let reveal = &reveals[0];
        assert_eq!(reveal.correct_answer, Choice::B);
        assert_eq!(reveal.results[0].player_id, SocketId::from("p-alice"));
        assert!(reveal.results[0].is_correct);
        assert_eq!(reveal.results[0].points_earned, 1_475);
        assert_eq!(reveal.results[0].new_score, 1_475);
        assert_eq!(reveal.results[0].streak, 1);
        assert_eq!(reveal.results[1].points_earned, 0);
        assert_eq!(reveal.standings[0].name, "Alice");
        assert_eq!(reveal.standings[0].rank, 1);
        assert_eq!(reveal.standings[1].name, "Bob");
        assert_eq!(reveal.standings[1].rank, 2);
        assert_eq!(
            reveal.question_winner.as_ref().unwrap().player_id,
            SocketId::from("p-alice")
        );

        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Reveal);

        // Reveal plus the winner jingle, then the single-question game is
        // over.
        tokio::time::sleep(Duration::from_millis(8_100)).await;
        let finished = harness
            .bus
            .room_events(&code)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::GameFinished(finished) => Some(finished),
                _ => None,
            })
            .next()
            .unwrap();
        assert_eq!(finished.winner.as_ref().unwrap().name, "Alice");
        assert_eq!(finished.winner.as_ref().unwrap().score, 1_475);

        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Final);
        assert_eq!(room.current_question_index, room.questions.len());

        // Exactly one reveal: the question deadline that was cancelled by
        // the all-answered shortcut never produced a second one.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reveal_of(&harness, &code).len(), 1);

        // Both archive records were written.
        assert_eq!(harness.archive.starts.lock().unwrap().len(), 1);
        let ends = harness.archive.ends.lock().unwrap();
        assert_eq!(ends.len(), 1);
        let outcomes = &ends[0].1;
        assert_eq!(outcomes[0].player_name, "Alice");
        assert_eq!(outcomes[0].final_rank, 1);
        assert_eq!(outcomes[0].final_score, 1_475);
        assert_eq!(outcomes[1].player_name, "Bob");
        assert_eq!(outcomes[1].final_rank, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_a_question_nobody_answered() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();

        // Countdown (3 s) plus the window (20 s) plus the grace second.
        tokio::time::sleep(Duration::from_millis(24_200)).await;

        let reveals = reveal_of(&harness, &code);
        assert_eq!(reveals.len(), 1);
        let reveal = &reveals[0];
        assert!(reveal.results.iter().all(|r| !r.is_correct));
        assert!(reveal.results.iter().all(|r| r.points_earned == 0));
        assert!(reveal.question_winner.is_none());
        assert!(reveal.standings.iter().all(|e| e.score == 0));

        // No winner means no jingle: the reveal lasts five seconds.
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(
            harness
                .bus
                .room_event_names(&code)
                .contains(&"game:finished")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_submission_from_the_same_player_loses() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::A))
            .await
            .unwrap();
        let second = harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::B))
            .await;
        assert!(matches!(second, Err(EngineError::AlreadyAnswered)));

        // The first submission is unchanged.
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.current_answers.len(), 1);
        assert_eq!(room.current_answers[0].answer, Choice::A);
    }

    #[tokio::test(start_paused = true)]
    async fn the_question_window_boundary_is_enforced() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        // One millisecond before the window closes: accepted.
        tokio::time::sleep(Duration::from_millis(19_999)).await;
        assert!(
            harness
                .engine
                .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::B))
                .await
                .unwrap()
        );

        // One millisecond past the window: rejected, even though the grace
        // deadline has not fired yet.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let late = harness
            .engine
            .submit_answer(&SocketId::from("p-bob"), answer(&code, Choice::B))
            .await;
        assert!(matches!(late, Err(EngineError::NotAcceptingAnswers)));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_are_rejected_outside_the_question_phase() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;

        let result = harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::A))
            .await;
        assert!(matches!(result, Err(EngineError::NotAcceptingAnswers)));
    }

    #[tokio::test]
    async fn start_preconditions_are_checked() {
        let harness = Harness::new();
        let code = harness.create_room("tv-1").await;
        harness.join(&code, "p-alice", "Alice", "🦊").await;
        harness
            .load_questions(&code, vec![question("q1", "Q1", Choice::B)])
            .await;

        // One player short of the two-player minimum.
        let result = harness.engine.start_game(&tv(), control(&code)).await;
        assert!(matches!(result, Err(EngineError::NeedPlayers(2))));

        harness.join(&code, "p-bob", "Bob", "🐼").await;
        harness.load_questions(&code, Vec::new()).await;
        let result = harness.engine.start_game(&tv(), control(&code)).await;
        assert!(matches!(result, Err(EngineError::NoQuestions)));

        let result = harness
            .engine
            .start_game(&SocketId::from("p-alice"), control(&code))
            .await;
        assert!(matches!(result, Err(EngineError::NotHost(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_aborts_the_in_flight_question() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        harness
            .engine
            .pause_game(&tv(), control(&code))
            .await
            .unwrap();
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Lobby);
        assert!(room.question_start_time.is_none());
        assert!(harness.bus.room_event_names(&code).contains(&"game:paused"));

        // The cancelled deadline never resolves the abandoned question.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(reveal_of(&harness, &code).is_empty());

        harness
            .engine
            .resume_game(&tv(), control(&code))
            .await
            .unwrap();
        assert!(
            harness
                .bus
                .room_event_names(&code)
                .contains(&"game:resumed")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn host_timeout_closes_the_question_immediately() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        harness
            .engine
            .answer_timeout(&tv(), control(&code))
            .await
            .unwrap();
        assert_eq!(reveal_of(&harness, &code).len(), 1);
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Reveal);
    }

    #[tokio::test(start_paused = true)]
    async fn next_question_skips_the_rest_of_the_reveal() {
        let harness = Harness::new();
        let code = harness.create_room("tv-1").await;
        harness.join(&code, "p-alice", "Alice", "🦊").await;
        harness.join(&code, "p-bob", "Bob", "🐼").await;
        harness
            .load_questions(
                &code,
                vec![
                    question("q1", "Q1", Choice::B),
                    question("q2", "Q2", Choice::C),
                ],
            )
            .await;
        harness.bus.clear();

        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        harness
            .engine
            .answer_timeout(&tv(), control(&code))
            .await
            .unwrap();

        harness
            .engine
            .next_question(&tv(), control(&code))
            .await
            .unwrap();
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Question);
        assert_eq!(room.current_question_index, 1);
        assert!(room.current_answers.is_empty());

        // The abandoned reveal deadline is a stale no-op against the new
        // question.
        tokio::time::sleep(Duration::from_secs(6)).await;
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.current_question_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn streaks_accumulate_across_questions() {
        let harness = Harness::new();
        let code = harness.create_room("tv-1").await;
        harness.join(&code, "p-alice", "Alice", "🦊").await;
        harness.join(&code, "p-bob", "Bob", "🐼").await;
        harness
            .load_questions(
                &code,
                vec![
                    question("q1", "Q1", Choice::B),
                    question("q2", "Q2", Choice::C),
                ],
            )
            .await;
        harness.bus.clear();

        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        // Round one: Alice right, Bob wrong.
        harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::B))
            .await
            .unwrap();
        harness
            .engine
            .submit_answer(&SocketId::from("p-bob"), answer(&code, Choice::A))
            .await
            .unwrap();

        // Through the reveal (with jingle) into question two.
        tokio::time::sleep(Duration::from_millis(8_100)).await;
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Question);
        assert_eq!(room.current_question_index, 1);

        // Round two, one second into the window: Alice right again and her
        // streak bonus lands.
        tokio::time::sleep(Duration::from_millis(900)).await;
        harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::C))
            .await
            .unwrap();
        harness
            .engine
            .submit_answer(&SocketId::from("p-bob"), answer(&code, Choice::D))
            .await
            .unwrap();

        let reveals = reveal_of(&harness, &code);
        let second = reveals.last().unwrap();
        let alice = second
            .results
            .iter()
            .find(|r| r.player_id == SocketId::from("p-alice"))
            .unwrap();
        // Instant answer would be 1500; one second in is 1475, plus the
        // 100-point streak bonus for one prior correct answer.
        assert_eq!(alice.points_earned, 1_575);
        assert_eq!(alice.streak, 2);
        let bob = second
            .results
            .iter()
            .find(|r| r.player_id == SocketId::from("p-bob"))
            .unwrap();
        assert_eq!(bob.streak, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_zeroes_scores_and_returns_to_the_lobby() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        harness
            .engine
            .submit_answer(&SocketId::from("p-alice"), answer(&code, Choice::B))
            .await
            .unwrap();
        harness
            .engine
            .submit_answer(&SocketId::from("p-bob"), answer(&code, Choice::B))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(8_100)).await;
        assert_eq!(harness.store.get(&code).await.unwrap().phase, Phase::Final);

        harness
            .engine
            .restart_game(&tv(), control(&code))
            .await
            .unwrap();
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Lobby);
        assert!(room.questions.is_empty());
        assert!(room.current_answers.is_empty());
        assert_eq!(room.current_question_index, 0);
        assert_eq!(room.players.len(), 2);
        assert!(room.players.iter().all(|p| p.score == 0 && p.streak == 0));
        assert!(
            harness
                .bus
                .room_event_names(&code)
                .contains(&"game:restarted")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_mid_game_is_rejected() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        let result = harness.engine.restart_game(&tv(), control(&code)).await;
        assert!(matches!(result, Err(EngineError::GameInProgress)));
    }

    #[tokio::test(start_paused = true)]
    async fn host_can_end_the_game_from_any_phase() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_100)).await;

        harness
            .engine
            .end_game(&tv(), control(&code))
            .await
            .unwrap();
        let room = harness.store.get(&code).await.unwrap();
        assert_eq!(room.phase, Phase::Final);
        assert_eq!(room.current_question_index, room.questions.len());
        assert!(
            harness
                .bus
                .room_event_names(&code)
                .contains(&"game:finished")
        );
        assert_eq!(harness.archive.ends.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_count_the_window_down() {
        let harness = Harness::new();
        let code = two_player_room(&harness).await;
        harness
            .engine
            .start_game(&tv(), control(&code))
            .await
            .unwrap();

        // Into the question, then across the whole window.
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        tokio::time::sleep(Duration::from_secs(21)).await;

        let events = harness.bus.room_events(&code);
        let first_tick = events
            .iter()
            .filter_map(|event| match event {
                ServerEvent::TimerTick { time_remaining } => Some(*time_remaining),
                _ => None,
            })
            .next()
            .unwrap();
        assert_eq!(first_tick, 20);
        assert!(events.iter().any(|e| e.name() == "timer:end"));
    }
}
