//! Room lifecycle and lobby operations
//!
//! The manager owns everything that happens before and between games:
//! creating rooms, joining and rejoining players, kicks, settings,
//! readiness, disconnect handling, and quiz setup through the question
//! pipeline. All room mutations go through the store's per-code lock, and
//! broadcasts derived from a mutation are emitted while that lock is held
//! so delivery order matches commit order.

use std::sync::Arc;

use crate::{
    avatar::AvatarPools,
    code::{RoomCode, RoomCodeIssuer},
    config::EngineConfig,
    error::{EngineError, EngineResult},
    events::{ConnectionRegistry, Role, SharedBus, SocketId},
    protocol::{
        CreateRoomRequest, GenerateQuizRequest, JoinKind, JoinRoomRequest, KickPlayerRequest,
        LeaveRoomRequest, PlayerUpdateRequest, RejoinRoomRequest, RoomSnapshot,
        SelectCategoryRequest, ServerEvent, SetOptionsRequest, UpdateSettingsRequest,
    },
    questions::QuestionPipeline,
    room::{Phase, Player, Room, RoomSettings},
    store::RoomStore,
    timer::{Clock, TimerRegistry},
    validate,
};

/// Lobby-shape operations over rooms and players
pub struct RoomManager {
    store: Arc<RoomStore>,
    bus: SharedBus,
    registry: Arc<ConnectionRegistry>,
    avatars: Arc<AvatarPools>,
    timers: Arc<TimerRegistry>,
    issuer: RoomCodeIssuer,
    pipeline: Arc<QuestionPipeline>,
    clock: Clock,
    config: EngineConfig,
}

impl RoomManager {
    /// Wires a manager from its collaborators
    pub fn new(
        store: Arc<RoomStore>,
        bus: SharedBus,
        registry: Arc<ConnectionRegistry>,
        avatars: Arc<AvatarPools>,
        timers: Arc<TimerRegistry>,
        issuer: RoomCodeIssuer,
        pipeline: Arc<QuestionPipeline>,
        clock: Clock,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            avatars,
            timers,
            issuer,
            pipeline,
            clock,
            config,
        }
    }

    fn require_host(&self, socket: &SocketId, action: &'static str) -> EngineResult<()> {
        match self.registry.role(socket) {
            Some(Role::Tv) => Ok(()),
            _ => Err(EngineError::NotHost(action)),
        }
    }

    /// Creates a room hosted by the given TV connection
    ///
    /// Allocates a fresh code, stores the room with default settings in the
    /// lobby phase, tags the connection as the TV, and subscribes it to the
    /// room channel.
    pub async fn create_room(
        &self,
        socket: &SocketId,
        request: CreateRoomRequest,
    ) -> EngineResult<(RoomCode, RoomSnapshot)> {
        validate::check(&request)?;

        let code = self.issuer.issue(&self.store).await?;
        let room = Room::new(
            code.clone(),
            socket.clone(),
            self.config.default_settings.clone(),
            self.clock.now_ms(),
        );
        let snapshot = RoomSnapshot::from(&room);
        self.store.create(room).await?;

        self.registry.update(socket, |data| {
            data.role = Some(Role::Tv);
            data.room_code = Some(code.clone());
            data.device_id = request.device_id.clone();
            data.host_name = request.host_name.clone();
        });
        self.bus.subscribe(socket, &code).await;
        self.bus
            .broadcast(
                &code,
                ServerEvent::RoomCreated {
                    room_code: code.clone(),
                    room: snapshot.clone(),
                },
            )
            .await;

        tracing::info!(%code, host = %socket, "room created");
        Ok((code, snapshot))
    }

    /// Joins a connection to a room
    ///
    /// TV joins re-attach the host to its channel; player joins append a
    /// new player while the room is still in the lobby.
    pub async fn join_room(
        &self,
        socket: &SocketId,
        request: JoinRoomRequest,
    ) -> EngineResult<(Option<Player>, RoomSnapshot)> {
        validate::check(&request)?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        if request.kind == JoinKind::Tv {
            let room = self.store.get(&code).await?;
            self.registry.update(socket, |data| {
                data.role = Some(Role::Tv);
                data.room_code = Some(code.clone());
            });
            self.bus.subscribe(socket, &code).await;
            return Ok((None, RoomSnapshot::from(&room)));
        }

        let details = request
            .player
            .ok_or_else(|| EngineError::Validation("Invalid player".into()))?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;

        if room.phase != Phase::Lobby {
            return Err(EngineError::GameInProgress);
        }
        if room.players.len() >= room.settings.max_players as usize {
            return Err(EngineError::RoomFull);
        }
        if room.player_by_name(&details.name).is_some() {
            return Err(EngineError::NameTaken);
        }

        let avatar = match &details.avatar {
            Some(wanted) => self.avatars.acquire_preferred(&code, wanted),
            None => self.avatars.acquire(&code),
        };
        let player = Player::new(socket.clone(), details.name, avatar, details.jingle_id);
        room.players.push(player.clone());
        self.store.put(&room).await?;

        self.registry.update(socket, |data| {
            data.role = Some(Role::Player);
            data.room_code = Some(code.clone());
            data.player_id = Some(socket.clone());
        });
        self.bus.subscribe(socket, &code).await;
        self.bus
            .broadcast(
                &code,
                ServerEvent::PlayerJoined {
                    player: player.clone(),
                    player_count: room.players.len(),
                },
            )
            .await;

        tracing::info!(%code, player = %player.name, "player joined");
        Ok((Some(player), RoomSnapshot::from(&room)))
    }

    /// Rebinds a returning player to their record, or joins them fresh if
    /// the room is still in the lobby
    pub async fn rejoin_room(
        &self,
        socket: &SocketId,
        request: RejoinRoomRequest,
    ) -> EngineResult<(Player, RoomSnapshot)> {
        validate::check(&request)?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;

        if let Some(existing) = room.player_by_name_mut(&request.player_name) {
            let old_player_id = existing.id.clone();
            existing.id = socket.clone();
            existing.is_connected = true;
            if let Some(jingle) = request.player_jingle_id {
                existing.jingle_id = Some(jingle);
            }
            let player = existing.clone();
            self.store.put(&room).await?;

            self.registry.update(socket, |data| {
                data.role = Some(Role::Player);
                data.room_code = Some(code.clone());
                data.player_id = Some(socket.clone());
            });
            self.bus.subscribe(socket, &code).await;
            self.bus
                .broadcast(
                    &code,
                    ServerEvent::PlayerRejoined {
                        old_player_id,
                        player: player.clone(),
                    },
                )
                .await;

            tracing::info!(%code, player = %player.name, "player rejoined");
            return Ok((player, RoomSnapshot::from(&room)));
        }

        if room.phase != Phase::Lobby {
            return Err(EngineError::GameInProgress);
        }
        if room.players.len() >= room.settings.max_players as usize {
            return Err(EngineError::RoomFull);
        }

        // Unknown name in a lobby: treat the rejoin as a fresh join.
        let avatar = match &request.player_avatar {
            Some(wanted) => self.avatars.acquire_preferred(&code, wanted),
            None => self.avatars.acquire(&code),
        };
        let player = Player::new(
            socket.clone(),
            request.player_name,
            avatar,
            request.player_jingle_id,
        );
        room.players.push(player.clone());
        self.store.put(&room).await?;

        self.registry.update(socket, |data| {
            data.role = Some(Role::Player);
            data.room_code = Some(code.clone());
            data.player_id = Some(socket.clone());
        });
        self.bus.subscribe(socket, &code).await;
        self.bus
            .broadcast(
                &code,
                ServerEvent::PlayerJoined {
                    player: player.clone(),
                    player_count: room.players.len(),
                },
            )
            .await;

        Ok((player, RoomSnapshot::from(&room)))
    }

    /// Removes the calling connection from its room
    ///
    /// A leaving TV tears the room down; a leaving player is removed and
    /// announced. Leaving a room that no longer exists is a quiet no-op.
    pub async fn leave_room(
        &self,
        socket: &SocketId,
        request: LeaveRoomRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        let code = match request
            .room_code
            .as_deref()
            .and_then(|c| c.parse::<RoomCode>().ok())
            .or_else(|| self.registry.room(socket))
        {
            Some(code) => code,
            None => return Ok(()),
        };

        if self.registry.role(socket) == Some(Role::Tv) {
            self.close_room(&code).await?;
            self.registry.update(socket, |data| data.room_code = None);
            return Ok(());
        }

        {
            let _guard = self.store.lock(&code).await;
            let mut room = match self.store.get(&code).await {
                Ok(room) => room,
                Err(_) => return Ok(()),
            };
            if let Some(pos) = room.players.iter().position(|p| &p.id == socket) {
                let removed = room.players.remove(pos);
                self.avatars.release(&code, &removed.avatar);
                self.store.put(&room).await?;
                self.bus
                    .broadcast(
                        &code,
                        ServerEvent::PlayerLeft {
                            player_id: removed.id,
                            player_count: room.players.len(),
                        },
                    )
                    .await;
            }
        }

        self.bus.unsubscribe(socket, &code).await;
        self.registry.update(socket, |data| {
            data.room_code = None;
            data.player_id = None;
        });
        Ok(())
    }

    /// Removes a player at the host's request
    pub async fn kick_player(
        &self,
        socket: &SocketId,
        request: KickPlayerRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;

        // The host socket itself is accepted even if its role tag was lost
        // to a reconnect.
        let is_host = self.registry.role(socket) == Some(Role::Tv) || socket == &room.host_id;
        if !is_host {
            return Err(EngineError::NotHost("kick players"));
        }

        let Some(pos) = room.players.iter().position(|p| p.id == request.player_id) else {
            return Ok(());
        };
        let removed = room.players.remove(pos);
        self.avatars.release(&code, &removed.avatar);
        self.store.put(&room).await?;

        self.bus.emit_to(&removed.id, ServerEvent::Kicked).await;
        self.bus
            .broadcast(
                &code,
                ServerEvent::PlayerLeft {
                    player_id: removed.id.clone(),
                    player_count: room.players.len(),
                },
            )
            .await;
        self.bus.unsubscribe(&removed.id, &code).await;
        self.registry.update(&removed.id, |data| {
            data.room_code = None;
            data.player_id = None;
        });

        tracing::info!(%code, player = %removed.name, "player kicked");
        Ok(())
    }

    /// Merges a settings patch into the room at the host's request
    pub async fn update_settings(
        &self,
        socket: &SocketId,
        request: UpdateSettingsRequest,
    ) -> EngineResult<RoomSettings> {
        validate::check(&request)?;
        self.require_host(socket, "update settings")?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        request.settings.apply_to(&mut room.settings);
        let settings = room.settings.clone();
        self.store.put(&room).await?;

        self.bus
            .broadcast(
                &code,
                ServerEvent::SettingsUpdated {
                    settings: settings.clone(),
                },
            )
            .await;
        Ok(settings)
    }

    /// Applies a player's jingle or readiness change
    ///
    /// When the change completes the room's readiness,
    /// `room:all-players-ready` is broadcast after the player update.
    pub async fn update_player(
        &self,
        socket: &SocketId,
        request: PlayerUpdateRequest,
    ) -> EngineResult<Player> {
        validate::check(&request)?;
        let code = request
            .room_code
            .as_deref()
            .and_then(|c| c.parse::<RoomCode>().ok())
            .or_else(|| self.registry.room(socket))
            .ok_or(EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        let player = {
            let player = room
                .player_mut(socket)
                .ok_or_else(|| EngineError::Validation("Invalid player".into()))?;
            if let Some(jingle) = request.jingle_id {
                player.jingle_id = Some(jingle);
            }
            if let Some(ready) = request.is_ready {
                player.is_ready = ready;
            }
            player.clone()
        };
        self.store.put(&room).await?;

        self.bus
            .broadcast(
                &code,
                ServerEvent::PlayerUpdated {
                    player: player.clone(),
                },
            )
            .await;
        if room.all_ready() {
            self.bus
                .broadcast(&code, ServerEvent::AllPlayersReady)
                .await;
        }
        Ok(player)
    }

    /// Handles a transport-level disconnect
    ///
    /// Players are flipped to disconnected but never removed mid-game; a
    /// dropped TV is only announced.
    pub async fn on_disconnect(&self, socket: &SocketId) {
        let Some(data) = self.registry.remove(socket) else {
            return;
        };
        let Some(code) = data.room_code else {
            return;
        };

        match data.role {
            Some(Role::Tv) => {
                self.bus.broadcast(&code, ServerEvent::TvDisconnected).await;
                tracing::info!(%code, "tv disconnected");
            }
            Some(Role::Player) => {
                let _guard = self.store.lock(&code).await;
                let Ok(mut room) = self.store.get(&code).await else {
                    return;
                };
                if let Some(player) = room.player_mut(socket) {
                    player.is_connected = false;
                    let player_id = player.id.clone();
                    if self.store.put(&room).await.is_ok() {
                        self.bus
                            .broadcast(&code, ServerEvent::PlayerDisconnected { player_id })
                            .await;
                    }
                }
            }
            None => {}
        }
        self.bus.unsubscribe(socket, &code).await;
    }

    /// Tears a room down entirely: record, timers, and avatar pool
    pub async fn close_room(&self, code: &RoomCode) -> EngineResult<()> {
        self.store.delete(code).await?;
        self.timers.teardown(code);
        self.avatars.drop_room(code);
        tracing::info!(%code, "room closed");
        Ok(())
    }

    /// Fills the room's question list from the pipeline
    ///
    /// The pipeline runs outside the room lock; the generated list is
    /// merged back in a second critical section, which re-checks that the
    /// room is still in the lobby.
    pub async fn generate_quiz(
        &self,
        socket: &SocketId,
        request: GenerateQuizRequest,
    ) -> EngineResult<usize> {
        validate::check(&request)?;
        self.require_host(socket, "generate questions")?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let room = self.store.get(&code).await?;
        if room.phase != Phase::Lobby {
            return Err(EngineError::GameInProgress);
        }

        self.bus.broadcast(&code, ServerEvent::QuizGenerating).await;

        let difficulty = request.difficulty.unwrap_or(room.settings.difficulty);
        let questions = self
            .pipeline
            .fetch_questions(
                &request.category,
                request.question_count as usize,
                difficulty,
                &[],
            )
            .await;

        if questions.is_empty() {
            let error = EngineError::QuizGenerationFailed;
            self.bus
                .broadcast(
                    &code,
                    ServerEvent::QuizError {
                        error: error.to_string(),
                    },
                )
                .await;
            return Err(error);
        }

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        if room.phase != Phase::Lobby {
            return Err(EngineError::GameInProgress);
        }
        room.questions = questions;
        room.settings.category = request.category;
        room.settings.question_count = request.question_count;
        if let Some(difficulty) = request.difficulty {
            room.settings.difficulty = difficulty;
        }
        let count = room.questions.len();
        self.store.put(&room).await?;

        self.bus
            .broadcast(&code, ServerEvent::QuizGenerated { questions: count })
            .await;
        tracing::info!(%code, count, "quiz generated");
        Ok(count)
    }

    /// Records the host's category choice and announces it
    pub async fn select_category(
        &self,
        socket: &SocketId,
        request: SelectCategoryRequest,
    ) -> EngineResult<()> {
        validate::check(&request)?;
        self.require_host(socket, "select a category")?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        room.settings.category = request.category_id.clone();
        self.store.put(&room).await?;

        self.bus
            .broadcast(
                &code,
                ServerEvent::QuizCategorySelected {
                    category_id: request.category_id,
                    category_name: request.category_name,
                },
            )
            .await;
        Ok(())
    }

    /// Merges quiz options from the setup screen into the settings
    pub async fn set_options(
        &self,
        socket: &SocketId,
        request: SetOptionsRequest,
    ) -> EngineResult<RoomSettings> {
        validate::check(&request)?;
        self.require_host(socket, "set quiz options")?;
        let code: RoomCode = request
            .room_code
            .parse()
            .map_err(|_| EngineError::RoomNotFound)?;

        let _guard = self.store.lock(&code).await;
        let mut room = self.store.get(&code).await?;
        if let Some(question_count) = request.question_count {
            room.settings.question_count = question_count;
        }
        if let Some(difficulty) = request.difficulty {
            room.settings.difficulty = difficulty;
        }
        if let Some(time_limit) = request.time_limit {
            room.settings.time_limit = time_limit;
        }
        let settings = room.settings.clone();
        self.store.put(&room).await?;

        self.bus
            .broadcast(
                &code,
                ServerEvent::SettingsUpdated {
                    settings: settings.clone(),
                },
            )
            .await;
        Ok(settings)
    }
}
