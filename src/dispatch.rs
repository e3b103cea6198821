//! Inbound event dispatch
//!
//! The thin decode-and-route edge between the transport and the engine:
//! an inbound `(event name, JSON payload)` pair decodes into its typed
//! request, routes to the room manager (lobby-shape events) or the game
//! engine (in-game events), and the typed result is rendered back into
//! the acknowledgement envelope the transport invokes the caller's
//! callback with.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
    engine::GameEngine,
    error::{EngineError, EngineResult},
    events::SocketId,
    manager::RoomManager,
    protocol::{ack_err, ack_ok},
};

/// Routes inbound events to the manager and engine
pub struct Dispatcher {
    manager: Arc<RoomManager>,
    engine: Arc<GameEngine>,
}

impl Dispatcher {
    /// Wires a dispatcher over the two operation surfaces
    pub fn new(manager: Arc<RoomManager>, engine: Arc<GameEngine>) -> Self {
        Self { manager, engine }
    }

    /// Handles one inbound event and returns the acknowledgement payload
    pub async fn handle(&self, socket: &SocketId, event: &str, payload: Value) -> Value {
        match self.route(socket, event, payload).await {
            Ok(ack) => ack,
            Err(err) => {
                tracing::debug!(%socket, event, error = %err, "request rejected");
                ack_err(&err)
            }
        }
    }

    /// Handles a transport-level disconnect notification
    pub async fn socket_disconnected(&self, socket: &SocketId) {
        self.manager.on_disconnect(socket).await;
    }

    async fn route(&self, socket: &SocketId, event: &str, payload: Value) -> EngineResult<Value> {
        match event {
            "room:create" => {
                let (code, room) = self.manager.create_room(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "roomCode": code, "room": room })))
            }
            "room:join" => {
                let (player, room) = self.manager.join_room(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "player": player, "room": room })))
            }
            "room:rejoin" => {
                let (player, room) = self.manager.rejoin_room(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "player": player, "room": room })))
            }
            "room:leave" => {
                self.manager.leave_room(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "room:kick" => {
                self.manager.kick_player(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "room:update-settings" => {
                let settings = self
                    .manager
                    .update_settings(socket, decode(payload)?)
                    .await?;
                Ok(ack_ok(json!({ "settings": settings })))
            }
            "player:update" => {
                let player = self.manager.update_player(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "player": player })))
            }
            "game:start" => {
                self.engine.start_game(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "game:next-question" => {
                self.engine.next_question(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "game:pause" => {
                self.engine.pause_game(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "game:resume" => {
                self.engine.resume_game(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "game:end" => {
                self.engine.end_game(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "game:restart" => {
                self.engine.restart_game(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "answer:submit" => {
                let accepted = self.engine.submit_answer(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "accepted": accepted })))
            }
            "answer:timeout" => {
                self.engine.answer_timeout(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({})))
            }
            "quiz:generate" => {
                let questions = self.manager.generate_quiz(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "questions": questions })))
            }
            "quiz:select-category" => {
                self.manager
                    .select_category(socket, decode(payload)?)
                    .await?;
                Ok(ack_ok(json!({})))
            }
            "quiz:set-options" => {
                let settings = self.manager.set_options(socket, decode(payload)?).await?;
                Ok(ack_ok(json!({ "settings": settings })))
            }
            _ => Err(EngineError::Validation("Unknown event".into())),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> EngineResult<T> {
    serde_json::from_value(payload).map_err(|_| EngineError::Validation("Invalid payload".into()))
}
