//! Shared fixtures for unit tests: a fully wired engine over in-memory
//! collaborators with a recording bus and a pinned code source.

use std::sync::Arc;

use crate::{
    archive::{SessionArchive, testing::RecordingArchive},
    avatar::AvatarPools,
    code::{RoomCode, RoomCodeIssuer, testing::FixedCodes},
    config::EngineConfig,
    dispatch::Dispatcher,
    engine::GameEngine,
    events::{ConnectionRegistry, SharedBus, SocketId, testing::RecordingBus},
    manager::RoomManager,
    protocol::{CreateRoomRequest, JoinKind, JoinPlayer, JoinRoomRequest},
    questions::{
        QuestionPipeline,
        testing::{FailingProvider, MemoryCatalog},
    },
    room::{AnswerOptions, Choice, Player, Question},
    store::{MemoryCache, RoomStore, StoreError},
    timer::{Clock, TimerRegistry},
};

pub(crate) struct Harness {
    pub store: Arc<RoomStore>,
    pub bus: Arc<RecordingBus>,
    pub registry: Arc<ConnectionRegistry>,
    pub timers: Arc<TimerRegistry>,
    pub avatars: Arc<AvatarPools>,
    pub archive: Arc<RecordingArchive>,
    pub manager: Arc<RoomManager>,
    pub engine: Arc<GameEngine>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_codes(&["K7MN2P"])
    }

    pub fn with_codes(codes: &[&str]) -> Self {
        Self::build(codes, MemoryCatalog::default())
    }

    pub fn with_catalog(questions: Vec<Question>) -> Self {
        Self::build(&["K7MN2P"], MemoryCatalog::with_questions(questions))
    }

    fn build(codes: &[&str], catalog: MemoryCatalog) -> Self {
        let store = Arc::new(RoomStore::new(Arc::new(MemoryCache::new())));
        let bus = Arc::new(RecordingBus::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let timers = Arc::new(TimerRegistry::new());
        let avatars = Arc::new(AvatarPools::new());
        let archive = Arc::new(RecordingArchive::default());
        let clock = Clock::new();
        let config = EngineConfig::default();
        let issuer = RoomCodeIssuer::new(Box::new(FixedCodes::new(codes)));
        let pipeline = Arc::new(QuestionPipeline::new(
            Arc::new(catalog),
            Arc::new(FailingProvider),
        ));

        let manager = Arc::new(RoomManager::new(
            Arc::clone(&store),
            Arc::clone(&bus) as SharedBus,
            Arc::clone(&registry),
            Arc::clone(&avatars),
            Arc::clone(&timers),
            issuer,
            pipeline,
            clock.clone(),
            config.clone(),
        ));
        let engine = Arc::new(GameEngine::new(
            Arc::clone(&store),
            Arc::clone(&bus) as SharedBus,
            Arc::clone(&registry),
            Arc::clone(&timers),
            Arc::clone(&archive) as Arc<dyn SessionArchive>,
            clock,
            config,
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&manager), Arc::clone(&engine));

        Self {
            store,
            bus,
            registry,
            timers,
            avatars,
            archive,
            manager,
            engine,
            dispatcher,
        }
    }

    pub async fn create_room(&self, tv: &str) -> RoomCode {
        self.manager
            .create_room(
                &SocketId::from(tv),
                CreateRoomRequest {
                    host_name: Some("Living Room TV".into()),
                    device_id: None,
                },
            )
            .await
            .unwrap()
            .0
    }

    pub async fn join(&self, code: &RoomCode, socket: &str, name: &str, avatar: &str) -> Player {
        self.manager
            .join_room(
                &SocketId::from(socket),
                JoinRoomRequest {
                    room_code: code.to_string(),
                    kind: JoinKind::Player,
                    player: Some(JoinPlayer {
                        name: name.into(),
                        avatar: Some(avatar.into()),
                        jingle_id: None,
                    }),
                },
            )
            .await
            .unwrap()
            .0
            .unwrap()
    }

    pub async fn load_questions(&self, code: &RoomCode, questions: Vec<Question>) {
        self.store
            .update::<_, StoreError, _>(code, move |room| {
                room.questions = questions;
                Ok(())
            })
            .await
            .unwrap();
    }
}

pub(crate) fn question(id: &str, text: &str, correct: Choice) -> Question {
    Question {
        id: id.into(),
        text: text.into(),
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
