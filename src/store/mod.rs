//! The persistence contract (§4.2): three narrow traits the game engine
//! depends on, plus a dispatching wrapper that picks between a Postgres
//! backing and an in-memory one — the same split the reference service uses
//! for `UserDbTrait`/`GameDbTrait` and its `Database::{Cosmos,Test}` enum.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{Game, GameScore, GameState, Question, User};
use crate::errors::GameError;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn upsert_users(&self, users: &[User]) -> Result<(), GameError>;
    async fn list_users_by_vk_ids(&self, ids: &[i64]) -> Result<Vec<User>, GameError>;
    async fn list_all_users_by_points(&self) -> Result<Vec<User>, GameError>;
    /// Applied as a single conditional (CASE WHEN) update, never a
    /// read-then-write pair — see the atomicity note in §9.
    async fn bulk_increment_user_points(&self, deltas: &HashMap<i64, i64>) -> Result<(), GameError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn pick_random_question_excluding(
        &self,
        exclude_question_texts: &[String],
    ) -> Result<Option<Question>, GameError>;
    async fn insert_question(&self, question_text: &str, answer_text: &str) -> Result<Question, GameError>;
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Most-recent game for `chat_id`, eagerly loaded with question, scores
    /// and players, or `None` if this chat has never played.
    async fn get_latest_game(&self, chat_id: i64) -> Result<Option<Game>, GameError>;
    async fn insert_game(&self, game: &Game) -> Result<i64, GameError>;
    async fn insert_scores(&self, scores: &[GameScore]) -> Result<(), GameError>;
    async fn update_game_state(
        &self,
        game_id: i64,
        state: GameState,
        last_guess: Option<&str>,
    ) -> Result<(), GameError>;
    async fn update_turn(&self, game_id: i64, turn_user_id: i64) -> Result<(), GameError>;
    async fn update_letters_revealed(&self, game_id: i64, letters_revealed: &str) -> Result<(), GameError>;
    /// `UPDATE game_user SET points = points + $delta` — single statement,
    /// no intervening read.
    async fn increment_score(&self, game_id: i64, user_vk_id: i64, delta: i64) -> Result<(), GameError>;
    async fn set_user_inactive(&self, game_id: i64, user_vk_id: i64) -> Result<(), GameError>;
    async fn finish_game(&self, game_id: i64) -> Result<(), GameError>;
}

/// Dispatching enum, the way the reference service's `Database` enum picks
/// between `Cosmos(CosmosDb)` and `Test(TestDb)`.
pub enum Store {
    Postgres(postgres::PgStore),
    Memory(memory::MemoryStore),
}

macro_rules! dispatch {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            Store::Postgres(s) => s.$method($($arg),*).await,
            Store::Memory(s) => s.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl UserStore for Store {
    async fn upsert_users(&self, users: &[User]) -> Result<(), GameError> {
        dispatch!(self, upsert_users(users))
    }
    async fn list_users_by_vk_ids(&self, ids: &[i64]) -> Result<Vec<User>, GameError> {
        dispatch!(self, list_users_by_vk_ids(ids))
    }
    async fn list_all_users_by_points(&self) -> Result<Vec<User>, GameError> {
        dispatch!(self, list_all_users_by_points())
    }
    async fn bulk_increment_user_points(&self, deltas: &HashMap<i64, i64>) -> Result<(), GameError> {
        dispatch!(self, bulk_increment_user_points(deltas))
    }
}

#[async_trait]
impl QuestionStore for Store {
    async fn pick_random_question_excluding(
        &self,
        exclude_question_texts: &[String],
    ) -> Result<Option<Question>, GameError> {
        dispatch!(self, pick_random_question_excluding(exclude_question_texts))
    }
    async fn insert_question(&self, question_text: &str, answer_text: &str) -> Result<Question, GameError> {
        dispatch!(self, insert_question(question_text, answer_text))
    }
}

#[async_trait]
impl GameStore for Store {
    async fn get_latest_game(&self, chat_id: i64) -> Result<Option<Game>, GameError> {
        dispatch!(self, get_latest_game(chat_id))
    }
    async fn insert_game(&self, game: &Game) -> Result<i64, GameError> {
        dispatch!(self, insert_game(game))
    }
    async fn insert_scores(&self, scores: &[GameScore]) -> Result<(), GameError> {
        dispatch!(self, insert_scores(scores))
    }
    async fn update_game_state(
        &self,
        game_id: i64,
        state: GameState,
        last_guess: Option<&str>,
    ) -> Result<(), GameError> {
        dispatch!(self, update_game_state(game_id, state, last_guess))
    }
    async fn update_turn(&self, game_id: i64, turn_user_id: i64) -> Result<(), GameError> {
        dispatch!(self, update_turn(game_id, turn_user_id))
    }
    async fn update_letters_revealed(&self, game_id: i64, letters_revealed: &str) -> Result<(), GameError> {
        dispatch!(self, update_letters_revealed(game_id, letters_revealed))
    }
    async fn increment_score(&self, game_id: i64, user_vk_id: i64, delta: i64) -> Result<(), GameError> {
        dispatch!(self, increment_score(game_id, user_vk_id, delta))
    }
    async fn set_user_inactive(&self, game_id: i64, user_vk_id: i64) -> Result<(), GameError> {
        dispatch!(self, set_user_inactive(game_id, user_vk_id))
    }
    async fn finish_game(&self, game_id: i64) -> Result<(), GameError> {
        dispatch!(self, finish_game(game_id))
    }
}

/// Thin wrapper mirroring the reference service's `DatabaseWrapper`: callers
/// that only need one slice of the contract borrow through the matching
/// `as_*_store` accessor instead of depending on the whole `Store`.
pub struct StoreHandle {
    db: Box<Store>,
}

impl StoreHandle {
    pub fn new_postgres(pool: sqlx::PgPool) -> Self {
        StoreHandle {
            db: Box::new(Store::Postgres(postgres::PgStore::new(pool))),
        }
    }

    pub fn new_memory() -> Self {
        StoreHandle {
            db: Box::new(Store::Memory(memory::MemoryStore::new())),
        }
    }

    pub fn as_user_store(&self) -> &dyn UserStore {
        &*self.db
    }

    pub fn as_question_store(&self) -> &dyn QuestionStore {
        &*self.db
    }

    pub fn as_game_store(&self) -> &dyn GameStore {
        &*self.db
    }
}
