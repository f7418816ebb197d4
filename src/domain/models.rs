//! Core data model (§3). Mirrors the reference service's
//! `shared_models.rs`/`service_models.rs` split between wire-shaped and
//! persistence-shaped structs, collapsed into one module here because this
//! service only has one audience for these types (the engine and the store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// A platform user. Created on first sighting in any chat, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub vk_id: i64,
    pub name: String,
    pub last_name: String,
    pub total_points: i64,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.last_name)
    }
}

/// Immutable question/answer pair. `answer_text` is compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub answer_text: String,
}

impl Question {
    pub fn lower_answer(&self) -> String {
        self.answer_text.to_lowercase()
    }
}

/// Design-notes decision: `status_last_action` from the distilled spec is
/// split into a proper state tag (`GameState`) and a separate audit field
/// (`Game::last_guess`) rather than overloading one string column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum GameState {
    Picking,
    Letter,
    Word,
    Finish,
}

impl GameState {
    pub fn is_finished(self) -> bool {
        matches!(self, GameState::Finish)
    }
}

/// One row per (game, user): the scoring association.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameScore {
    pub game_id: i64,
    pub user_vk_id: i64,
    pub points: i64,
    pub user_is_active: bool,
}

/// One game instance in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    pub id: i64,
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
    pub question: Question,
    pub state: GameState,
    /// Most recent literal guess or action-button label, kept only as an
    /// audit trail; the FSM driver is `state`, not this field.
    pub last_guess: Option<String>,
    pub turn_user_id: i64,
    pub letters_revealed: String,
    pub scores: Vec<GameScore>,
    pub players: Vec<User>,
}

impl Game {
    pub fn score_for(&self, vk_id: i64) -> Option<&GameScore> {
        self.scores.iter().find(|s| s.user_vk_id == vk_id)
    }

    pub fn score_for_mut(&mut self, vk_id: i64) -> Option<&mut GameScore> {
        self.scores.iter_mut().find(|s| s.user_vk_id == vk_id)
    }

    pub fn player(&self, vk_id: i64) -> Option<&User> {
        self.players.iter().find(|u| u.vk_id == vk_id)
    }

    pub fn active_player_ids(&self) -> Vec<i64> {
        self.scores
            .iter()
            .filter(|s| s.user_is_active)
            .map(|s| s.user_vk_id)
            .collect()
    }

    /// Invariant #3 of §3: `turn_user_id` always references an active player.
    pub fn is_actor_valid(&self, from_id: i64) -> bool {
        self.turn_user_id == from_id
            && self
                .score_for(from_id)
                .map(|s| s.user_is_active)
                .unwrap_or(false)
    }
}
