//! In-memory backing for the store traits, the direct analogue of the
//! reference service's `TestDb`: every collection is a `RwLock<HashMap<...>>`
//! guarded independently rather than behind one giant lock, so unrelated
//! operations (e.g. reading users while writing a game) don't contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::domain::{Game, GameScore, GameState, Question, User};
use crate::errors::GameError;

use super::{GameStore, QuestionStore, UserStore};

pub struct MemoryStore {
    users: RwLock<HashMap<i64, User>>,
    questions: RwLock<HashMap<i64, Question>>,
    games: RwLock<HashMap<i64, Game>>,
    next_question_id: AtomicI64,
    next_game_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            questions: RwLock::new(HashMap::new()),
            games: RwLock::new(HashMap::new()),
            next_question_id: AtomicI64::new(1),
            next_game_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_users(&self, users: &[User]) -> Result<(), GameError> {
        let mut map = self.users.write().await;
        for user in users {
            map.entry(user.vk_id).or_insert_with(|| user.clone());
        }
        Ok(())
    }

    async fn list_users_by_vk_ids(&self, ids: &[i64]) -> Result<Vec<User>, GameError> {
        let map = self.users.read().await;
        let mut found: Vec<User> = ids.iter().filter_map(|id| map.get(id).cloned()).collect();
        found.sort_by(|a, b| b.total_points.cmp(&a.total_points));
        Ok(found)
    }

    async fn list_all_users_by_points(&self) -> Result<Vec<User>, GameError> {
        let map = self.users.read().await;
        let mut all: Vec<User> = map.values().cloned().collect();
        all.sort_by(|a, b| b.total_points.cmp(&a.total_points));
        Ok(all)
    }

    async fn bulk_increment_user_points(&self, deltas: &HashMap<i64, i64>) -> Result<(), GameError> {
        let mut map = self.users.write().await;
        for (vk_id, delta) in deltas {
            if let Some(user) = map.get_mut(vk_id) {
                user.total_points += delta;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn pick_random_question_excluding(
        &self,
        exclude_question_texts: &[String],
    ) -> Result<Option<Question>, GameError> {
        let map = self.questions.read().await;
        let candidates: Vec<&Question> = map
            .values()
            .filter(|q| !exclude_question_texts.iter().any(|e| e == &q.question_text))
            .collect();
        Ok(candidates
            .choose(&mut rand::thread_rng())
            .map(|q| (*q).clone()))
    }

    async fn insert_question(&self, question_text: &str, answer_text: &str) -> Result<Question, GameError> {
        let id = self.next_question_id.fetch_add(1, Ordering::SeqCst);
        let question = Question {
            id,
            question_text: question_text.to_owned(),
            answer_text: answer_text.to_owned(),
        };
        self.questions.write().await.insert(id, question.clone());
        Ok(question)
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn get_latest_game(&self, chat_id: i64) -> Result<Option<Game>, GameError> {
        let map = self.games.read().await;
        Ok(map
            .values()
            .filter(|g| g.chat_id == chat_id)
            .max_by_key(|g| g.id)
            .cloned())
    }

    async fn insert_game(&self, game: &Game) -> Result<i64, GameError> {
        let id = self.next_game_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = game.clone();
        stored.id = id;
        self.games.write().await.insert(id, stored);
        Ok(id)
    }

    async fn insert_scores(&self, scores: &[GameScore]) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        for score in scores {
            if let Some(game) = map.get_mut(&score.game_id) {
                game.scores.push(score.clone());
            }
        }
        Ok(())
    }

    async fn update_game_state(
        &self,
        game_id: i64,
        state: GameState,
        last_guess: Option<&str>,
    ) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        game.state = state;
        game.last_guess = last_guess.map(|s| s.to_owned());
        Ok(())
    }

    async fn update_turn(&self, game_id: i64, turn_user_id: i64) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        game.turn_user_id = turn_user_id;
        Ok(())
    }

    async fn update_letters_revealed(&self, game_id: i64, letters_revealed: &str) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        game.letters_revealed = letters_revealed.to_owned();
        Ok(())
    }

    async fn increment_score(&self, game_id: i64, user_vk_id: i64, delta: i64) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        let score = game
            .scores
            .iter_mut()
            .find(|s| s.user_vk_id == user_vk_id)
            .ok_or_else(|| GameError::NotFound(format!("score for user {}", user_vk_id)))?;
        score.points += delta;
        Ok(())
    }

    async fn set_user_inactive(&self, game_id: i64, user_vk_id: i64) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        let score = game
            .scores
            .iter_mut()
            .find(|s| s.user_vk_id == user_vk_id)
            .ok_or_else(|| GameError::NotFound(format!("score for user {}", user_vk_id)))?;
        score.user_is_active = false;
        Ok(())
    }

    async fn finish_game(&self, game_id: i64) -> Result<(), GameError> {
        let mut map = self.games.write().await;
        let game = map
            .get_mut(&game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {}", game_id)))?;
        game.state = GameState::Finish;
        game.last_guess = Some("finish".to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_question() -> Question {
        Question {
            id: 1,
            question_text: "q".into(),
            answer_text: "CAT".into(),
        }
    }

    fn sample_game(chat_id: i64) -> Game {
        Game {
            id: 0,
            chat_id,
            created_at: Utc::now(),
            question: sample_question(),
            state: GameState::Picking,
            last_guess: None,
            turn_user_id: 1,
            letters_revealed: String::new(),
            scores: vec![],
            players: vec![],
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_latest_game() {
        let store = MemoryStore::new();
        let id = store.insert_game(&sample_game(42)).await.unwrap();
        assert_eq!(id, 1);
        let fetched = store.get_latest_game(42).await.unwrap().unwrap();
        assert_eq!(fetched.id, 1);
        assert_eq!(fetched.chat_id, 42);
    }

    #[tokio::test]
    async fn get_latest_game_picks_highest_id() {
        let store = MemoryStore::new();
        store.insert_game(&sample_game(7)).await.unwrap();
        let second = store.insert_game(&sample_game(7)).await.unwrap();
        let fetched = store.get_latest_game(7).await.unwrap().unwrap();
        assert_eq!(fetched.id, second);
    }

    #[tokio::test]
    async fn bulk_increment_user_points_is_additive() {
        let store = MemoryStore::new();
        store
            .upsert_users(&[User {
                vk_id: 1,
                name: "A".into(),
                last_name: "B".into(),
                total_points: 5,
            }])
            .await
            .unwrap();
        let mut deltas = HashMap::new();
        deltas.insert(1, 3);
        store.bulk_increment_user_points(&deltas).await.unwrap();
        let users = store.list_users_by_vk_ids(&[1]).await.unwrap();
        assert_eq!(users[0].total_points, 8);
    }

    #[tokio::test]
    async fn pick_random_question_excludes_used() {
        let store = MemoryStore::new();
        let q = store.insert_question("2+2?", "FOUR").await.unwrap();
        let none = store
            .pick_random_question_excluding(&[q.question_text.clone()])
            .await
            .unwrap();
        assert!(none.is_none());
        let some = store.pick_random_question_excluding(&[]).await.unwrap();
        assert!(some.is_some());
    }
}
