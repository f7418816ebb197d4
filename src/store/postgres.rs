//! Postgres-backed implementation of the store traits. Plain runtime-checked
//! `sqlx::query`/`query_as` (no `query!` macros, since there's no database
//! available at build time to check against) over the four tables in §6:
//! `users`, `questions`, `games`, `game_user`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::{Game, GameScore, GameState, Question, User};
use crate::errors::GameError;

use super::{GameStore, QuestionStore, UserStore};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn state_to_str(state: GameState) -> String {
        state.to_string()
    }

    fn str_to_state(s: &str) -> GameState {
        s.parse().unwrap_or(GameState::Picking)
    }

    async fn load_game_row(&self, row_id: i64) -> Result<Option<Game>, GameError> {
        let row = sqlx::query(
            "SELECT g.id, g.chat_id, g.created_at, g.status, g.last_guess, g.turn_user_id, \
             g.letters_revealed, q.id as question_id, q.question_text, q.answer_text \
             FROM games g JOIN questions q ON q.id = g.question_id WHERE g.id = $1",
        )
        .bind(row_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let id: i64 = row.try_get("id")?;
        let chat_id: i64 = row.try_get("chat_id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let status: String = row.try_get("status")?;
        let last_guess: Option<String> = row.try_get("last_guess")?;
        let turn_user_id: i64 = row.try_get("turn_user_id")?;
        let letters_revealed: String = row.try_get("letters_revealed")?;
        let question = Question {
            id: row.try_get("question_id")?,
            question_text: row.try_get("question_text")?,
            answer_text: row.try_get("answer_text")?,
        };

        let state = Self::str_to_state(&status);

        let score_rows = sqlx::query(
            "SELECT u.vk_id, u.name, u.last_name, u.total_points, gu.points, gu.user_is_active \
             FROM game_user gu JOIN users u ON u.vk_id = gu.user_vk_id WHERE gu.game_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(score_rows.len());
        let mut players = Vec::with_capacity(score_rows.len());
        for r in score_rows {
            let vk_id: i64 = r.try_get("vk_id")?;
            scores.push(GameScore {
                game_id: id,
                user_vk_id: vk_id,
                points: r.try_get("points")?,
                user_is_active: r.try_get("user_is_active")?,
            });
            players.push(User {
                vk_id,
                name: r.try_get("name")?,
                last_name: r.try_get("last_name")?,
                total_points: r.try_get("total_points")?,
            });
        }

        Ok(Some(Game {
            id,
            chat_id,
            created_at,
            question,
            state,
            last_guess,
            turn_user_id,
            letters_revealed,
            scores,
            players,
        }))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_users(&self, users: &[User]) -> Result<(), GameError> {
        for user in users {
            sqlx::query(
                "INSERT INTO users (vk_id, name, last_name, total_points) VALUES ($1, $2, $3, 0) \
                 ON CONFLICT (vk_id) DO NOTHING",
            )
            .bind(user.vk_id)
            .bind(&user.name)
            .bind(&user.last_name)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_users_by_vk_ids(&self, ids: &[i64]) -> Result<Vec<User>, GameError> {
        let rows = sqlx::query(
            "SELECT vk_id, name, last_name, total_points FROM users WHERE vk_id = ANY($1) \
             ORDER BY total_points DESC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(User {
                    vk_id: r.try_get("vk_id")?,
                    name: r.try_get("name")?,
                    last_name: r.try_get("last_name")?,
                    total_points: r.try_get("total_points")?,
                })
            })
            .collect()
    }

    async fn list_all_users_by_points(&self) -> Result<Vec<User>, GameError> {
        let rows = sqlx::query("SELECT vk_id, name, last_name, total_points FROM users ORDER BY total_points DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(User {
                    vk_id: r.try_get("vk_id")?,
                    name: r.try_get("name")?,
                    last_name: r.try_get("last_name")?,
                    total_points: r.try_get("total_points")?,
                })
            })
            .collect()
    }

    /// Single `CASE WHEN` statement, not a read-then-write pair — see the
    /// atomicity note in §9 of the design doc.
    async fn bulk_increment_user_points(&self, deltas: &HashMap<i64, i64>) -> Result<(), GameError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = deltas.keys().copied().collect();
        let mut case_sql = String::from("UPDATE users SET total_points = total_points + CASE vk_id ");
        let mut params: Vec<i64> = Vec::new();
        for (idx, (vk_id, delta)) in deltas.iter().enumerate() {
            case_sql.push_str(&format!("WHEN ${} THEN ${} ", idx * 2 + 1, idx * 2 + 2));
            params.push(*vk_id);
            params.push(*delta);
        }
        case_sql.push_str("ELSE 0 END WHERE vk_id = ANY($");
        case_sql.push_str(&(params.len() + 1).to_string());
        case_sql.push(')');

        let mut query = sqlx::query(&case_sql);
        for p in &params {
            query = query.bind(p);
        }
        query = query.bind(ids);
        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn pick_random_question_excluding(
        &self,
        exclude_question_texts: &[String],
    ) -> Result<Option<Question>, GameError> {
        let row = sqlx::query(
            "SELECT id, question_text, answer_text FROM questions WHERE question_text <> ALL($1) \
             ORDER BY random() LIMIT 1",
        )
        .bind(exclude_question_texts)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => Ok(Some(Question {
                id: r.try_get("id")?,
                question_text: r.try_get("question_text")?,
                answer_text: r.try_get("answer_text")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_question(&self, question_text: &str, answer_text: &str) -> Result<Question, GameError> {
        let row = sqlx::query(
            "INSERT INTO questions (question_text, answer_text) VALUES ($1, $2) RETURNING id",
        )
        .bind(question_text)
        .bind(answer_text)
        .fetch_one(&self.pool)
        .await?;
        Ok(Question {
            id: row.try_get("id")?,
            question_text: question_text.to_owned(),
            answer_text: answer_text.to_owned(),
        })
    }
}

#[async_trait]
impl GameStore for PgStore {
    async fn get_latest_game(&self, chat_id: i64) -> Result<Option<Game>, GameError> {
        let row = sqlx::query("SELECT id FROM games WHERE chat_id = $1 ORDER BY id DESC LIMIT 1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let id: i64 = r.try_get("id")?;
                self.load_game_row(id).await
            }
            None => Ok(None),
        }
    }

    async fn insert_game(&self, game: &Game) -> Result<i64, GameError> {
        let row = sqlx::query(
            "INSERT INTO games (chat_id, question_id, created_at, status, last_guess, turn_user_id, letters_revealed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(game.chat_id)
        .bind(game.question.id)
        .bind(game.created_at)
        .bind(Self::state_to_str(game.state))
        .bind(&game.last_guess)
        .bind(game.turn_user_id)
        .bind(&game.letters_revealed)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("id").map_err(GameError::from)
    }

    async fn insert_scores(&self, scores: &[GameScore]) -> Result<(), GameError> {
        for score in scores {
            sqlx::query(
                "INSERT INTO game_user (game_id, user_vk_id, points, user_is_active) VALUES ($1, $2, $3, $4)",
            )
            .bind(score.game_id)
            .bind(score.user_vk_id)
            .bind(score.points)
            .bind(score.user_is_active)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn update_game_state(
        &self,
        game_id: i64,
        state: GameState,
        last_guess: Option<&str>,
    ) -> Result<(), GameError> {
        sqlx::query("UPDATE games SET status = $1, last_guess = $2 WHERE id = $3")
            .bind(Self::state_to_str(state))
            .bind(last_guess)
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_turn(&self, game_id: i64, turn_user_id: i64) -> Result<(), GameError> {
        sqlx::query("UPDATE games SET turn_user_id = $1 WHERE id = $2")
            .bind(turn_user_id)
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_letters_revealed(&self, game_id: i64, letters_revealed: &str) -> Result<(), GameError> {
        sqlx::query("UPDATE games SET letters_revealed = $1 WHERE id = $2")
            .bind(letters_revealed)
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `UPDATE ... SET points = points + $delta` — single statement, no
    /// intervening read; closes the atomicity gap noted in §9.
    async fn increment_score(&self, game_id: i64, user_vk_id: i64, delta: i64) -> Result<(), GameError> {
        sqlx::query("UPDATE game_user SET points = points + $1 WHERE game_id = $2 AND user_vk_id = $3")
            .bind(delta)
            .bind(game_id)
            .bind(user_vk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_user_inactive(&self, game_id: i64, user_vk_id: i64) -> Result<(), GameError> {
        sqlx::query("UPDATE game_user SET user_is_active = false WHERE game_id = $1 AND user_vk_id = $2")
            .bind(game_id)
            .bind(user_vk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish_game(&self, game_id: i64) -> Result<(), GameError> {
        sqlx::query("UPDATE games SET status = 'finish', last_guess = 'finish' WHERE id = $1")
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
