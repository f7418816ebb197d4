//! C8: the state machine (§4.8) — the heart of the system. `Start`,
//! `Process` and its sub-handlers, `AdvanceTurn`, `EndGame`,
//! `WorldLeaderboard`. Runs every mutating operation under the per-chat
//! lock from `ChatLockTable`; the per-chat process-local caches
//! (`used_questions`, the turn cursor, the "only-one-left" flag) live here,
//! keyed by `chat_id`, per the design notes in §9.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{Game, GameScore, GameState, User};
use crate::errors::GameError;
use crate::full_info;
use crate::messaging::{keyboard, MessagingClient};
use crate::store::{GameStore, QuestionStore, StoreHandle, UserStore};

use super::chat_lock::ChatLockTable;
use super::text;

/// Process-local, per-chat scratch state that has no business living in the
/// relational store: the questions already asked in this chat, the
/// round-robin turn cursor, and whether the "sole survivor forces WORD"
/// rule is in effect. Mutated only while the caller holds that chat's lock.
#[derive(Default)]
struct ChatState {
    used_questions: Vec<String>,
    turn_cursor: usize,
    only_one_left: bool,
}

/// What `Start` returns to its caller: the newly created game and the
/// player whose turn it is.
pub struct StartOutcome {
    pub game: Game,
    pub first_player: User,
}

pub struct GameEngine {
    messaging: Arc<dyn MessagingClient>,
    store: Arc<StoreHandle>,
    locks: ChatLockTable,
    chat_state: Mutex<HashMap<i64, ChatState>>,
}

impl GameEngine {
    pub fn new(messaging: Arc<dyn MessagingClient>, store: Arc<StoreHandle>) -> Self {
        GameEngine {
            messaging,
            store,
            locks: ChatLockTable::new(),
            chat_state: Mutex::new(HashMap::new()),
        }
    }

    async fn with_chat_state<R>(&self, chat_id: i64, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut map = self.chat_state.lock().await;
        let entry = map.entry(chat_id).or_insert_with(ChatState::default);
        f(entry)
    }

    /// §4.8 Start(peer_id).
    pub async fn start(&self, peer_id: i64) -> Result<Option<StartOutcome>, GameError> {
        let _guard = self.locks.lock(peer_id).await;

        let members = self.messaging.fetch_members(peer_id).await?;
        if members.is_empty() {
            return Ok(None);
        }
        self.store.as_user_store().upsert_users(&members).await?;

        let excluded = self
            .with_chat_state(peer_id, |s| s.used_questions.clone())
            .await;
        let question = self
            .store
            .as_question_store()
            .pick_random_question_excluding(&excluded)
            .await?;
        let question = match question {
            Some(q) => q,
            None => {
                self.messaging
                    .send_message(peer_id - crate::messaging::ID_CONSTANT, text::NO_QUESTIONS_LEFT, keyboard::default_keyboard())
                    .await?;
                return Ok(None);
            }
        };

        let first_player = members[0].clone();

        let mut game = Game {
            id: 0,
            chat_id: peer_id,
            created_at: Utc::now(),
            question: question.clone(),
            state: GameState::Picking,
            last_guess: None,
            turn_user_id: first_player.vk_id,
            letters_revealed: String::new(),
            scores: Vec::new(),
            players: members.clone(),
        };

        let game_id = self.store.as_game_store().insert_game(&game).await?;
        game.id = game_id;

        let scores: Vec<GameScore> = members
            .iter()
            .map(|u| GameScore {
                game_id,
                user_vk_id: u.vk_id,
                points: 0,
                user_is_active: true,
            })
            .collect();
        self.store.as_game_store().insert_scores(&scores).await?;
        game.scores = scores;

        self.with_chat_state(peer_id, |s| {
            s.used_questions.push(question.question_text.clone());
            s.turn_cursor = 0;
            s.only_one_left = false;
        })
        .await;

        full_info!("game {} started in chat {}", game_id, peer_id);
        Ok(Some(StartOutcome { game, first_player }))
    }

    /// §4.8 Process(game, text, from_id). `peer_id` is the inbound chat id
    /// (unconverted); the game is re-read fresh after the lock is acquired
    /// so the check-and-act sequence below is never racing a concurrent
    /// `Process` call for the same chat.
    pub async fn process(&self, peer_id: i64, message_text: &str, from_id: i64) -> Result<(), GameError> {
        let _guard = self.locks.lock(peer_id).await;
        let chat_id = peer_id - crate::messaging::ID_CONSTANT;

        let mut game = match self.store.as_game_store().get_latest_game(peer_id).await? {
            Some(g) if !g.state.is_finished() => g,
            _ => return Ok(()),
        };

        if message_text == keyboard::STOP_LABEL {
            self.end_game(chat_id, &mut game, None).await?;
            return Ok(());
        }

        if !game.is_actor_valid(from_id) {
            return Ok(());
        }
        let actor = match game.player(from_id) {
            Some(u) => u.clone(),
            None => return Ok(()),
        };

        // §4.8 HandleWord "k = 2" branch: once the only-one-left flag is set
        // for this chat, the sole remaining player's input is always treated
        // as a word attempt, regardless of which button they press.
        let forced_word = self.with_chat_state(game.chat_id, |s| s.only_one_left).await;

        if message_text == keyboard::LETTER_LABEL || message_text == keyboard::WORD_LABEL {
            let new_state = if forced_word {
                GameState::Word
            } else if message_text == keyboard::LETTER_LABEL {
                GameState::Letter
            } else {
                GameState::Word
            };
            if new_state != game.state {
                self.store
                    .as_game_store()
                    .update_game_state(game.id, new_state, Some(message_text))
                    .await?;
            }
            self.messaging
                .send_message(chat_id, &text::action_prompt(&actor.name), keyboard::default_keyboard())
                .await?;
            return Ok(());
        }

        if forced_word {
            return self.handle_word(chat_id, &mut game, message_text, &actor).await;
        }

        match game.state {
            GameState::Picking => Ok(()),
            GameState::Letter => self.handle_letter(chat_id, &mut game, message_text, &actor).await,
            GameState::Word => self.handle_word(chat_id, &mut game, message_text, &actor).await,
            GameState::Finish => Ok(()),
        }
    }

    async fn handle_letter(
        &self,
        chat_id: i64,
        game: &mut Game,
        message_text: &str,
        actor: &User,
    ) -> Result<(), GameError> {
        if message_text.chars().count() != 1 {
            self.messaging
                .send_message(
                    chat_id,
                    &text::choose_one_letter(&actor.name, &actor.last_name),
                    keyboard::default_keyboard(),
                )
                .await?;
            return Ok(());
        }

        let c = message_text.to_lowercase();
        let answer = game.question.lower_answer();

        if game.letters_revealed.contains(c.as_str()) {
            self.messaging
                .send_message(chat_id, &text::letter_already_revealed(&actor.name), keyboard::default_keyboard())
                .await?;
            return Ok(());
        }

        if !answer.contains(c.as_str()) {
            self.messaging
                .send_message(chat_id, &text::no_such_letter(&actor.name), keyboard::default_keyboard())
                .await?;
            self.advance_turn(chat_id, game, None, false).await?;
            self.store
                .as_game_store()
                .update_game_state(game.id, GameState::Letter, Some(message_text))
                .await?;
            game.state = GameState::Letter;
            game.last_guess = Some(message_text.to_owned());
            return Ok(());
        }

        let occurrences = answer.matches(c.as_str()).count() as i64;
        self.store
            .as_game_store()
            .increment_score(game.id, actor.vk_id, occurrences)
            .await?;
        if let Some(score) = game.score_for_mut(actor.vk_id) {
            score.points += occurrences;
        }

        game.letters_revealed.push_str(&c);
        self.store
            .as_game_store()
            .update_letters_revealed(game.id, &game.letters_revealed)
            .await?;

        let revealed: std::collections::HashSet<char> = game.letters_revealed.chars().collect();
        let answer_set: std::collections::HashSet<char> = answer.chars().collect();

        if revealed == answer_set {
            self.store.as_game_store().increment_score(game.id, actor.vk_id, 10).await?;
            if let Some(score) = game.score_for_mut(actor.vk_id) {
                score.points += 10;
            }
            self.end_game(chat_id, game, Some(actor.clone())).await?;
            return Ok(());
        }

        let display_word: String = game
            .question
            .answer_text
            .chars()
            .map(|ch| {
                if revealed.contains(&ch.to_ascii_lowercase()) {
                    ch
                } else {
                    '-'
                }
            })
            .collect();

        self.store
            .as_game_store()
            .update_game_state(game.id, GameState::Letter, Some(message_text))
            .await?;
        game.state = GameState::Letter;
        game.last_guess = Some(message_text.to_owned());

        self.messaging
            .send_message(chat_id, &text::display_and_choose_again(&display_word), keyboard::game_keyboard())
            .await?;
        Ok(())
    }

    async fn handle_word(
        &self,
        chat_id: i64,
        game: &mut Game,
        message_text: &str,
        actor: &User,
    ) -> Result<(), GameError> {
        if message_text.chars().count() == 1 {
            self.messaging
                .send_message(
                    chat_id,
                    &text::name_a_word(&actor.name, &actor.last_name),
                    keyboard::default_keyboard(),
                )
                .await?;
            return Ok(());
        }

        if message_text.to_lowercase() == game.question.lower_answer() {
            self.store.as_game_store().increment_score(game.id, actor.vk_id, 10).await?;
            if let Some(score) = game.score_for_mut(actor.vk_id) {
                score.points += 10;
            }
            self.end_game(chat_id, game, Some(actor.clone())).await?;
            return Ok(());
        }

        self.messaging
            .send_message(
                chat_id,
                &text::user_kicked(&actor.name, &actor.last_name),
                keyboard::default_keyboard(),
            )
            .await?;
        self.store.as_game_store().set_user_inactive(game.id, actor.vk_id).await?;
        if let Some(score) = game.score_for_mut(actor.vk_id) {
            score.user_is_active = false;
        }

        let active_count = game.active_player_ids().len();
        match active_count {
            0 | 1 => {
                self.end_game(chat_id, game, None).await?;
            }
            2 => {
                self.with_chat_state(game.chat_id, |s| s.only_one_left = true).await;
                self.advance_turn(chat_id, game, Some(actor.vk_id), true).await?;
            }
            _ => {
                self.advance_turn(chat_id, game, Some(actor.vk_id), false).await?;
            }
        }

        self.store
            .as_game_store()
            .update_game_state(game.id, game.state, Some(message_text))
            .await?;
        game.last_guess = Some(message_text.to_owned());
        Ok(())
    }

    /// Round-robin over `game.players`, skipping inactive players and
    /// `excluded`, starting just after the per-chat turn cursor (§4.8
    /// AdvanceTurn). `last_player` selects the "sole survivor" prompt
    /// variant (§8 S3/S4).
    async fn advance_turn(
        &self,
        chat_id: i64,
        game: &mut Game,
        excluded: Option<i64>,
        last_player: bool,
    ) -> Result<(), GameError> {
        let cursor = self.with_chat_state(game.chat_id, |s| s.turn_cursor).await;
        let n = game.players.len();
        if n == 0 {
            return Ok(());
        }

        let mut next: Option<(usize, User)> = None;
        for step in 1..=n {
            let idx = (cursor + step) % n;
            let candidate = &game.players[idx];
            if Some(candidate.vk_id) == excluded {
                continue;
            }
            let active = game
                .score_for(candidate.vk_id)
                .map(|s| s.user_is_active)
                .unwrap_or(false);
            if active {
                next = Some((idx, candidate.clone()));
                break;
            }
        }

        let (idx, next_player) = match next {
            Some(v) => v,
            None => return Ok(()),
        };

        self.with_chat_state(game.chat_id, |s| s.turn_cursor = idx).await;
        self.store.as_game_store().update_turn(game.id, next_player.vk_id).await?;
        game.turn_user_id = next_player.vk_id;

        let prompt = if last_player {
            text::last_player_prompt(&next_player.name, &next_player.last_name)
        } else {
            text::next_turn_prompt(&next_player.name, &next_player.last_name)
        };
        self.messaging.send_message(chat_id, &prompt, keyboard::game_keyboard()).await?;
        Ok(())
    }

    /// §4.8 EndGame(game, winner?, reason?).
    async fn end_game(&self, chat_id: i64, game: &mut Game, winner: Option<User>) -> Result<(), GameError> {
        let leaderboard = self.game_leaderboard(game);
        let message = match &winner {
            Some(user) => text::congratulations(&user.name, &user.last_name, &game.question.answer_text, &leaderboard),
            None => text::game_over(&leaderboard),
        };
        self.messaging.send_message(chat_id, &message, keyboard::preview_keyboard()).await?;

        self.store.as_game_store().finish_game(game.id).await?;
        game.state = GameState::Finish;
        game.last_guess = Some("finish".to_owned());

        let deltas: HashMap<i64, i64> = game.scores.iter().map(|s| (s.user_vk_id, s.points)).collect();
        self.store.as_user_store().bulk_increment_user_points(&deltas).await?;

        full_info!("game {} finished in chat {}", game.id, chat_id);
        Ok(())
    }

    fn game_leaderboard(&self, game: &Game) -> String {
        let mut rows: Vec<&GameScore> = game.scores.iter().collect();
        rows.sort_by(|a, b| b.points.cmp(&a.points));
        let body = rows
            .iter()
            .map(|s| {
                let name = game
                    .player(s.user_vk_id)
                    .map(|u| u.display_name())
                    .unwrap_or_else(|| s.user_vk_id.to_string());
                format!("{}: {}", name, s.points)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}{}", text::game_leaderboard_header(game.id), body)
    }

    /// §4.8 WorldLeaderboard(peer_id).
    pub async fn world_leaderboard(&self, peer_id: i64) -> Result<String, GameError> {
        let members = self.messaging.fetch_members(peer_id).await?;
        let ids: Vec<i64> = members.iter().map(|u| u.vk_id).collect();
        let users = self.store.as_user_store().list_users_by_vk_ids(&ids).await?;
        if users.is_empty() {
            return Ok(text::NO_ONE_PLAYED.to_owned());
        }
        let lines = users
            .iter()
            .map(|u| format!("{} {} - {} <br>", u.name, u.last_name, u.total_points))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("{}\n{}", text::WORLD_LEADERBOARD_HEADER, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::fake::FakeMessagingClient;
    use crate::store::StoreHandle;

    fn engine_with(members: Vec<User>) -> (Arc<GameEngine>, Arc<FakeMessagingClient>, Arc<StoreHandle>) {
        let messaging = Arc::new(FakeMessagingClient::new(members));
        let store = Arc::new(StoreHandle::new_memory());
        let engine = Arc::new(GameEngine::new(messaging.clone(), store.clone()));
        (engine, messaging, store)
    }

    fn user(vk_id: i64, name: &str) -> User {
        User {
            vk_id,
            name: name.into(),
            last_name: "L".into(),
            total_points: 0,
        }
    }

    async fn seed_question(store: &StoreHandle, answer: &str) {
        store.as_question_store().insert_question("q?", answer).await.unwrap();
    }

    #[tokio::test]
    async fn s1_single_letter_win_credits_occurrences_then_ten() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let (engine, messaging, store) = engine_with(vec![u1.clone(), u2.clone()]);
        seed_question(&store, "AB").await;

        let outcome = engine.start(1).await.unwrap().unwrap();
        assert_eq!(outcome.first_player.vk_id, 1);

        engine.process(1, keyboard::LETTER_LABEL, 1).await.unwrap();
        engine.process(1, "A", 1).await.unwrap();
        let mid_game = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert_eq!(mid_game.letters_revealed, "a");
        assert_eq!(mid_game.score_for(1).unwrap().points, 1);
        assert!(matches!(mid_game.state, GameState::Letter));

        engine.process(1, "B", 1).await.unwrap();
        let finished = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert!(finished.state.is_finished());
        assert_eq!(finished.score_for(1).unwrap().points, 11);

        let users = store.as_user_store().list_users_by_vk_ids(&[1]).await.unwrap();
        assert_eq!(users[0].total_points, 11);
        let _ = messaging.sent_messages().await;
    }

    #[tokio::test]
    async fn s2_wrong_letter_passes_turn() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let (engine, _messaging, store) = engine_with(vec![u1, u2]);
        seed_question(&store, "CAT").await;

        engine.start(1).await.unwrap().unwrap();
        engine.process(1, keyboard::LETTER_LABEL, 1).await.unwrap();
        engine.process(1, "Z", 1).await.unwrap();

        let game = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert_eq!(game.turn_user_id, 2);
        assert_eq!(game.letters_revealed, "");
        assert_eq!(game.last_guess.as_deref(), Some("Z"));
    }

    #[tokio::test]
    async fn s5_stale_actor_is_silently_dropped() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let (engine, messaging, store) = engine_with(vec![u1, u2]);
        seed_question(&store, "CAT").await;

        engine.start(1).await.unwrap().unwrap();
        let before = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        let sent_before = messaging.sent_messages().await.len();

        engine.process(1, "A", 2).await.unwrap();

        let after = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert_eq!(before.turn_user_id, after.turn_user_id);
        assert_eq!(before.state, after.state);
        assert_eq!(messaging.sent_messages().await.len(), sent_before);
    }

    #[tokio::test]
    async fn wrong_word_eliminates_and_three_players_advances_turn() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let u3 = user(3, "U3");
        let (engine, _messaging, store) = engine_with(vec![u1, u2, u3]);
        seed_question(&store, "DOG").await;

        engine.start(1).await.unwrap().unwrap();
        engine.process(1, keyboard::WORD_LABEL, 1).await.unwrap();
        engine.process(1, "NOPE", 1).await.unwrap();

        let game = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert!(!game.score_for(1).unwrap().user_is_active);
        assert_eq!(game.turn_user_id, 2);
        assert!(!game.state.is_finished());
    }

    #[tokio::test]
    async fn only_one_left_forces_word_semantics_regardless_of_button_pressed() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let u3 = user(3, "U3");
        let (engine, _messaging, store) = engine_with(vec![u1, u2, u3]);
        seed_question(&store, "DOG").await;

        engine.start(1).await.unwrap().unwrap();
        engine.process(1, keyboard::WORD_LABEL, 1).await.unwrap();
        engine.process(1, "NOPE", 1).await.unwrap();

        let game = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert_eq!(game.turn_user_id, 2);
        assert!(!game.state.is_finished());

        // U2 is now the sole survivor against U3's score row (U1 eliminated);
        // pressing the LETTER button must still be treated as a word guess.
        engine.process(1, keyboard::LETTER_LABEL, 2).await.unwrap();
        let after_button = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert_eq!(after_button.state, GameState::Word);

        engine.process(1, "NOPE", 2).await.unwrap();
        let finished = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert!(finished.state.is_finished());
        assert!(!finished.score_for(2).unwrap().user_is_active);
    }

    #[tokio::test]
    async fn sole_survivor_forced_word_ends_game_when_only_one_active_remains() {
        let u1 = user(1, "U1");
        let u2 = user(2, "U2");
        let (engine, _messaging, store) = engine_with(vec![u1, u2]);
        seed_question(&store, "DOG").await;

        engine.start(1).await.unwrap().unwrap();
        engine.process(1, keyboard::WORD_LABEL, 1).await.unwrap();
        engine.process(1, "NOPE", 1).await.unwrap();

        let game = store.as_game_store().get_latest_game(1).await.unwrap().unwrap();
        assert!(game.state.is_finished());
    }

    #[tokio::test]
    async fn no_questions_left_returns_none_and_sends_message() {
        let u1 = user(1, "U1");
        let (engine, messaging, _store) = engine_with(vec![u1]);
        let outcome = engine.start(1).await.unwrap();
        assert!(outcome.is_none());
        let sent = messaging.sent_messages().await;
        assert_eq!(sent.last().unwrap().text, text::NO_QUESTIONS_LEFT);
    }

    #[tokio::test]
    async fn world_leaderboard_reports_no_one_played_sentinel() {
        let u1 = user(1, "U1");
        let (engine, _messaging, _store) = engine_with(vec![u1]);
        let board = engine.world_leaderboard(1).await.unwrap();
        assert_eq!(board, text::NO_ONE_PLAYED);
    }
}
