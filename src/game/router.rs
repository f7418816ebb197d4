//! C7: Router / BotManager (§4.7). Dispatches one update: in-game text goes
//! to `GameEngine::process`, otherwise it's matched against the three
//! canonical keyword commands. Implements `Dispatcher` so the Worker pool
//! can hold it as the dispatch target without depending on its concrete
//! type.

use std::sync::Arc;

use scopeguard::defer;

use crate::full_info;
use crate::ingestion::Dispatcher;
use crate::messaging::{keyboard, types::strip_mention_prefix, MessagingClient, Update, ID_CONSTANT};
use crate::store::{GameStore, StoreHandle};

use super::engine::GameEngine;
use super::text;

pub struct Router {
    engine: Arc<GameEngine>,
    messaging: Arc<dyn MessagingClient>,
    store: Arc<StoreHandle>,
}

impl Router {
    pub fn new(engine: Arc<GameEngine>, messaging: Arc<dyn MessagingClient>, store: Arc<StoreHandle>) -> Self {
        Router {
            engine,
            messaging,
            store,
        }
    }

    /// §4.7.
    pub async fn dispatch_update(&self, update: Update) {
        let peer_id = update.message.peer_id;
        let from_id = update.message.from_id;
        let chat_id = peer_id - ID_CONSTANT;
        let text = strip_mention_prefix(&update.message.text).to_owned();

        full_info!("router: dispatching update for chat {} from {}", chat_id, from_id);
        defer!(full_info!("router: dispatch for chat {} done", chat_id));

        let result = self.route(peer_id, chat_id, from_id, &text).await;
        if let Err(e) = result {
            full_info!("router: dropping update for chat {}: {}", chat_id, e);
        }
    }

    async fn route(&self, peer_id: i64, chat_id: i64, from_id: i64, text: &str) -> Result<(), crate::errors::GameError> {
        let existing_game = self.store.as_game_store().get_latest_game(peer_id).await?;
        if let Some(game) = existing_game {
            if !game.state.is_finished() {
                return self.engine.process(peer_id, text, from_id).await;
            }
        }

        match text {
            keyboard::INFO_LABEL => {
                self.messaging
                    .send_message(chat_id, text::ABOUT_GAME, keyboard::preview_keyboard())
                    .await?;
            }
            keyboard::START_LABEL => {
                if let Some(outcome) = self.engine.start(peer_id).await? {
                    self.messaging
                        .send_message(chat_id, &text::riddle(&outcome.game.question.question_text), keyboard::default_keyboard())
                        .await?;
                    self.messaging
                        .send_message(
                            chat_id,
                            &text::next_turn_prompt(&outcome.first_player.name, &outcome.first_player.last_name),
                            keyboard::game_keyboard(),
                        )
                        .await?;
                }
            }
            keyboard::LEADERBOARD_LABEL => {
                let board = self.engine.world_leaderboard(peer_id).await?;
                self.messaging.send_message(chat_id, &board, keyboard::preview_keyboard()).await?;
            }
            _ => {
                self.messaging
                    .send_message(chat_id, text::WANT_TO_PLAY, keyboard::preview_keyboard())
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Dispatcher for Router {
    async fn dispatch(&self, update: Update) {
        self.dispatch_update(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use crate::messaging::fake::FakeMessagingClient;
    use crate::messaging::UpdateMessage;
    use crate::store::{QuestionStore, StoreHandle};

    fn update(peer_id: i64, from_id: i64, text: &str) -> Update {
        Update {
            update_type: "message_new".into(),
            message: UpdateMessage {
                from_id,
                text: text.to_owned(),
                id: 0,
                peer_id,
            },
        }
    }

    #[tokio::test]
    async fn start_command_sends_riddle_then_turn_prompt() {
        let member = User {
            vk_id: 1,
            name: "A".into(),
            last_name: "B".into(),
            total_points: 0,
        };
        let messaging = Arc::new(FakeMessagingClient::new(vec![member]));
        let store = Arc::new(StoreHandle::new_memory());
        store
            .as_question_store()
            .insert_question("what?", "DOG")
            .await
            .unwrap();
        let engine = Arc::new(GameEngine::new(messaging.clone(), store.clone()));
        let router = Router::new(engine, messaging.clone(), store.clone());

        let peer_id = 2_000_000_042;
        router.dispatch_update(update(peer_id, 1, keyboard::START_LABEL)).await;

        let sent = messaging.sent_messages().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("Внимание, загадка!"));
        assert!(sent[1].text.contains("ваш ход"));
    }

    #[tokio::test]
    async fn unrecognized_text_prompts_to_start() {
        let messaging = Arc::new(FakeMessagingClient::new(vec![]));
        let store = Arc::new(StoreHandle::new_memory());
        let engine = Arc::new(GameEngine::new(messaging.clone(), store.clone()));
        let router = Router::new(engine, messaging.clone(), store.clone());

        router.dispatch_update(update(2_000_000_043, 9, "random text")).await;
        let sent = messaging.sent_messages().await;
        assert_eq!(sent[0].text, text::WANT_TO_PLAY);
    }
}
