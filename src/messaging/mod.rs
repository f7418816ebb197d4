//! C1: talking to the external messaging platform — long-poll, send,
//! member-fetch, and keyboard rendering (§4.1, §6). Split into the wire
//! types (`types.rs`), the keyboard factories (`keyboard.rs`), and the
//! client itself, the way the reference service keeps its VK-analogue
//! wire shapes (`UserProfile`, the various request/response structs) next
//! to the code that talks to the collaborator, not buried in `shared_models`.

pub mod keyboard;
pub mod types;

use rand::Rng;
use serde_json::Value;

use crate::domain::User;
use crate::errors::GameError;
use crate::full_info;

pub use keyboard::Keyboard;
pub use types::{Update, UpdateMessage};

/// `peer_id - chat_id` offset used when addressing a chat in outbound sends
/// (§4.1). Inbound `peer_id` is stored unchanged on `Game.chat_id`.
pub const ID_CONSTANT: i64 = 2_000_000_000;

const API_BASE: &str = "https://api.vk.com/method/";
const API_VERSION: &str = "5.131";

/// Everything the ingestion pipeline and the game engine need from the
/// messaging platform (§4.1). A trait so the engine/router/poller can be
/// exercised against `FakeMessagingClient` in tests without touching the
/// network.
#[async_trait::async_trait]
pub trait MessagingClient: Send + Sync {
    async fn long_poll(&self) -> Result<(Vec<Update>, i64), GameError>;
    async fn send_message(&self, chat_id: i64, text: &str, keyboard: Keyboard) -> Result<(), GameError>;
    async fn fetch_members(&self, peer_id: i64) -> Result<Vec<User>, GameError>;
}

/// Mutable long-poll session state: `(server, key, ts)`, refreshed once at
/// startup and re-fetched on `ProtocolError` (§4.1, §4.3).
struct LongPollSession {
    server: String,
    key: String,
    ts: i64,
}

pub struct VkMessagingClient {
    http: reqwest::Client,
    group_id: String,
    token: String,
    session: tokio::sync::RwLock<Option<LongPollSession>>,
}

impl VkMessagingClient {
    pub fn new(group_id: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            group_id,
            token,
            session: tokio::sync::RwLock::new(None),
        }
    }

    async fn handshake(&self) -> Result<(), GameError> {
        let resp: Value = self
            .http
            .get(format!("{}groups.getLongPollServer", API_BASE))
            .query(&[
                ("group_id", self.group_id.as_str()),
                ("access_token", self.token.as_str()),
                ("v", API_VERSION),
            ])
            .send()
            .await?
            .json()
            .await?;

        let data = resp
            .get("response")
            .ok_or_else(|| GameError::ProtocolError("missing response field".into()))?;
        let server = data
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| GameError::ProtocolError("missing server field".into()))?
            .to_owned();
        let key = data
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| GameError::ProtocolError("missing key field".into()))?
            .to_owned();
        let ts = data
            .get("ts")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| data.get("ts").and_then(Value::as_i64))
            .ok_or_else(|| GameError::ProtocolError("missing ts field".into()))?;

        full_info!("long poll server handshake ok: server={}", server);
        *self.session.write().await = Some(LongPollSession { server, key, ts });
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessagingClient for VkMessagingClient {
    async fn long_poll(&self) -> Result<(Vec<Update>, i64), GameError> {
        if self.session.read().await.is_none() {
            self.handshake().await?;
        }

        let (server, key, ts) = {
            let guard = self.session.read().await;
            let s = guard.as_ref().expect("handshake just populated session");
            (s.server.clone(), s.key.clone(), s.ts)
        };

        let resp: Value = self
            .http
            .get(&server)
            .query(&[
                ("act", "a_check"),
                ("key", key.as_str()),
                ("ts", &ts.to_string()),
                ("wait", "30"),
            ])
            .send()
            .await
            .map_err(GameError::from)?
            .json()
            .await
            .map_err(GameError::from)?;

        if resp.get("failed").is_some() {
            // VK returns {"failed": N} on an expired/invalid key; treat as
            // protocol-level and force a re-handshake on the next call.
            *self.session.write().await = None;
            return Err(GameError::ProtocolError("long poll key expired".into()));
        }

        let new_ts = resp
            .get("ts")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| resp.get("ts").and_then(Value::as_i64))
            .ok_or_else(|| GameError::ProtocolError("missing ts field".into()))?;

        let raw_updates = resp
            .get("updates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut updates = Vec::with_capacity(raw_updates.len());
        for raw in raw_updates {
            updates.push(types::parse_update(&raw)?);
        }

        if let Some(s) = self.session.write().await.as_mut() {
            s.ts = new_ts;
        }

        Ok((updates, new_ts))
    }

    async fn send_message(&self, chat_id: i64, text: &str, keyboard: Keyboard) -> Result<(), GameError> {
        let random_id: u32 = rand::thread_rng().gen();
        let keyboard_json = serde_json::to_string(&keyboard)?;
        self.http
            .get(format!("{}messages.send", API_BASE))
            .query(&[
                ("random_id", random_id.to_string()),
                ("chat_id", chat_id.to_string()),
                ("message", text.to_owned()),
                ("access_token", self.token.clone()),
                ("keyboard", keyboard_json),
                ("v", API_VERSION.to_owned()),
            ])
            .send()
            .await?;
        Ok(())
    }

    async fn fetch_members(&self, peer_id: i64) -> Result<Vec<User>, GameError> {
        let resp: Value = self
            .http
            .get(format!("{}messages.getConversationMembers", API_BASE))
            .query(&[
                ("peer_id", peer_id.to_string()),
                ("fields", "id".to_owned()),
                ("access_token", self.token.clone()),
                ("v", API_VERSION.to_owned()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let profiles = resp
            .get("response")
            .and_then(|r| r.get("profiles"))
            .and_then(Value::as_array)
            .ok_or_else(|| GameError::ProtocolError("missing response.profiles field".into()))?;

        profiles
            .iter()
            .map(|p| {
                let vk_id = p
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| GameError::ProtocolError("missing profile id".into()))?;
                let name = p
                    .get("first_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let last_name = p
                    .get("last_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Ok(User {
                    vk_id,
                    name,
                    last_name,
                    total_points: 0,
                })
            })
            .collect()
    }
}
