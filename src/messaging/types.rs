//! Wire shapes for long-poll updates (§6), parsed out of the raw
//! `serde_json::Value` array VK hands back rather than modeled as a
//! `Deserialize` struct — the update shape is a few fields deep inside
//! `object.message`, and validating it field-by-field lets us raise a
//! `ValidationError`-shaped `ProtocolError` with a useful message instead of
//! a generic serde failure.

use serde_json::Value;

use crate::errors::GameError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    pub from_id: i64,
    pub text: String,
    pub id: i64,
    pub peer_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_type: String,
    pub message: UpdateMessage,
}

pub fn parse_update(raw: &Value) -> Result<Update, GameError> {
    let update_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GameError::ProtocolError("update missing type".into()))?
        .to_owned();

    let message = raw
        .get("object")
        .and_then(|o| o.get("message"))
        .ok_or_else(|| GameError::ProtocolError("update missing object.message".into()))?;

    let from_id = message
        .get("from_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| GameError::ProtocolError("message missing from_id".into()))?;
    let text = message
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| GameError::ProtocolError("message missing text".into()))?
        .to_owned();
    let id = message.get("id").and_then(Value::as_i64).unwrap_or_default();
    let peer_id = message
        .get("peer_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| GameError::ProtocolError("message missing peer_id".into()))?;

    Ok(Update {
        update_type,
        message: UpdateMessage {
            from_id,
            text,
            id,
            peer_id,
        },
    })
}

/// Strips a leading `"[club…|@…] "` mention prefix the platform injects when
/// a button press in a group chat echoes the bot's handle — the canonical
/// message is the substring after the last `"] "`, else the text unchanged
/// (§4.7).
pub fn strip_mention_prefix(text: &str) -> &str {
    match text.rfind("] ") {
        Some(idx) => &text[idx + 2..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_update() {
        let raw = serde_json::json!({
            "type": "message_new",
            "object": {
                "message": {"from_id": 7, "text": "hi", "id": 1, "peer_id": 2_000_000_001i64}
            }
        });
        let update = parse_update(&raw).unwrap();
        assert_eq!(update.message.from_id, 7);
        assert_eq!(update.message.peer_id, 2_000_000_001);
    }

    #[test]
    fn missing_peer_id_is_a_protocol_error() {
        let raw = serde_json::json!({"type": "message_new", "object": {"message": {"from_id": 1, "text": "x", "id": 1}}});
        assert!(matches!(parse_update(&raw), Err(GameError::ProtocolError(_))));
    }

    #[test]
    fn strips_club_mention_prefix() {
        assert_eq!(
            strip_mention_prefix("[club222330688|@club222330688] Старт 🚀"),
            "Старт 🚀"
        );
    }

    #[test]
    fn leaves_plain_text_unchanged() {
        assert_eq!(strip_mention_prefix("Старт 🚀"), "Старт 🚀");
    }
}
