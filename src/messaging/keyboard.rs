//! The three keyboard factories of §4.1/§6: `preview`, `default`, `game`.
//! Serialized as `{"inline": true, "buttons": [[...]]}`, UTF-8, non-ASCII
//! labels preserved as-is (no escaping beyond what `serde_json` already does).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonColor {
    Primary,
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub action: ButtonAction,
    pub color: ButtonColor,
}

impl Button {
    fn new(label: &str, id: &str, color: ButtonColor) -> Self {
        Button {
            action: ButtonAction {
                action_type: "text".to_owned(),
                payload: format!("{{\"button\":\"{}\"}}", id),
                label: label.to_owned(),
            },
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub inline: bool,
    pub buttons: Vec<Vec<Button>>,
}

pub const INFO_LABEL: &str = "Инфо 🌍";
pub const START_LABEL: &str = "Старт 🚀";
pub const LEADERBOARD_LABEL: &str = "Таблица Лидеров 🏆";
pub const DEFAULT_LABEL: &str = "Бот отвечает";
pub const LETTER_LABEL: &str = "Выбрать букву 💬";
pub const WORD_LABEL: &str = "Назвать слово 🗣";
pub const STOP_LABEL: &str = "Остановить игру ⛔";

static PREVIEW_KEYBOARD: Lazy<Keyboard> = Lazy::new(|| Keyboard {
    inline: true,
    buttons: vec![
        vec![
            Button::new(INFO_LABEL, "1", ButtonColor::Positive),
            Button::new(START_LABEL, "2", ButtonColor::Positive),
        ],
        vec![Button::new(LEADERBOARD_LABEL, "3", ButtonColor::Positive)],
    ],
});

static DEFAULT_KEYBOARD: Lazy<Keyboard> = Lazy::new(|| Keyboard {
    inline: true,
    buttons: vec![vec![Button::new(DEFAULT_LABEL, "4", ButtonColor::Primary)]],
});

static GAME_KEYBOARD: Lazy<Keyboard> = Lazy::new(|| Keyboard {
    inline: true,
    buttons: vec![
        vec![Button::new(LETTER_LABEL, "5", ButtonColor::Positive)],
        vec![Button::new(WORD_LABEL, "6", ButtonColor::Positive)],
        vec![Button::new(STOP_LABEL, "7", ButtonColor::Negative)],
    ],
});

/// Row 1 `[Инфо, Старт]`, row 2 `[Таблица Лидеров]` (§6).
pub fn preview_keyboard() -> Keyboard {
    PREVIEW_KEYBOARD.clone()
}

/// Single acknowledgement button (§6).
pub fn default_keyboard() -> Keyboard {
    DEFAULT_KEYBOARD.clone()
}

/// Three action rows: letter, word, stop (§6).
pub fn game_keyboard() -> Keyboard {
    GAME_KEYBOARD.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keyboard_has_two_rows() {
        let kb = preview_keyboard();
        assert_eq!(kb.buttons.len(), 2);
        assert_eq!(kb.buttons[0].len(), 2);
        assert_eq!(kb.buttons[1].len(), 1);
    }

    #[test]
    fn game_keyboard_has_three_rows_each_one_button() {
        let kb = game_keyboard();
        assert_eq!(kb.buttons.len(), 3);
        assert!(kb.buttons.iter().all(|row| row.len() == 1));
    }

    #[test]
    fn serializes_with_inline_true_and_preserves_cyrillic() {
        let json = serde_json::to_string(&default_keyboard()).unwrap();
        assert!(json.contains("\"inline\":true"));
        assert!(json.contains(DEFAULT_LABEL));
    }
}
