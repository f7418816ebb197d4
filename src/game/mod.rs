//! The per-chat game state machine (§4.8), its per-chat serialization
//! (§4.9), the Router that feeds it (§4.7), and the user-visible strings it
//! sends (§6).

pub mod chat_lock;
pub mod engine;
pub mod router;
pub mod text;

pub use chat_lock::ChatLockTable;
pub use engine::{GameEngine, StartOutcome};
pub use router::Router;
