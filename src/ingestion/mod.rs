//! The ingestion pipeline (§2, §4.3-§4.6): Poller → UpdateQueue → WorkerPool,
//! gated per-user by the RateLimiter. Each piece is a narrow module so the
//! concurrency primitives stay easy to reason about in isolation, the way
//! the reference service keeps `long_poller`, `game_container` and `lobby`
//! as separate modules under `games_service` rather than one god-module.

pub mod poller;
pub mod queue;
pub mod rate_limiter;
pub mod worker_pool;

pub use poller::Poller;
pub use queue::{channel, UpdateQueueReceiver, UpdateQueueSender};
pub use rate_limiter::RateLimiter;
pub use worker_pool::{Dispatcher, DEFAULT_WORKER_COUNT};
