/**
 *  Entry point: wires together the ingestion pipeline (Poller → UpdateQueue
 *  → WorkerPool), the GameEngine/Router it feeds, and the thin admin HTTP
 *  surface, the way the reference service's `main.rs` wires its web server
 *  and background actors.
 */
mod admin;
mod config;
mod domain;
mod errors;
mod game;
mod ingestion;
mod macros;
mod messaging;
mod store;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web::Data, App, HttpServer};
use tokio::sync::watch;

use config::BOT_CONFIG;
use game::{GameEngine, Router};
use ingestion::{poller::Poller, queue, worker_pool, RateLimiter};
use messaging::VkMessagingClient;
use store::StoreHandle;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&BOT_CONFIG.rust_log)).init();
    full_info!("starting wonders-bot, worker_count={}", BOT_CONFIG.worker_count);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&BOT_CONFIG.database_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to database at {}: {}", BOT_CONFIG.database_url, e));
    let store = Arc::new(StoreHandle::new_postgres(pool));

    let vk_client = Arc::new(VkMessagingClient::new(
        BOT_CONFIG.bot_group_id.clone(),
        BOT_CONFIG.bot_token.clone(),
    ));
    let messaging: Arc<dyn messaging::MessagingClient> = vk_client.clone();

    let engine = Arc::new(GameEngine::new(messaging.clone(), store.clone()));
    let router = Arc::new(Router::new(engine, messaging.clone(), store.clone()));
    let rate_limiter = RateLimiter::new();

    let (queue_tx, queue_rx) = queue::channel(queue::DEFAULT_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = {
        let poller = Poller::new(vk_client, queue_tx);
        tokio::spawn(async move { poller.run(shutdown_rx).await })
    };

    let worker_handles = worker_pool::spawn(BOT_CONFIG.worker_count, queue_rx, rate_limiter, router);

    let admin_state = admin::AdminState::new(store.clone(), Arc::new(BOT_CONFIG.clone()));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(admin_state.clone()))
            .wrap(Cors::permissive())
            .wrap(actix_web::middleware::Logger::default())
            .configure(admin::configure)
    })
    .bind(("0.0.0.0", 8080))?
    .run();

    let server_result = server.await;

    full_info!("http server stopped, signalling ingestion shutdown");
    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }

    server_result
}
