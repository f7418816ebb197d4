//! Configuration loading, in the style of the reference service's
//! `service_config.rs`: a JSON file whose path comes from a CLI flag or an
//! environment variable, deserialized once and pinned behind a
//! `lazy_static!`.

use std::fs::File;
use std::io::Read;

use clap::Parser;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::full_info;

#[derive(Parser, Debug)]
#[command(name = "wonders-bot")]
pub struct Arguments {
    #[arg(long)]
    pub config_file: Option<String>,
}

lazy_static! {
    pub static ref BOT_CONFIG: BotConfig = {
        let config_file = match Arguments::try_parse() {
            Ok(args) if args.config_file.is_some() => args.config_file.unwrap(),
            _ => std::env::var("WONDERS_CONFIG_FILE").expect(
                "--config-file not passed in and WONDERS_CONFIG_FILE not set in the environment",
            ),
        };
        full_info!("loading config from {}", config_file);
        BotConfig::from_file(&config_file)
            .unwrap_or_else(|e| panic!("failed to load BotConfig from {}: {}", config_file, e))
    };
}

/// Everything the ingestion pipeline, store, and admin surface need at
/// startup. All fields are required per §6 of the specification; the two
/// tunables at the bottom (`worker_count`, `long_poll_wait_secs`) are
/// operational knobs the core spec takes as given constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    pub bot_group_id: String,
    pub bot_token: String,
    pub database_url: String,
    pub session_key: String,
    pub admin_email: String,
    pub admin_password: String,
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_long_poll_wait")]
    pub long_poll_wait_secs: u64,
}

fn default_rust_log() -> String {
    "info".to_string()
}

fn default_worker_count() -> usize {
    5
}

fn default_long_poll_wait() -> u64 {
    30
}

impl BotConfig {
    pub fn from_file(path: &str) -> Result<Self, std::io::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}
