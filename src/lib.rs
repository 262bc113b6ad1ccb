pub mod answer;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod embeds;
pub mod llm;
pub mod pagination;
pub mod trigger;

use std::time::Instant;

/// Custom data passed to all commands and event handlers
pub struct Data {
    pub config: config::Config,
    pub toggles: config::RuntimeToggles,
    pub http_client: reqwest::Client,
    pub ai: llm::AiClient,
    pub db: db::Database,
    pub triggers: trigger::TriggerEngine,
    /// Process start, for the uptime readout in `/stats`
    pub started_at: Instant,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
