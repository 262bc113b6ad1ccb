use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    /// Users allowed to run admin commands in addition to server administrators
    pub admin_users: Vec<u64>,
    /// Channels the auto-reply watches; empty means every channel
    pub monitor_channels: Vec<u64>,
    pub auto_reply_enabled: bool,
    pub keyword_trigger_enabled: bool,
    pub database_path: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub api_model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub status_message: String,
    /// Seconds before a publicly-visible answer is removed again
    pub auto_delete_secs: u64,
    /// Character budget per answer page
    pub page_size: usize,
    /// Upper bound on the processed-message dedup cache
    pub cache_max_size: usize,
    /// Inactivity window before pagination buttons are disabled
    pub pagination_timeout_secs: u64,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a technical support assistant for SillyTavern, \
a frontend for AI chat. Users bring API connection problems (OpenAI, Claude, Gemini and \
compatible backends), character card imports, chat completion settings, extensions and \
performance issues. Answer with concrete steps, include configuration values or code \
snippets where they help, and reply in the language the user wrote in.";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            admin_users: parse_id_list(&env::var("ADMIN_USERS").unwrap_or_default()),
            monitor_channels: parse_id_list(&env::var("MONITOR_CHANNELS").unwrap_or_default()),
            auto_reply_enabled: env::var("AUTO_REPLY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            keyword_trigger_enabled: env::var("KEYWORD_TRIGGER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/taverncord.db".to_string()),
            api_base: env::var("API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: env::var("API_KEY").ok(),
            api_model: env::var("API_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: env::var("MAX_TOKENS")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .unwrap_or(4000),
            temperature: env::var("TEMPERATURE")
                .unwrap_or_else(|_| "0.7".to_string())
                .parse()
                .unwrap_or(0.7),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Answering SillyTavern questions".to_string()),
            auto_delete_secs: env::var("AUTO_DELETE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            page_size: env::var("PAGE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            cache_max_size: env::var("CACHE_MAX_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            pagination_timeout_secs: env::var("PAGINATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        })
    }

    pub fn is_admin_user(&self, user_id: u64) -> bool {
        self.admin_users.contains(&user_id)
    }

    /// Empty allow-list means every channel is watched.
    pub fn should_monitor_channel(&self, channel_id: u64) -> bool {
        self.monitor_channels.is_empty() || self.monitor_channels.contains(&channel_id)
    }
}

fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("admin_users", &self.admin_users)
            .field("monitor_channels", &self.monitor_channels)
            .field("auto_reply_enabled", &self.auto_reply_enabled)
            .field("keyword_trigger_enabled", &self.keyword_trigger_enabled)
            .field("database_path", &self.database_path)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_model", &self.api_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("status_message", &self.status_message)
            .field("auto_delete_secs", &self.auto_delete_secs)
            .field("page_size", &self.page_size)
            .field("cache_max_size", &self.cache_max_size)
            .field("pagination_timeout_secs", &self.pagination_timeout_secs)
            .finish()
    }
}

/// Toggles an admin can flip at runtime. Handed around explicitly instead of
/// living in a process-wide global.
pub struct RuntimeToggles {
    auto_reply: AtomicBool,
    keyword_trigger: AtomicBool,
}

impl RuntimeToggles {
    pub fn new(config: &Config) -> Self {
        Self {
            auto_reply: AtomicBool::new(config.auto_reply_enabled),
            keyword_trigger: AtomicBool::new(config.keyword_trigger_enabled),
        }
    }

    pub fn auto_reply_enabled(&self) -> bool {
        self.auto_reply.load(Ordering::Relaxed)
    }

    pub fn keyword_trigger_enabled(&self) -> bool {
        self.keyword_trigger.load(Ordering::Relaxed)
    }

    /// Flips auto-reply and returns the new state.
    pub fn toggle_auto_reply(&self) -> bool {
        !self.auto_reply.fetch_xor(true, Ordering::Relaxed)
    }

    /// Flips keyword triggering and returns the new state.
    pub fn toggle_keyword_trigger(&self) -> bool {
        !self.keyword_trigger.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        owner_id: Some(1),
        admin_users: Vec::new(),
        monitor_channels: Vec::new(),
        auto_reply_enabled: true,
        keyword_trigger_enabled: true,
        database_path: ":memory:".to_string(),
        api_base: "http://localhost:8080/v1".to_string(),
        api_key: None,
        api_model: "test-model".to_string(),
        system_prompt: "test".to_string(),
        max_tokens: 4000,
        temperature: 0.7,
        status_message: "test".to_string(),
        auto_delete_secs: 300,
        page_size: 1000,
        cache_max_size: 1000,
        pagination_timeout_secs: 300,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_list_parsing() {
        assert_eq!(parse_id_list("1, 2,3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(""), Vec::<u64>::new());
        assert_eq!(parse_id_list("12,notanid,34"), vec![12, 34]);
    }

    #[test]
    fn test_channel_allow_list() {
        let mut config = test_config();
        assert!(config.should_monitor_channel(42), "empty list watches everything");

        config.monitor_channels = vec![1, 2];
        assert!(config.should_monitor_channel(1));
        assert!(!config.should_monitor_channel(42));
    }

    #[test]
    fn test_toggles_flip_and_report_new_state() {
        let config = test_config();
        let toggles = RuntimeToggles::new(&config);
        assert!(toggles.auto_reply_enabled());

        assert!(!toggles.toggle_auto_reply());
        assert!(!toggles.auto_reply_enabled());
        assert!(toggles.toggle_auto_reply());

        assert!(!toggles.toggle_keyword_trigger());
        assert!(!toggles.keyword_trigger_enabled());
    }
}
