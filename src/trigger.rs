use crate::cache::ProcessedCache;
use crate::config::{Config, RuntimeToggles};
use crate::db::KeywordRecord;
use regex::{Regex, RegexBuilder};
use serenity::model::channel::Message;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Message prefixes reserved for bot commands; such messages never auto-reply.
const COMMAND_PREFIXES: [char; 4] = ['/', '!', '?', '.'];

/// SillyTavern support patterns that ship with the bot. Loaded once, never
/// persisted, always evaluated before any admin-managed pattern.
const BUILTIN_PATTERNS: [&str; 10] = [
    r"sillytavern|silly\s*tavern",
    r"st\s+(?:error|错误|问题|bug)",
    r"(?:openai|claude|gemini).{0,10}(?:api|连接|error)",
    r"character\s+card|角色卡",
    r"chat\s+completion|聊天完成",
    r"connection\s+failed|连接失败",
    r"api\s+(?:key|error|问题)",
    r"context\s+(?:length|长度)|上下文",
    r"tavern.{0,20}(?:error|错误|问题)",
    r"(?:配置|setting|config).{0,10}(?:error|错误|问题)",
];

/// Chatter that must never trigger, even when a keyword also matches.
const EXCLUDE_PATTERNS: [&str; 3] = [
    r"^\s*[!/@#$%^&*()]+",
    r"^\s*(?:hi|hello|你好)\s*$",
    r"^\s*(?:thanks|谢谢|thx)\s*$",
];

/// Message text that suggests the author wants a screenshot looked at.
const HELP_INTENT_PATTERNS: [&str; 5] = [
    r"help|帮助|求助",
    r"error|错误|报错|bug",
    r"problem|问题|issue",
    r"什么意思|怎么办|怎么解决",
    r"看看|分析|诊断",
];

/// Attachment filenames that look like error or configuration screenshots.
const FILE_INTENT_PATTERN: &str = r"error|screenshot|config|设置|错误";

pub struct CompiledPattern {
    pub pattern: String,
    pub dynamic: bool,
    regex: Regex,
}

/// Outcome of a successful keyword match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// The literal substring that matched, for trigger-event logging
    pub matched: String,
    /// Source text of the pattern that fired
    pub pattern: String,
    /// Dynamic patterns get their trigger counter bumped; built-ins do not
    pub dynamic: bool,
}

/// Decides, per inbound message, whether and how the answering pipeline runs.
///
/// Built-in patterns, exclusions and the image heuristics are fixed at
/// construction. Dynamic patterns live in a swappable snapshot: matching
/// clones the current `Arc` and keeps using it even if an admin reloads the
/// set mid-flight.
pub struct TriggerEngine {
    builtin: Vec<CompiledPattern>,
    exclusions: Vec<Regex>,
    help_intent: Vec<Regex>,
    file_intent: Regex,
    dynamic: RwLock<Arc<Vec<CompiledPattern>>>,
    processed: ProcessedCache,
}

impl TriggerEngine {
    pub fn new(cache_max_size: usize) -> anyhow::Result<Self> {
        let mut builtin = Vec::with_capacity(BUILTIN_PATTERNS.len());
        for pattern in BUILTIN_PATTERNS {
            builtin.push(CompiledPattern {
                pattern: pattern.to_string(),
                dynamic: false,
                regex: compile(pattern)?,
            });
        }

        let exclusions = EXCLUDE_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let help_intent = HELP_INTENT_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            builtin,
            exclusions,
            help_intent,
            file_intent: compile(FILE_INTENT_PATTERN)?,
            dynamic: RwLock::new(Arc::new(Vec::new())),
            processed: ProcessedCache::new(cache_max_size),
        })
    }

    /// Basic gate for the auto-reply pipeline. No side effects.
    pub fn should_process(
        &self,
        message: &Message,
        config: &Config,
        toggles: &RuntimeToggles,
    ) -> bool {
        if message.author.bot {
            return false;
        }
        if message.content.trim().is_empty() && message.attachments.is_empty() {
            return false;
        }
        if self.processed.contains(message.id.get()) {
            return false;
        }
        if !config.should_monitor_channel(message.channel_id.get()) {
            return false;
        }
        if !toggles.auto_reply_enabled() {
            return false;
        }
        if message.content.starts_with(&COMMAND_PREFIXES[..]) {
            return false;
        }
        true
    }

    /// First keyword hit for `text`, or `None`.
    ///
    /// Exclusions short-circuit before any keyword is consulted; built-ins
    /// are tried before dynamic patterns and the first match wins.
    pub fn match_keyword(&self, text: &str, toggles: &RuntimeToggles) -> Option<KeywordMatch> {
        if !toggles.keyword_trigger_enabled() || text.is_empty() {
            return None;
        }

        if self.exclusions.iter().any(|re| re.is_match(text)) {
            return None;
        }

        if let Some(hit) = find_first(&self.builtin, text) {
            return Some(hit);
        }

        let dynamic = self.dynamic.read().unwrap().clone();
        find_first(&dynamic, text)
    }

    pub fn matches_keyword(&self, text: &str, toggles: &RuntimeToggles) -> bool {
        self.match_keyword(text, toggles).is_some()
    }

    /// Image heuristic, independent of keyword matching: the message must
    /// carry an image attachment, and either the text asks for help or a
    /// filename looks like an error/config screenshot.
    pub fn should_analyze_image(&self, message: &Message) -> bool {
        let mut images = message
            .attachments
            .iter()
            .filter(|att| {
                att.content_type
                    .as_deref()
                    .is_some_and(|ct| ct.starts_with("image/"))
            })
            .peekable();

        if images.peek().is_none() {
            return false;
        }
        if self.text_wants_help(&message.content) {
            return true;
        }
        images.any(|att| self.filename_suggests_issue(&att.filename))
    }

    pub fn text_wants_help(&self, text: &str) -> bool {
        self.help_intent.iter().any(|re| re.is_match(text))
    }

    pub fn filename_suggests_issue(&self, filename: &str) -> bool {
        self.file_intent.is_match(filename)
    }

    pub fn mark_processed(&self, message_id: u64) {
        self.processed.insert(message_id);
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn processed_capacity(&self) -> usize {
        self.processed.capacity()
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic.read().unwrap().len()
    }

    /// Recompiles the dynamic pattern set and swaps it in atomically.
    ///
    /// A stored pattern that no longer compiles (corrupted externally) is
    /// skipped with a warning rather than failing the whole reload. Returns
    /// the number of patterns now active.
    pub fn reload_patterns(&self, rows: &[KeywordRecord]) -> usize {
        let mut compiled = Vec::with_capacity(rows.len());
        for row in rows {
            match compile(&row.pattern) {
                Ok(regex) => compiled.push(CompiledPattern {
                    pattern: row.pattern.clone(),
                    dynamic: true,
                    regex,
                }),
                Err(e) => warn!("skipping stored keyword pattern {:?}: {}", row.pattern, e),
            }
        }

        let count = compiled.len();
        *self.dynamic.write().unwrap() = Arc::new(compiled);
        info!("keyword patterns reloaded: {} builtin, {} dynamic", self.builtin.len(), count);
        count
    }
}

/// Add-time validation for admin-supplied patterns. Invalid syntax is
/// rejected here and never reaches the store.
pub fn validate_pattern(pattern: &str) -> Result<(), regex::Error> {
    compile(pattern).map(|_| ())
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn find_first(patterns: &[CompiledPattern], text: &str) -> Option<KeywordMatch> {
    patterns.iter().find_map(|p| {
        p.regex.find(text).map(|m| KeywordMatch {
            matched: m.as_str().to_string(),
            pattern: p.pattern.clone(),
            dynamic: p.dynamic,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serenity::model::id::{ChannelId, MessageId};

    fn engine() -> TriggerEngine {
        TriggerEngine::new(16).unwrap()
    }

    fn dynamic_row(pattern: &str) -> KeywordRecord {
        KeywordRecord {
            pattern: pattern.to_string(),
            description: None,
            enabled: true,
            trigger_count: 0,
            created_at: String::new(),
        }
    }

    fn mock_message(id: u64, content: &str) -> Message {
        let mut msg = Message::default();
        msg.id = MessageId::new(id);
        msg.channel_id = ChannelId::new(1);
        msg.content = content.to_string();
        msg
    }

    #[test]
    fn test_builtin_keyword_matches() {
        let engine = engine();
        let config = test_config();
        let toggles = RuntimeToggles::new(&config);

        let hit = engine
            .match_keyword("my SillyTavern setup broke", &toggles)
            .unwrap();
        assert_eq!(hit.matched.to_lowercase(), "sillytavern");
        assert!(!hit.dynamic);

        assert!(engine.matches_keyword("Connection Failed again", &toggles));
        assert!(!engine.matches_keyword("what a nice day", &toggles));
    }

    #[test]
    fn test_matching_is_unicode_aware() {
        let engine = engine();
        let toggles = RuntimeToggles::new(&test_config());

        assert!(engine.matches_keyword("求助，角色卡导入失败", &toggles));
        assert!(engine.matches_keyword("上下文怎么调", &toggles));
    }

    #[test]
    fn test_exclusions_win_over_keywords() {
        let engine = engine();
        let toggles = RuntimeToggles::new(&test_config());

        // Pure greetings and thanks never trigger.
        assert!(!engine.matches_keyword("hello", &toggles));
        assert!(!engine.matches_keyword("  thanks  ", &toggles));

        // Symbol-prefixed text is excluded even though it contains a keyword.
        assert!(!engine.matches_keyword("!sillytavern is broken", &toggles));

        // The same keyword without the prefix does trigger.
        assert!(engine.matches_keyword("sillytavern is broken", &toggles));
    }

    #[test]
    fn test_disabled_toggle_short_circuits() {
        let engine = engine();
        let config = test_config();
        let toggles = RuntimeToggles::new(&config);
        toggles.toggle_keyword_trigger();

        assert!(!engine.matches_keyword("sillytavern", &toggles));
    }

    #[test]
    fn test_builtin_precedence_over_dynamic() {
        let engine = engine();
        let toggles = RuntimeToggles::new(&test_config());

        // A dynamic pattern that shadows a builtin one.
        engine.reload_patterns(&[dynamic_row("sillytavern")]);

        let hit = engine.match_keyword("sillytavern help", &toggles).unwrap();
        assert!(!hit.dynamic, "builtin must win, so no counter increment");

        // Text only a dynamic pattern covers reports dynamic = true.
        engine.reload_patterns(&[dynamic_row(r"stable\s*diffusion")]);
        let hit = engine.match_keyword("stable diffusion crashed", &toggles).unwrap();
        assert!(hit.dynamic);
        assert_eq!(hit.matched, "stable diffusion");
    }

    #[test]
    fn test_reload_skips_malformed_rows() {
        let engine = engine();
        let toggles = RuntimeToggles::new(&test_config());

        let active = engine.reload_patterns(&[
            dynamic_row("("),
            dynamic_row("chatgpt.*error"),
        ]);

        assert_eq!(active, 1);
        assert!(engine.matches_keyword("chatgpt threw an error", &toggles));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_add_time() {
        assert!(validate_pattern("(").is_err());
        assert!(validate_pattern(r"api.*limit").is_ok());
    }

    #[test]
    fn test_should_process_rejects_processed_and_commands() {
        let engine = engine();
        let config = test_config();
        let toggles = RuntimeToggles::new(&config);

        let msg = mock_message(10, "sillytavern broke");
        assert!(engine.should_process(&msg, &config, &toggles));

        // Dedup: once marked, the same id is rejected regardless of content.
        engine.mark_processed(10);
        assert!(!engine.should_process(&msg, &config, &toggles));

        let cmd = mock_message(11, "!help sillytavern");
        assert!(!engine.should_process(&cmd, &config, &toggles));

        let empty = mock_message(12, "   ");
        assert!(!engine.should_process(&empty, &config, &toggles));

        let mut from_bot = mock_message(13, "sillytavern");
        from_bot.author.bot = true;
        assert!(!engine.should_process(&from_bot, &config, &toggles));
    }

    #[test]
    fn test_should_process_honors_allow_list_and_toggle() {
        let engine = engine();
        let mut config = test_config();
        let toggles = RuntimeToggles::new(&config);

        config.monitor_channels = vec![99];
        let msg = mock_message(20, "sillytavern");
        assert!(!engine.should_process(&msg, &config, &toggles));

        config.monitor_channels = vec![1];
        assert!(engine.should_process(&msg, &config, &toggles));

        toggles.toggle_auto_reply();
        assert!(!engine.should_process(&msg, &config, &toggles));
    }

    #[test]
    fn test_image_intent_helpers() {
        let engine = engine();

        assert!(engine.text_wants_help("please help with this"));
        assert!(engine.text_wants_help("这个报错怎么办"));
        assert!(!engine.text_wants_help("just sharing a meme"));

        assert!(engine.filename_suggests_issue("Screenshot_2024.png"));
        assert!(engine.filename_suggests_issue("config-page.jpg"));
        assert!(!engine.filename_suggests_issue("vacation.jpg"));
    }
}
