use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use serenity::model::Timestamp;

pub const COLOR_SUCCESS: u32 = 0x00ff00;
pub const COLOR_ERROR: u32 = 0xff0000;
pub const COLOR_INFO: u32 = 0x0099ff;
pub const COLOR_SOLUTION: u32 = 0x32cd32;

const BOT_FOOTER: &str = "SillyTavern QA Bot";

/// Provisional "working on it" embed, edited in place once the answer lands.
pub fn thinking_embed(user_name: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("🤔 Thinking...")
        .description(format!("Working on an answer for **{user_name}**, one moment..."))
        .color(COLOR_INFO)
}

/// One page of an AI answer. `page_pos` is `(current, total)`, 1-based, and
/// only shown when the answer spans more than one page.
pub fn answer_embed(
    question: &str,
    page: &str,
    user_name: &str,
    page_pos: Option<(usize, usize)>,
    response_time: Option<f64>,
    image_analyzed: bool,
) -> CreateEmbed {
    let mut answer_title = "💡 Answer".to_string();
    if let Some((current, total)) = page_pos {
        answer_title.push_str(&format!(" (page {current}/{total})"));
    }

    let mut footer = BOT_FOOTER.to_string();
    if let Some(secs) = response_time {
        footer.push_str(&format!(" • {secs:.2}s"));
    }
    if image_analyzed {
        footer.push_str(" • image analyzed");
    }
    if let Some((current, total)) = page_pos {
        footer.push_str(&format!(" • page {current}/{total}"));
    }

    CreateEmbed::new()
        .title("💡 SillyTavern Assistant")
        .description(format!("Answer for **{user_name}**"))
        .color(COLOR_SOLUTION)
        .timestamp(Timestamp::now())
        .field(
            "❓ Question",
            format!("```\n{}\n```", truncate(question, 500)),
            false,
        )
        .field(answer_title, page.to_string(), false)
        .footer(CreateEmbedFooter::new(footer))
}

pub fn error_embed(message: &str, title: &str, user_name: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("❌ {title}"))
        .description(message.to_string())
        .color(COLOR_ERROR)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("Requested by {user_name}")))
}

pub fn success_embed(message: &str, user_name: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("✅ Done")
        .description(message.to_string())
        .color(COLOR_SUCCESS)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("Requested by {user_name}")))
}

pub fn service_unavailable_embed(user_name: &str) -> CreateEmbed {
    error_embed(
        "The AI service is currently unavailable, please try again later.",
        "Service unavailable",
        user_name,
    )
}

pub fn help_embed() -> CreateEmbed {
    CreateEmbed::new()
        .title("ℹ️ SillyTavern QA Bot")
        .description("An assistant for SillyTavern technical support.")
        .color(COLOR_INFO)
        .field(
            "Slash commands",
            "• `/ask <question>` — ask a SillyTavern question\n\
             • `/diagnose <image> [description]` — analyze an error screenshot\n\
             • `/help` — this message",
            false,
        )
        .field(
            "Automatic replies",
            "Messages mentioning SillyTavern topics (API errors, character \
             cards, connection failures, ...) are answered automatically. \
             Error screenshots posted with a question are analyzed too.",
            false,
        )
        .field(
            "Covered topics",
            "API connections (OpenAI, Claude, Gemini and compatibles), \
             character card imports, chat completion settings, extensions, \
             performance tuning and general troubleshooting.",
            false,
        )
        .footer(CreateEmbedFooter::new(
            "Tip: answers to auto-replies disappear after a while, use /ask to keep one around",
        ))
}

/// Truncates on a char boundary, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly-10", 10), "exactly-10");
    }

    #[test]
    fn test_truncate_marks_the_cut() {
        let out = truncate("a".repeat(20).as_str(), 10);
        assert_eq!(out, format!("{}...", "a".repeat(7)));
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let out = truncate("角色卡导入失败了怎么办", 6);
        assert_eq!(out, "角色卡...");
    }
}
