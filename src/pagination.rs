use crate::embeds;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditMessage,
};
use serenity::client::Context;
use serenity::model::application::ButtonStyle;
use serenity::model::channel::Message;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::debug;

const ELLIPSIS: &str = "...";
/// Headroom reserved for the ellipsis markers when a paragraph is hard-split.
const HARD_SPLIT_MARGIN: usize = 10;

/// Splits an answer into pages of at most `page_size` characters.
///
/// Answers that fit are returned as a single page, unchanged. Longer answers
/// are packed greedily paragraph by paragraph (blank-line boundaries); a
/// paragraph that alone exceeds the budget is hard-split with `...` markers
/// on each cut. Pure and deterministic.
pub fn paginate(answer: &str, page_size: usize) -> Vec<String> {
    if answer.chars().count() <= page_size {
        return vec![answer.to_string()];
    }

    let mut pages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in answer.split("\n\n") {
        let para_len = paragraph.chars().count();

        if para_len > page_size {
            if !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pages.extend(hard_split(paragraph, page_size));
            continue;
        }

        let sep_len = if current.is_empty() { 0 } else { 2 };
        if current_len + sep_len + para_len > page_size {
            pages.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += para_len;
    }

    if !current.is_empty() {
        pages.push(current);
    }
    if pages.is_empty() {
        pages.push(String::new());
    }
    pages
}

/// Cuts an oversized paragraph into pieces of at most `page_size` chars,
/// with a trailing marker on each truncated end and a leading marker on
/// each continuation.
fn hard_split(paragraph: &str, page_size: usize) -> Vec<String> {
    let cut = page_size.saturating_sub(HARD_SPLIT_MARGIN).max(1);
    let mut pieces = Vec::new();
    let mut remaining = paragraph;
    let mut first = true;

    loop {
        let prefix = if first { "" } else { ELLIPSIS };
        if prefix.chars().count() + remaining.chars().count() <= page_size {
            pieces.push(format!("{prefix}{remaining}"));
            return pieces;
        }

        let cut_at = remaining
            .char_indices()
            .nth(cut)
            .map(|(idx, _)| idx)
            .unwrap_or(remaining.len());
        let (head, tail) = remaining.split_at(cut_at);
        pieces.push(format!("{prefix}{head}{ELLIPSIS}"));
        remaining = tail;
        first = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    First,
    Prev,
    Next,
    Last,
}

impl NavAction {
    fn from_custom_id(id: &str) -> Option<Self> {
        match id {
            "qa_first" => Some(Self::First),
            "qa_prev" => Some(Self::Prev),
            "qa_next" => Some(Self::Next),
            "qa_last" => Some(Self::Last),
            _ => None,
        }
    }
}

/// A navigable multi-page answer bound to one message.
///
/// Navigation is restricted to the requesting user; the cursor clamps to the
/// valid page range and the edge buttons render disabled at the edges.
pub struct PaginationView {
    pages: Vec<String>,
    question: String,
    user_name: String,
    response_time: Option<f64>,
    image_analyzed: bool,
    cursor: usize,
}

impl PaginationView {
    pub fn new(
        pages: Vec<String>,
        question: impl Into<String>,
        user_name: impl Into<String>,
        response_time: Option<f64>,
        image_analyzed: bool,
    ) -> Self {
        debug_assert!(!pages.is_empty());
        Self {
            pages,
            question: question.into(),
            user_name: user_name.into(),
            response_time,
            image_analyzed,
            cursor: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_page(&self) -> &str {
        &self.pages[self.cursor]
    }

    /// `(at_first, at_last)` — which edge buttons must render disabled.
    pub fn edge_state(&self) -> (bool, bool) {
        (self.cursor == 0, self.cursor + 1 == self.page_count())
    }

    pub fn apply(&mut self, action: NavAction) {
        self.cursor = match action {
            NavAction::First => 0,
            NavAction::Prev => self.cursor.saturating_sub(1),
            NavAction::Next => (self.cursor + 1).min(self.page_count() - 1),
            NavAction::Last => self.page_count() - 1,
        };
    }

    pub fn embed(&self) -> CreateEmbed {
        let page_pos = if self.page_count() > 1 {
            Some((self.cursor + 1, self.page_count()))
        } else {
            None
        };
        embeds::answer_embed(
            &self.question,
            self.current_page(),
            &self.user_name,
            page_pos,
            self.response_time,
            self.image_analyzed,
        )
    }

    /// Button row for the current cursor. Empty when there is nothing to
    /// navigate; `all_disabled` renders the frozen post-timeout state.
    pub fn components(&self, all_disabled: bool) -> Vec<CreateActionRow> {
        if self.page_count() <= 1 {
            return Vec::new();
        }

        let (at_first, at_last) = self.edge_state();
        let row = CreateActionRow::Buttons(vec![
            CreateButton::new("qa_first")
                .label("⏪")
                .style(ButtonStyle::Secondary)
                .disabled(all_disabled || at_first),
            CreateButton::new("qa_prev")
                .label("◀️")
                .style(ButtonStyle::Primary)
                .disabled(all_disabled || at_first),
            CreateButton::new("qa_delete")
                .label("🗑️")
                .style(ButtonStyle::Danger)
                .disabled(all_disabled),
            CreateButton::new("qa_next")
                .label("▶️")
                .style(ButtonStyle::Primary)
                .disabled(all_disabled || at_last),
            CreateButton::new("qa_last")
                .label("⏩")
                .style(ButtonStyle::Secondary)
                .disabled(all_disabled || at_last),
        ]);
        vec![row]
    }

    /// Drives the button interactions until the view expires.
    ///
    /// Each wait uses the full inactivity window, so any click pushes the
    /// expiry out. On expiry the buttons are disabled in place and the last
    /// displayed page stays visible; the message itself is not deleted here.
    pub async fn run(
        mut self,
        ctx: Context,
        mut message: Message,
        owner: UserId,
        timeout: Duration,
    ) {
        if self.page_count() <= 1 {
            return;
        }

        loop {
            let Some(interaction) = message
                .await_component_interaction(&ctx)
                .timeout(timeout)
                .await
            else {
                // Expired: freeze the controls, keep the page on screen.
                let _ = message
                    .edit(&ctx.http, EditMessage::new().components(self.components(true)))
                    .await;
                return;
            };

            // Only the user who asked may navigate or delete.
            if interaction.user.id != owner {
                let _ = interaction
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::Message(
                            CreateInteractionResponseMessage::new()
                                .content(format!("Only <@{owner}> can control this answer."))
                                .ephemeral(true),
                        ),
                    )
                    .await;
                continue;
            }

            let custom_id = interaction.data.custom_id.as_str();
            if custom_id == "qa_delete" {
                let _ = interaction
                    .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                    .await;
                if let Err(e) = message.delete(&ctx.http).await {
                    debug!("pagination delete skipped: {e}");
                }
                return;
            }

            let Some(action) = NavAction::from_custom_id(custom_id) else {
                continue;
            };
            self.apply(action);

            let _ = interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(self.embed())
                            .components(self.components(false)),
                    ),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_markers(page: &str) -> &str {
        page.trim_start_matches(ELLIPSIS).trim_end_matches(ELLIPSIS)
    }

    #[test]
    fn test_short_answer_is_a_single_unchanged_page() {
        let answer = "short answer\n\nwith two paragraphs";
        assert_eq!(paginate(answer, 1000), vec![answer.to_string()]);
    }

    #[test]
    fn test_exact_fit_is_not_split() {
        let answer = "a".repeat(1000);
        assert_eq!(paginate(&answer, 1000), vec![answer.clone()]);
    }

    #[test]
    fn test_paragraphs_pack_greedily() {
        // Three 800-char paragraphs: no two fit a page together.
        let paras = [
            "a".repeat(800),
            "b".repeat(800),
            "c".repeat(800),
        ];
        let answer = paras.join("\n\n");

        let pages = paginate(&answer, 1000);
        assert_eq!(pages.len(), 3);
        for page in &pages {
            assert!(page.chars().count() <= 1000);
        }
        assert_eq!(pages, paras.to_vec());
    }

    #[test]
    fn test_small_paragraphs_share_a_page() {
        let paras = ["a".repeat(400), "b".repeat(400), "c".repeat(400)];
        let answer = paras.join("\n\n");

        let pages = paginate(&answer, 1000);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], format!("{}\n\n{}", paras[0], paras[1]));
        assert_eq!(pages[1], paras[2]);
    }

    #[test]
    fn test_oversized_paragraph_hard_splits_with_markers() {
        let answer = "x".repeat(2500);
        let pages = paginate(&answer, 1000);

        assert!(pages.len() >= 3);
        for page in &pages {
            assert!(page.chars().count() <= 1000, "page too long: {}", page.len());
        }
        assert!(pages[0].ends_with(ELLIPSIS));
        assert!(!pages[0].starts_with(ELLIPSIS));
        for page in &pages[1..pages.len() - 1] {
            assert!(page.starts_with(ELLIPSIS) && page.ends_with(ELLIPSIS));
        }
        assert!(pages[pages.len() - 1].starts_with(ELLIPSIS));

        let rebuilt: String = pages.iter().map(|p| strip_markers(p)).collect();
        assert_eq!(rebuilt, answer);
    }

    #[test]
    fn test_round_trip_preserves_paragraph_order() {
        let paras = ["intro ".repeat(50), "middle ".repeat(200), "end ".repeat(30)];
        let answer = paras.join("\n\n");

        let pages = paginate(&answer, 1000);
        let rebuilt: String = pages
            .iter()
            .map(|p| strip_markers(p))
            .collect::<Vec<_>>()
            .join("");
        // Page boundaries drop the blank lines; the paragraph text itself
        // must come back intact and ordered.
        let flattened = answer.replace("\n\n", "");
        assert_eq!(rebuilt.replace("\n\n", ""), flattened);
    }

    #[test]
    fn test_paginate_is_deterministic() {
        let answer = format!("{}\n\n{}", "alpha ".repeat(300), "beta ".repeat(300));
        assert_eq!(paginate(&answer, 1000), paginate(&answer, 1000));
    }

    #[test]
    fn test_unicode_answers_split_on_char_counts() {
        let answer = "问".repeat(1500);
        let pages = paginate(&answer, 1000);
        for page in &pages {
            assert!(page.chars().count() <= 1000);
        }
        let rebuilt: String = pages.iter().map(|p| strip_markers(p)).collect();
        assert_eq!(rebuilt, answer);
    }

    fn view_with_pages(n: usize) -> PaginationView {
        let pages = (0..n).map(|i| format!("page {i}")).collect();
        PaginationView::new(pages, "q", "tester", None, false)
    }

    #[test]
    fn test_navigation_clamps_at_the_edges() {
        let mut view = view_with_pages(3);
        assert_eq!(view.cursor(), 0);

        view.apply(NavAction::Next);
        view.apply(NavAction::Next);
        view.apply(NavAction::Next);
        assert_eq!(view.cursor(), 2, "cursor must clamp at the last page");
        assert_eq!(view.edge_state(), (false, true));

        view.apply(NavAction::Prev);
        assert_eq!(view.cursor(), 1);

        view.apply(NavAction::First);
        assert_eq!(view.cursor(), 0);
        view.apply(NavAction::Prev);
        assert_eq!(view.cursor(), 0, "cursor must clamp at the first page");
        assert_eq!(view.edge_state(), (true, false));

        view.apply(NavAction::Last);
        assert_eq!(view.cursor(), 2);
        assert_eq!(view.current_page(), "page 2");
    }

    #[test]
    fn test_single_page_has_no_controls() {
        let view = view_with_pages(1);
        assert!(view.components(false).is_empty());
    }

    #[test]
    fn test_multi_page_has_one_button_row() {
        let view = view_with_pages(2);
        assert_eq!(view.components(false).len(), 1);
    }
}
