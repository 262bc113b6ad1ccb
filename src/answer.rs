use crate::db::Database;
use crate::embeds;
use crate::llm::Question;
use crate::pagination::{paginate, PaginationView};
use crate::trigger::KeywordMatch;
use crate::Data;
use serenity::builder::{CreateActionRow, CreateEmbed, CreateMessage, EditMessage};
use serenity::client::Context;
use serenity::http::Http;
use serenity::model::channel::{Attachment, Message};
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Attachments above this size are not downloaded for analysis.
pub const MAX_IMAGE_BYTES: u32 = 20 * 1024 * 1024;
/// How much of the triggering message is kept in the trigger-event record.
const TRIGGER_LOG_CHARS: usize = 500;

/// Entry point for every inbound (or newly-matching edited) message.
///
/// At most one of the two delegations runs: a keyword match wins and takes
/// the combined path when the message also carries an image; the image-only
/// heuristic is consulted only when no keyword fired.
pub async fn handle_message(
    ctx: &Context,
    message: &Message,
    data: &Data,
) -> Result<(), crate::Error> {
    if !data.triggers.should_process(message, &data.config, &data.toggles) {
        return Ok(());
    }

    if let Some(hit) = data.triggers.match_keyword(&message.content, &data.toggles) {
        handle_keyword_trigger(ctx, message, data, hit).await
    } else if data.triggers.should_analyze_image(message) {
        handle_image_trigger(ctx, message, data).await
    } else {
        Ok(())
    }
}

/// Edited messages re-enter the pipeline only when the edit introduced a
/// keyword match; the dedup cache still applies on top.
pub async fn handle_edit(
    ctx: &Context,
    old: Option<&Message>,
    new: &Message,
    data: &Data,
) -> Result<(), crate::Error> {
    let old_matched =
        old.is_some_and(|m| data.triggers.matches_keyword(&m.content, &data.toggles));
    if old_matched || !data.triggers.matches_keyword(&new.content, &data.toggles) {
        return Ok(());
    }
    handle_message(ctx, new, data).await
}

async fn handle_keyword_trigger(
    ctx: &Context,
    message: &Message,
    data: &Data,
    hit: KeywordMatch,
) -> Result<(), crate::Error> {
    data.triggers.mark_processed(message.id.get());
    info!(
        user = %message.author.name,
        channel = %message.channel_id,
        keyword = %hit.matched,
        "keyword trigger"
    );

    record_trigger_event(data, message, &hit);

    // Image + keyword means the screenshot goes along with the question.
    let question = match first_image(message) {
        Some(att) if att.size <= MAX_IMAGE_BYTES => {
            match download_attachment(data, att).await {
                Some(image) => Question::Combined {
                    image,
                    question: message.content.clone(),
                },
                None => Question::Text {
                    question: message.content.clone(),
                },
            }
        }
        _ => Question::Text {
            question: message.content.clone(),
        },
    };

    deliver(ctx, message, data, question).await
}

async fn handle_image_trigger(
    ctx: &Context,
    message: &Message,
    data: &Data,
) -> Result<(), crate::Error> {
    data.triggers.mark_processed(message.id.get());
    info!(
        user = %message.author.name,
        channel = %message.channel_id,
        "image analysis trigger"
    );

    let Some(att) = first_image(message) else {
        return Ok(());
    };

    if att.size > MAX_IMAGE_BYTES {
        let embed = embeds::error_embed(
            "That image is too large to analyze, please keep it under 20 MB.",
            "Image too large",
            &message.author.name,
        );
        if let Ok(sent) = reply_embed(ctx, message, embed).await {
            schedule_auto_delete(
                ctx.http.clone(),
                sent.channel_id,
                sent.id,
                Duration::from_secs(data.config.auto_delete_secs),
            );
        }
        return Ok(());
    }

    let Some(image) = download_attachment(data, att).await else {
        warn!("attachment download failed, skipping image analysis");
        return Ok(());
    };

    let question = Question::Image {
        image,
        question: message.content.clone(),
    };
    deliver(ctx, message, data, question).await
}

/// Placeholder → final-answer protocol for trigger-originated requests.
///
/// A "thinking" reply goes out first and is edited in place once the answer
/// (or the unavailability notice) is ready. If the placeholder vanished in
/// the meantime the final content is sent as a fresh reply instead, so
/// exactly one final message exists either way. Every final message is
/// scheduled for auto-deletion.
async fn deliver(
    ctx: &Context,
    message: &Message,
    data: &Data,
    question: Question,
) -> Result<(), crate::Error> {
    let user_name = message.author.name.clone();
    let display_question = display_question(&question);
    let started = Instant::now();

    let placeholder = match reply_embed(ctx, message, embeds::thinking_embed(&user_name)).await {
        Ok(sent) => Some(sent),
        Err(e) => {
            warn!("could not send placeholder message: {e}");
            None
        }
    };

    let answer = match data.ai.answer(&question).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!("AI backend unavailable: {e}");
            let embed = embeds::service_unavailable_embed(&user_name);
            if let Some(sent) = finalize(ctx, message, placeholder, embed, Vec::new()).await {
                schedule_auto_delete(
                    ctx.http.clone(),
                    sent.channel_id,
                    sent.id,
                    Duration::from_secs(data.config.auto_delete_secs),
                );
            }
            return Ok(());
        }
    };
    let response_time = started.elapsed().as_secs_f64();

    record_qa(data, message, &question, &answer, response_time);

    let pages = paginate(&answer, data.config.page_size);
    let auto_delete = Duration::from_secs(data.config.auto_delete_secs);

    if pages.len() == 1 {
        let embed = embeds::answer_embed(
            &display_question,
            &pages[0],
            &user_name,
            None,
            Some(response_time),
            question.has_image(),
        );
        if let Some(sent) = finalize(ctx, message, placeholder, embed, Vec::new()).await {
            schedule_auto_delete(ctx.http.clone(), sent.channel_id, sent.id, auto_delete);
        }
        return Ok(());
    }

    let view = PaginationView::new(
        pages,
        display_question,
        user_name,
        Some(response_time),
        question.has_image(),
    );
    let embed = view.embed();
    let components = view.components(false);

    if let Some(sent) = finalize(ctx, message, placeholder, embed, components).await {
        schedule_auto_delete(ctx.http.clone(), sent.channel_id, sent.id, auto_delete);

        let view_ctx = ctx.clone();
        let owner = message.author.id;
        let timeout = Duration::from_secs(data.config.pagination_timeout_secs);
        tokio::spawn(async move {
            view.run(view_ctx, sent, owner, timeout).await;
        });
    }

    Ok(())
}

/// Edits the placeholder into the final content, falling back to a fresh
/// reply when the edit target is gone or rejected.
async fn finalize(
    ctx: &Context,
    trigger: &Message,
    placeholder: Option<Message>,
    embed: CreateEmbed,
    components: Vec<CreateActionRow>,
) -> Option<Message> {
    if let Some(mut ph) = placeholder {
        let edit = EditMessage::new()
            .embed(embed.clone())
            .components(components.clone());
        match ph.edit(&ctx.http, edit).await {
            Ok(()) => return Some(ph),
            Err(e) => warn!("placeholder edit failed, sending a fresh reply: {e}"),
        }
    }

    let builder = CreateMessage::new()
        .embed(embed)
        .components(components)
        .reference_message(trigger);
    match trigger.channel_id.send_message(&ctx.http, builder).await {
        Ok(sent) => Some(sent),
        Err(e) => {
            warn!("could not deliver answer to channel {}: {e}", trigger.channel_id);
            None
        }
    }
}

/// Best-effort delayed delete for publicly-visible answers. Detached on
/// purpose: if the message was removed by hand in the meantime the attempt
/// just no-ops.
pub fn schedule_auto_delete(
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = channel_id.delete_message(&http, message_id).await {
            debug!("auto-delete of message {message_id} skipped: {e}");
        }
    });
}

/// Records the trigger event and bumps the dynamic pattern counter without
/// holding up the answer; failures are logged and swallowed.
fn record_trigger_event(data: &Data, message: &Message, hit: &KeywordMatch) {
    let user_id = message.author.id.to_string();
    let channel_id = message.channel_id.to_string();
    let keyword = hit.matched.clone();
    let content = embeds::truncate(&message.content, TRIGGER_LOG_CHARS);
    spawn_db_write(&data.db, "trigger event", move |db| {
        db.record_keyword_trigger(&user_id, &channel_id, &keyword, &content)
    });

    if hit.dynamic {
        let pattern = hit.pattern.clone();
        spawn_db_write(&data.db, "trigger counter", move |db| {
            db.increment_keyword_trigger(&pattern)
        });
    }
}

fn record_qa(data: &Data, message: &Message, question: &Question, answer: &str, response_time: f64) {
    let user_id = message.author.id.to_string();
    let user_name = message.author.name.clone();
    let channel_id = message.channel_id.to_string();
    let guild_id = message.guild_id.map(|id| id.to_string());
    let question_text = display_question(question);
    let answer = answer.to_string();
    let has_image = question.has_image();
    spawn_db_write(&data.db, "QA record", move |db| {
        db.record_qa(
            &user_id,
            &user_name,
            &channel_id,
            guild_id.as_deref(),
            &question_text,
            &answer,
            has_image,
            Some(response_time),
        )
        .map(|_| ())
    });
}

pub(crate) fn spawn_db_write<F>(db: &Database, what: &'static str, f: F)
where
    F: FnOnce(&Database) -> anyhow::Result<()> + Send + 'static,
{
    let db = db.clone();
    tokio::spawn(async move {
        if let Err(e) = db.run_blocking(f).await {
            warn!("best-effort {what} write failed: {e}");
        }
    });
}

fn first_image(message: &Message) -> Option<&Attachment> {
    message.attachments.iter().find(|att| {
        att.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    })
}

pub(crate) async fn download_attachment(data: &Data, att: &Attachment) -> Option<Vec<u8>> {
    match data.http_client.get(&att.url).send().await {
        Ok(response) => match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!("attachment body read failed for {}: {e}", att.filename);
                None
            }
        },
        Err(e) => {
            warn!("attachment request failed for {}: {e}", att.filename);
            None
        }
    }
}

async fn reply_embed(
    ctx: &Context,
    message: &Message,
    embed: CreateEmbed,
) -> anyhow::Result<Message> {
    let sent = message
        .channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new().embed(embed).reference_message(message),
        )
        .await?;
    Ok(sent)
}

/// What to show in the question field of the answer embed.
fn display_question(question: &Question) -> String {
    let text = question.question_text().trim();
    match question {
        Question::Image { .. } if text.is_empty() => "(screenshot analysis)".to_string(),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_question_falls_back_for_bare_screenshots() {
        let image_only = Question::Image {
            image: vec![1, 2, 3],
            question: "  ".to_string(),
        };
        assert_eq!(display_question(&image_only), "(screenshot analysis)");

        let with_text = Question::Image {
            image: vec![1],
            question: "what is this error".to_string(),
        };
        assert_eq!(display_question(&with_text), "what is this error");

        let text = Question::Text {
            question: " trailing spaces ".to_string(),
        };
        assert_eq!(display_question(&text), "trailing spaces");
    }

    #[test]
    fn test_question_variants_report_images() {
        assert!(!Question::Text { question: "q".into() }.has_image());
        assert!(Question::Image { image: vec![], question: "q".into() }.has_image());
        assert!(Question::Combined { image: vec![], question: "q".into() }.has_image());
    }
}
