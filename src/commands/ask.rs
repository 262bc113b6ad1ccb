use crate::answer::{download_attachment, spawn_db_write, MAX_IMAGE_BYTES};
use crate::embeds;
use crate::llm::Question;
use crate::pagination::{paginate, PaginationView};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::{Duration, Instant};
use tracing::warn;

/// Ask the SillyTavern assistant a question
#[poise::command(slash_command)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    run_question(ctx, Question::Text { question }).await
}

/// Analyze an error screenshot or configuration image
#[poise::command(slash_command)]
pub async fn diagnose(
    ctx: Context<'_>,
    #[description = "Screenshot or configuration image"] image: serenity::Attachment,
    #[description = "What's going wrong (optional)"] description: Option<String>,
) -> Result<(), Error> {
    let user_name = ctx.author().name.clone();

    let is_image = image
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        let embed = embeds::error_embed(
            "Please upload a valid image file. Supported formats: PNG, JPG, JPEG, GIF.",
            "Unsupported file",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }
    if image.size > MAX_IMAGE_BYTES {
        let embed = embeds::error_embed(
            "That image is too large to analyze, please keep it under 20 MB.",
            "Image too large",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    ctx.defer().await?;

    let Some(bytes) = download_attachment(ctx.data(), &image).await else {
        let embed = embeds::error_embed(
            "Couldn't download that attachment, please try again.",
            "Download failed",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    };

    run_question(
        ctx,
        Question::Image {
            image: bytes,
            question: description.unwrap_or_default(),
        },
    )
    .await
}

/// Show what the SillyTavern assistant can do
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .embed(embeds::help_embed())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Shared slash-command answer path: the deferred response is edited into
/// the final content and is never auto-deleted.
async fn run_question(ctx: Context<'_>, question: Question) -> Result<(), Error> {
    let user_name = ctx.author().name.clone();
    let started = Instant::now();

    let answer = match ctx.data().ai.answer(&question).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!("AI backend unavailable for /{}: {e}", ctx.command().name);
            let embed = embeds::service_unavailable_embed(&user_name);
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
            return Ok(());
        }
    };
    let response_time = started.elapsed().as_secs_f64();

    let display_question = match &question {
        Question::Image { question, .. } if question.trim().is_empty() => {
            "(screenshot analysis)".to_string()
        }
        _ => question.question_text().to_string(),
    };
    record_slash_qa(&ctx, &question, &display_question, &answer, response_time);

    let pages = paginate(&answer, ctx.data().config.page_size);
    if pages.len() == 1 {
        let embed = embeds::answer_embed(
            &display_question,
            &pages[0],
            &user_name,
            None,
            Some(response_time),
            question.has_image(),
        );
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let view = PaginationView::new(
        pages,
        display_question,
        user_name,
        Some(response_time),
        question.has_image(),
    );
    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(view.embed())
                .components(view.components(false)),
        )
        .await?;
    let message = reply.into_message().await?;

    let view_ctx = ctx.serenity_context().clone();
    let owner = ctx.author().id;
    let timeout = Duration::from_secs(ctx.data().config.pagination_timeout_secs);
    tokio::spawn(async move {
        view.run(view_ctx, message, owner, timeout).await;
    });

    Ok(())
}

fn record_slash_qa(
    ctx: &Context<'_>,
    question: &Question,
    display_question: &str,
    answer: &str,
    response_time: f64,
) {
    let user_id = ctx.author().id.to_string();
    let user_name = ctx.author().name.clone();
    let channel_id = ctx.channel_id().to_string();
    let guild_id = ctx.guild_id().map(|id| id.to_string());
    let question_text = display_question.to_string();
    let answer = answer.to_string();
    let has_image = question.has_image();
    spawn_db_write(&ctx.data().db, "QA record", move |db| {
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
