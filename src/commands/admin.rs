use crate::embeds;
use crate::{Context, Error};
use poise::serenity_prelude::{ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage};
use std::time::Duration;
use tracing::{info, warn};

/// Show QA system statistics
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let stats = ctx.data().db.run_blocking(|db| db.get_system_stats()).await?;

    let uptime = Duration::from_secs(ctx.data().started_at.elapsed().as_secs());
    let cache_state = format!(
        "{}/{}",
        ctx.data().triggers.processed_len(),
        ctx.data().triggers.processed_capacity()
    );

    let embed = CreateEmbed::new()
        .title("📊 QA system statistics")
        .color(embeds::COLOR_INFO)
        .field("Total questions", stats.total_questions.to_string(), true)
        .field("Today", stats.today_questions.to_string(), true)
        .field("Active users", stats.total_users.to_string(), true)
        .field("Image analyses", stats.total_images.to_string(), true)
        .field(
            "Avg response time",
            format!("{:.2}s", stats.avg_response_time),
            true,
        )
        .field("Dedup cache", cache_state, true)
        .field(
            "Dynamic patterns",
            ctx.data().triggers.dynamic_len().to_string(),
            true,
        )
        .field(
            "Auto reply",
            on_off(ctx.data().toggles.auto_reply_enabled()),
            true,
        )
        .field(
            "Keyword trigger",
            on_off(ctx.data().toggles.keyword_trigger_enabled()),
            true,
        )
        .footer(CreateEmbedFooter::new(format!(
            "Uptime: {}",
            humantime::format_duration(uptime)
        )));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Turn the automatic replies on or off
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn toggle_auto_reply(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx.data().toggles.toggle_auto_reply();
    info!(user = %ctx.author().name, enabled, "auto-reply toggled");

    let embed = embeds::success_embed(
        &format!("Automatic replies are now {}.", on_off(enabled)),
        &ctx.author().name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Turn keyword triggering on or off
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn toggle_keyword_trigger(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx.data().toggles.toggle_keyword_trigger();
    info!(user = %ctx.author().name, enabled, "keyword trigger toggled");

    let embed = embeds::success_embed(
        &format!("Keyword triggering is now {}.", on_off(enabled)),
        &ctx.author().name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the most recent questions
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn recent(
    ctx: Context<'_>,
    #[description = "How many to show"]
    #[min = 1]
    #[max = 20]
    limit: Option<u32>,
) -> Result<(), Error> {
    let limit = limit.unwrap_or(10) as usize;
    let records = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_recent_questions(limit, 24))
        .await?;

    let mut embed = CreateEmbed::new()
        .title("🕑 Recent questions (24h)")
        .color(embeds::COLOR_INFO);
    if records.is_empty() {
        embed = embed.description("No questions in the last 24 hours.");
    }
    for record in &records {
        let marker = if record.has_image { " 📸" } else { "" };
        embed = embed.field(
            format!("{}{} • {}", record.user_name, marker, short_time(&record.created_at)),
            embeds::truncate(&record.question, 200),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Show the most recent logged errors
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn errors(
    ctx: Context<'_>,
    #[description = "How many to show"]
    #[min = 1]
    #[max = 20]
    limit: Option<u32>,
) -> Result<(), Error> {
    let limit = limit.unwrap_or(10) as usize;
    let records = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_recent_errors(limit))
        .await?;

    let mut embed = CreateEmbed::new()
        .title("🚨 Recent errors")
        .color(embeds::COLOR_ERROR);
    if records.is_empty() {
        embed = embed.description("No errors logged. 🎉");
    }
    for record in &records {
        let context = match (&record.user_id, &record.channel_id) {
            (Some(user), Some(channel)) => format!(" (user {user}, channel {channel})"),
            (Some(user), None) => format!(" (user {user})"),
            _ => String::new(),
        };
        embed = embed.field(
            format!("{} • {}", record.error_type, short_time(&record.created_at)),
            embeds::truncate(&format!("{}{}", record.error_message, context), 200),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Delete QA records, trigger events and error logs older than N days
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn cleanup(
    ctx: Context<'_>,
    #[description = "Age threshold in days"]
    #[min = 1]
    #[max = 365]
    days: Option<u32>,
) -> Result<(), Error> {
    let days = days.unwrap_or(30) as u64;
    let (qa, triggers, errors) = ctx
        .data()
        .db
        .run_blocking(move |db| db.cleanup_old_records(days))
        .await?;

    let embed = embeds::success_embed(
        &format!(
            "Removed {qa} QA records, {triggers} trigger events and {errors} error logs older than {days} days."
        ),
        &ctx.author().name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Broadcast an announcement to every monitored channel
#[poise::command(slash_command, check = "crate::commands::admin_check")]
pub async fn broadcast(
    ctx: Context<'_>,
    #[description = "Announcement text"] message: String,
) -> Result<(), Error> {
    let channels = ctx.data().config.monitor_channels.clone();
    if channels.is_empty() {
        let embed = embeds::error_embed(
            "No monitored channels are configured, nothing to broadcast to.",
            "Nothing to do",
            &ctx.author().name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;

    let announcement = CreateEmbed::new()
        .title("📢 Announcement")
        .description(message.clone())
        .color(embeds::COLOR_INFO)
        .footer(CreateEmbedFooter::new(format!(
            "Sent by {}",
            ctx.author().name
        )));

    let mut delivered = 0usize;
    for channel in &channels {
        let result = ChannelId::new(*channel)
            .send_message(
                ctx.serenity_context(),
                CreateMessage::new().embed(announcement.clone()),
            )
            .await;
        match result {
            Ok(_) => delivered += 1,
            Err(e) => warn!("broadcast to channel {channel} failed: {e}"),
        }
    }

    let sender_id = ctx.author().id.to_string();
    let recorded_message = message.clone();
    crate::answer::spawn_db_write(&ctx.data().db, "notification record", move |db| {
        db.record_notification(&sender_id, &recorded_message, delivered)
    });

    let embed = embeds::success_embed(
        &format!("Announcement delivered to {delivered}/{} channels.", channels.len()),
        &ctx.author().name,
    );
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Shut down the bot (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from owner: {}", ctx.author().name);
    ctx.say("👋 Shutting down...").await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn short_time(ts: &str) -> String {
    crate::db::parse_sqlite_utc(ts)
        .map(|dt| dt.format("%b %d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
