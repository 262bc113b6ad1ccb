use crate::embeds;
use crate::trigger::validate_pattern;
use crate::{Context, Error};
use tracing::info;

/// Manage the dynamic trigger keywords
#[poise::command(
    slash_command,
    subcommands("add", "remove", "toggle", "list", "reload"),
    check = "crate::commands::admin_check",
    guild_only
)]
pub async fn keyword(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a regex trigger pattern
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Regex pattern (matched case-insensitively)"] pattern: String,
    #[description = "What this pattern is for"] description: Option<String>,
) -> Result<(), Error> {
    let user_name = ctx.author().name.clone();

    // Bad syntax never reaches the store.
    if let Err(e) = validate_pattern(&pattern) {
        let embed = embeds::error_embed(
            &format!("That pattern is not a valid regex:\n```\n{e}\n```"),
            "Invalid pattern",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    let created_by = ctx.author().id.to_string();
    let db_pattern = pattern.clone();
    let db_description = description.clone();
    let added = ctx
        .data()
        .db
        .run_blocking(move |db| {
            db.add_regex_keyword(&db_pattern, db_description.as_deref(), &created_by)
        })
        .await?;

    if !added {
        let embed = embeds::error_embed(
            &format!("`{pattern}` is already registered."),
            "Duplicate pattern",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    let active = resync_patterns(&ctx).await?;
    info!(user = %user_name, pattern = %pattern, "keyword added");

    let embed = embeds::success_embed(
        &format!("Added trigger pattern `{pattern}` ({active} dynamic patterns active)."),
        &user_name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Remove a regex trigger pattern
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Pattern to remove"] pattern: String,
) -> Result<(), Error> {
    let user_name = ctx.author().name.clone();

    let db_pattern = pattern.clone();
    let removed = ctx
        .data()
        .db
        .run_blocking(move |db| db.remove_regex_keyword(&db_pattern))
        .await?;

    if !removed {
        let embed = embeds::error_embed(
            &format!("No trigger pattern `{pattern}` is registered."),
            "Unknown pattern",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    }

    let active = resync_patterns(&ctx).await?;
    info!(user = %user_name, pattern = %pattern, "keyword removed");

    let embed = embeds::success_embed(
        &format!("Removed trigger pattern `{pattern}` ({active} dynamic patterns active)."),
        &user_name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Enable or disable a regex trigger pattern
#[poise::command(slash_command)]
pub async fn toggle(
    ctx: Context<'_>,
    #[description = "Pattern to toggle"] pattern: String,
) -> Result<(), Error> {
    let user_name = ctx.author().name.clone();

    let db_pattern = pattern.clone();
    let new_state = ctx
        .data()
        .db
        .run_blocking(move |db| db.toggle_regex_keyword(&db_pattern))
        .await?;

    let Some(enabled) = new_state else {
        let embed = embeds::error_embed(
            &format!("No trigger pattern `{pattern}` is registered."),
            "Unknown pattern",
            &user_name,
        );
        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        return Ok(());
    };

    resync_patterns(&ctx).await?;
    let state = if enabled { "enabled" } else { "disabled" };
    let embed = embeds::success_embed(&format!("Pattern `{pattern}` is now {state}."), &user_name);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List all trigger patterns
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let rows = ctx
        .data()
        .db
        .run_blocking(|db| db.list_regex_keywords(false))
        .await?;

    let mut lines: Vec<String> = Vec::new();
    for row in &rows {
        let state = if row.enabled { "✅" } else { "❌" };
        let description = row.description.as_deref().unwrap_or("no description");
        lines.push(format!(
            "{state} `{}` — {} (hits: {})",
            row.pattern, description, row.trigger_count
        ));
    }
    let body = if lines.is_empty() {
        "No dynamic patterns registered yet. Add one with `/keyword add`.".to_string()
    } else {
        embeds::truncate(&lines.join("\n"), 3800)
    };

    let embed = pattern_list_embed(body, rows.len(), ctx.data().triggers.dynamic_len());
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Reload the trigger patterns from the database
#[poise::command(slash_command)]
pub async fn reload(ctx: Context<'_>) -> Result<(), Error> {
    let active = resync_patterns(&ctx).await?;
    let embed = embeds::success_embed(
        &format!("Patterns reloaded, {active} dynamic patterns active."),
        &ctx.author().name,
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Pulls the enabled patterns out of the store and swaps them into the
/// trigger engine. Returns the number of active dynamic patterns.
async fn resync_patterns(ctx: &Context<'_>) -> Result<usize, Error> {
    let rows = ctx
        .data()
        .db
        .run_blocking(|db| db.list_regex_keywords(true))
        .await?;
    Ok(ctx.data().triggers.reload_patterns(&rows))
}

fn pattern_list_embed(
    body: String,
    total: usize,
    active: usize,
) -> poise::serenity_prelude::CreateEmbed {
    use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter};
    CreateEmbed::new()
        .title("🔑 Trigger patterns")
        .description(body)
        .color(embeds::COLOR_INFO)
        .footer(CreateEmbedFooter::new(format!(
            "{total} registered • {active} active"
        )))
}
