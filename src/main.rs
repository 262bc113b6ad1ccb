use poise::serenity_prelude as serenity;
use taverncord::commands::{admin, ask, keywords};
use taverncord::config::{Config, RuntimeToggles};
use taverncord::{answer, Data};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ask::ask(),
                ask::diagnose(),
                ask::help(),
                keywords::keyword(),
                admin::stats(),
                admin::toggle_auto_reply(),
                admin::toggle_keyword_trigger(),
                admin::recent(),
                admin::errors(),
                admin::cleanup(),
                admin::broadcast(),
                admin::shutdown(),
            ],
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    match event {
                        serenity::FullEvent::Message { new_message } => {
                            if let Err(e) = answer::handle_message(ctx, new_message, data).await {
                                report_handler_error(data, "message_handler", &e, new_message);
                            }
                        }
                        serenity::FullEvent::MessageUpdate {
                            old_if_available,
                            new,
                            ..
                        } => {
                            if let Some(new_message) = new {
                                if let Err(e) =
                                    answer::handle_edit(ctx, old_if_available.as_ref(), new_message, data)
                                        .await
                                {
                                    report_handler_error(data, "edit_handler", &e, new_message);
                                }
                            }
                        }
                        _ => {}
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let ai = taverncord::llm::AiClient::new(&config);
                let db = taverncord::db::Database::new(&config)?;
                db.execute_init()?;

                let triggers = taverncord::trigger::TriggerEngine::new(config.cache_max_size)?;
                let stored = db.list_regex_keywords(true)?;
                triggers.reload_patterns(&stored);

                let toggles = RuntimeToggles::new(&config);

                Ok(Data {
                    config,
                    toggles,
                    http_client: reqwest::Client::new(),
                    ai,
                    db,
                    triggers,
                    started_at: std::time::Instant::now(),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Error boundary for the per-message pipeline: nothing thrown by a handler
/// may take down the event loop. The failure is logged with context and
/// recorded to the error-log table best-effort.
fn report_handler_error(
    data: &Data,
    error_type: &'static str,
    e: &taverncord::Error,
    message: &serenity::Message,
) {
    error!(
        user = %message.author.id,
        channel = %message.channel_id,
        "{error_type} failed: {e}"
    );

    let error_message = e.to_string();
    let user_id = message.author.id.get();
    let channel_id = message.channel_id.get();
    let db = data.db.clone();
    tokio::spawn(async move {
        let result = db
            .run_blocking(move |db| {
                db.log_error(
                    error_type,
                    &error_message,
                    Some(user_id),
                    Some(channel_id),
                    None,
                )
            })
            .await;
        if let Err(log_err) = result {
            error!("could not record handler error: {log_err}");
        }
    });
}
