pub mod admin;
pub mod ask;
pub mod keywords;

use crate::{Context, Error};

/// Gate for admin commands: the configured admin list, or the Discord
/// administrator permission carried on the interaction member.
pub async fn admin_check(ctx: Context<'_>) -> Result<bool, Error> {
    if ctx.data().config.is_admin_user(ctx.author().id.get()) {
        return Ok(true);
    }

    let has_admin_perm = ctx
        .author_member()
        .await
        .and_then(|member| member.permissions)
        .is_some_and(|perms| perms.administrator());

    if !has_admin_perm {
        ctx.send(
            poise::CreateReply::default()
                .content("You don't have permission to use this command.")
                .ephemeral(true),
        )
        .await?;
    }
    Ok(has_admin_perm)
}
