use tracing::warn;

use crate::messages;
use crate::{Context, Error};

/// Commands that must work in servers that are not approved yet
const APPROVAL_EXEMPT: [&str; 2] = ["allowid", "disallowid"];

pub async fn ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(text.into())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Runs before every command: guild only, approved servers only (the bot
/// admin may use any server), per-user cooldown, usage counter
pub async fn command_gate(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    let command = ctx.command().name.as_str();
    let user_id = ctx.author().id.to_string();

    let Some(guild_id) = ctx.guild_id() else {
        ephemeral(ctx, messages::DM_NOT_SUPPORTED).await?;
        return Ok(false);
    };

    if !APPROVAL_EXEMPT.contains(&command) && !data.settings.is_admin(&user_id) {
        let approved = data
            .storage
            .is_server_approved(&guild_id.to_string())
            .await?;
        if !approved {
            warn!(
                "Rejected '{}' from {} in unapproved server {}",
                command, user_id, guild_id
            );
            ephemeral(ctx, messages::SERVER_NOT_APPROVED).await?;
            return Ok(false);
        }
    }

    if let Err(remaining) = data.cooldowns.check(&user_id, command) {
        ephemeral(
            ctx,
            messages::cooldown_message(remaining.as_secs_f64(), command),
        )
        .await?;
        return Ok(false);
    }

    if let Err(e) = data.storage.increment_commands_run().await {
        warn!("Failed to bump command counter: {}", e);
    }

    Ok(true)
}
