use poise::serenity_prelude as serenity;
use tracing::info;

use crate::messages;
use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(
        poise::CreateReply::default()
            .content("Pong! Bot is working!")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show available commands
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let settings = &ctx.data().settings;
    let mut embed = serenity::CreateEmbed::new()
        .title("Roblox Verifier Commands")
        .field(
            "User Commands",
            messages::help_user_commands(&settings.command_prefix),
            false,
        )
        .color(messages::EMBED_COLOR);

    if settings.is_admin(&ctx.author().id.to_string()) {
        embed = embed.field("Admin Commands", messages::HELP_ADMIN_COMMANDS, false);
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
