use tracing::{error, info, warn};

use super::checks::ephemeral;
use crate::messages;
use crate::state::{ApprovalStatus, NewServer};
use crate::{Context, Error};

/// Only the configured bot admin passes; everyone else gets a refusal
async fn authorize_admin(ctx: Context<'_>, command: &str) -> Result<bool, Error> {
    let author = ctx.author();
    match &ctx.data().settings.admin_user_id {
        None => {
            error!("ADMIN_USER_ID is not set, /{} is disabled", command);
            ephemeral(ctx, messages::ADMIN_DISABLED).await?;
            Ok(false)
        }
        Some(admin) if *admin != author.id.to_string() => {
            warn!(
                "Unauthorized attempt to use /{} by {} ({})",
                command, author.name, author.id
            );
            ephemeral(ctx, messages::ADMIN_ONLY).await?;
            Ok(false)
        }
        Some(_) => Ok(true),
    }
}

/// Approve a server to use the bot (bot admin only)
#[poise::command(prefix_command, slash_command)]
pub async fn allowid(
    ctx: Context<'_>,
    #[description = "The Discord server ID to approve"] server_id: String,
) -> Result<(), Error> {
    if !authorize_admin(ctx, "allowid").await? {
        return Ok(());
    }
    let server_id = server_id.trim();
    if server_id.is_empty() {
        return ephemeral(ctx, "Please provide a server ID.").await;
    }

    let storage = &ctx.data().storage;
    let result = async {
        if storage.get_server(server_id).await?.is_some() {
            storage.update_server_approval(server_id, true).await?;
        } else {
            storage
                .create_server(NewServer {
                    server_id: server_id.to_string(),
                    server_name: "Approved Server".to_string(),
                    owner_discord_id: ctx.author().id.to_string(),
                    is_approved: true,
                    member_count: 0,
                })
                .await?;
        }
        storage
            .update_approval_status(server_id, ApprovalStatus::Approved)
            .await
    }
    .await;

    match result {
        Ok(_) => {
            info!("Server {} approved by {}", server_id, ctx.author().id);
            ephemeral(ctx, messages::server_approved(server_id)).await
        }
        Err(e) => {
            error!("Error approving server {}: {}", server_id, e);
            ephemeral(ctx, "There was an error approving the server. Please try again later.")
                .await
        }
    }
}

/// Revoke a server's permission to use the bot (bot admin only)
#[poise::command(prefix_command, slash_command)]
pub async fn disallowid(
    ctx: Context<'_>,
    #[description = "The Discord server ID to revoke"] server_id: String,
) -> Result<(), Error> {
    if !authorize_admin(ctx, "disallowid").await? {
        return Ok(());
    }
    let server_id = server_id.trim();
    if server_id.is_empty() {
        return ephemeral(ctx, "Please provide a server ID.").await;
    }

    let storage = &ctx.data().storage;
    let result = async {
        if storage
            .update_server_approval(server_id, false)
            .await?
            .is_none()
        {
            return Ok(false);
        }
        storage
            .update_approval_status(server_id, ApprovalStatus::Denied)
            .await?;
        Ok::<_, crate::error::BotError>(true)
    }
    .await;

    match result {
        Ok(true) => {
            info!("Server {} revoked by {}", server_id, ctx.author().id);
            ephemeral(ctx, messages::server_revoked(server_id)).await
        }
        Ok(false) => ephemeral(ctx, messages::server_not_found(server_id)).await,
        Err(e) => {
            error!("Error revoking server {}: {}", server_id, e);
            ephemeral(
                ctx,
                "There was an error revoking server permission. Please try again later.",
            )
            .await
        }
    }
}
