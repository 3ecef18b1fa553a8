use poise::serenity_prelude as serenity;
use tracing::{debug, error};

use crate::commands::verification::{confirm_response, kind_for_button};
use crate::managers::NicknameSync;
use crate::messages;
use crate::{Data, Error};

async fn respond_ephemeral(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    text: &str,
) -> Result<(), Error> {
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Handle clicks on the verify / reverify buttons
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(kind) = kind_for_button(&component.data.custom_id) else {
        return Ok(());
    };
    let requester = component.user.id.to_string();
    debug!("{:?} button pressed by {}", kind, requester);

    let Some(guild_id) = component.guild_id else {
        return respond_ephemeral(ctx, component, messages::BUTTON_DM_NOT_SUPPORTED).await;
    };

    if !data.settings.is_admin(&requester)
        && !data
            .storage
            .is_server_approved(&guild_id.to_string())
            .await?
    {
        return respond_ephemeral(ctx, component, messages::BUTTON_SERVER_NOT_APPROVED).await;
    }

    component.defer_ephemeral(&ctx.http).await?;

    let sync = NicknameSync::new(ctx.http.clone(), Some(guild_id));
    let (text, row) = match data.verification_manager.confirm(&requester, &sync).await {
        Ok(outcome) => confirm_response(&outcome),
        Err(e) if e.is_user_facing() => (e.to_string(), None),
        Err(e) => {
            error!("Failed to save verification for {}: {}", requester, e);
            (messages::SAVE_FAILED.to_string(), None)
        }
    };

    let mut edit = serenity::EditInteractionResponse::new().content(text);
    if let Some(row) = row {
        edit = edit.components(vec![row]);
    }
    component.edit_response(&ctx.http, edit).await?;
    Ok(())
}
