use poise::serenity_prelude as serenity;
use tracing::error;

use super::checks::ephemeral;
use crate::error::BotError;
use crate::managers::NicknameSync;
use crate::messages;
use crate::verification::{ChallengeKind, ConfirmOutcome, VerifyPrompt};
use crate::{Context, Error};

pub const VERIFY_BUTTON_ID: &str = "verify_check";
pub const REVERIFY_BUTTON_ID: &str = "reverify_check";

pub fn button_id(kind: ChallengeKind) -> &'static str {
    match kind {
        ChallengeKind::Verify => VERIFY_BUTTON_ID,
        ChallengeKind::Reverify => REVERIFY_BUTTON_ID,
    }
}

pub fn kind_for_button(custom_id: &str) -> Option<ChallengeKind> {
    match custom_id {
        VERIFY_BUTTON_ID => Some(ChallengeKind::Verify),
        REVERIFY_BUTTON_ID => Some(ChallengeKind::Reverify),
        _ => None,
    }
}

pub fn verify_button_row(kind: ChallengeKind) -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(button_id(kind))
        .label("Verify")
        .style(serenity::ButtonStyle::Primary)])
}

/// Text and optional retry button for a confirmation result
pub fn confirm_response(outcome: &ConfirmOutcome) -> (String, Option<serenity::CreateActionRow>) {
    if outcome.success {
        let username = outcome.username.as_deref().unwrap_or_default();
        let note = outcome.sync_note.as_deref().unwrap_or_default();
        (messages::verification_success(username, note), None)
    } else {
        let text = outcome
            .remediation
            .clone()
            .unwrap_or_else(|| messages::GENERIC_FAILURE.to_string());
        (text, Some(verify_button_row(outcome.kind)))
    }
}

async fn reply_error(ctx: Context<'_>, e: &BotError, flow: &str) -> Result<(), Error> {
    if e.is_user_facing() {
        return ephemeral(ctx, e.to_string()).await;
    }
    error!("{} error for {}: {}", flow, ctx.author().id, e);
    ephemeral(
        ctx,
        format!(
            "There was an error during the {} process. Please try again later.",
            flow
        ),
    )
    .await
}

async fn send_prompt(
    ctx: Context<'_>,
    result: crate::error::Result<VerifyPrompt>,
    flow: &str,
) -> Result<(), Error> {
    let prompt = match result {
        Ok(prompt) => prompt,
        Err(e) => return reply_error(ctx, &e, flow).await,
    };

    let description = match ctx {
        poise::Context::Prefix(_) => messages::text_verify_instructions(
            &prompt.username,
            &prompt.token,
            &ctx.data().settings.command_prefix,
            prompt.ttl,
        ),
        _ => prompt.embed_text.clone(),
    };

    let embed = serenity::CreateEmbed::new()
        .title(messages::verify_embed_title(prompt.kind))
        .description(description)
        .color(messages::EMBED_COLOR);

    ctx.send(
        poise::CreateReply::default()
            .embed(embed)
            .components(vec![verify_button_row(prompt.kind)])
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Link your Discord account with your Roblox account
#[poise::command(prefix_command, slash_command)]
pub async fn verify(
    ctx: Context<'_>,
    #[description = "Your Roblox username"] roblox_username: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let requester = ctx.author().id.to_string();
    let result = ctx
        .data()
        .verification_manager
        .start_verify(&requester, roblox_username.as_deref())
        .await;
    send_prompt(ctx, result, "verification").await
}

/// Re-verify with a different Roblox account
#[poise::command(prefix_command, slash_command)]
pub async fn reverify(
    ctx: Context<'_>,
    #[description = "Your new Roblox username"] roblox_username: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let requester = ctx.author().id.to_string();
    let result = ctx
        .data()
        .verification_manager
        .start_reverify(&requester, roblox_username.as_deref())
        .await;
    send_prompt(ctx, result, "re-verification").await
}

/// Update your verification information
#[poise::command(prefix_command, slash_command)]
pub async fn update(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let requester = ctx.author().id.to_string();
    let sync = NicknameSync::new(ctx.serenity_context().http.clone(), ctx.guild_id());

    match ctx
        .data()
        .verification_manager
        .start_update(&requester, &sync)
        .await
    {
        Ok(outcome) => {
            ephemeral(
                ctx,
                messages::update_success(&outcome.username, &outcome.sync_note),
            )
            .await
        }
        Err(e) => reply_error(ctx, &e, "update").await,
    }
}

/// Check your Roblox profile for your verification code
#[poise::command(prefix_command, slash_command)]
pub async fn confirm(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let requester = ctx.author().id.to_string();
    let sync = NicknameSync::new(ctx.serenity_context().http.clone(), ctx.guild_id());

    match ctx
        .data()
        .verification_manager
        .confirm(&requester, &sync)
        .await
    {
        Ok(outcome) => {
            let (text, row) = confirm_response(&outcome);
            let mut reply = poise::CreateReply::default().content(text).ephemeral(true);
            if let Some(row) = row {
                reply = reply.components(vec![row]);
            }
            ctx.send(reply).await?;
            Ok(())
        }
        Err(e) if e.is_user_facing() => ephemeral(ctx, e.to_string()).await,
        Err(e) => {
            error!("Failed to save verification for {}: {}", requester, e);
            ephemeral(ctx, messages::SAVE_FAILED).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_ids_round_trip() {
        for kind in [ChallengeKind::Verify, ChallengeKind::Reverify] {
            assert_eq!(kind_for_button(button_id(kind)), Some(kind));
        }
        assert_eq!(kind_for_button("something_else"), None);
    }

    #[test]
    fn test_failed_confirm_offers_retry_button() {
        let outcome = ConfirmOutcome {
            success: false,
            kind: ChallengeKind::Reverify,
            username: None,
            remediation: Some(messages::remediation_message("VERIFY-123456-7890")),
            sync_note: None,
        };
        let (text, row) = confirm_response(&outcome);
        assert!(text.contains("VERIFY-123456-7890"));
        assert!(row.is_some());
    }

    #[test]
    fn test_successful_confirm_has_no_button() {
        let outcome = ConfirmOutcome {
            success: true,
            kind: ChallengeKind::Verify,
            username: Some("Builderman".to_string()),
            remediation: None,
            sync_note: Some(String::new()),
        };
        let (text, row) = confirm_response(&outcome);
        assert!(text.contains("**Builderman**"));
        assert!(row.is_none());
    }
}
