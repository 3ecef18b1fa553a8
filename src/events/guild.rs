use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use crate::messages;
use crate::state::{NewApprovalRequest, NewServer, Server};
use crate::{Data, Error};

/// Whether a GuildCreate for this guild should open an approval request.
/// Gateway replays for already known servers are ignored unless the bot was
/// just re-added to a server that is still unapproved.
pub fn needs_approval_request(known: Option<&Server>, is_new: Option<bool>) -> bool {
    match known {
        None => true,
        Some(server) if server.is_approved => false,
        Some(_) => is_new == Some(true),
    }
}

/// Handle when the bot joins a new guild or starts up
pub async fn handle_guild_create(
    ctx: &serenity::Context,
    guild: &serenity::Guild,
    is_new: Option<bool>,
    data: &Data,
) -> Result<(), Error> {
    let server_id = guild.id.to_string();
    let known = data.storage.get_server(&server_id).await?;

    if !needs_approval_request(known.as_ref(), is_new) {
        debug!("Guild {} ({}) already registered", guild.name, guild.id);
        return Ok(());
    }

    info!(
        "Joined unapproved guild {} ({}), {} members",
        guild.name, guild.id, guild.member_count
    );

    let owner_id = guild.owner_id.to_string();
    data.storage
        .create_approval_request(NewApprovalRequest {
            server_id: server_id.clone(),
            server_name: guild.name.clone(),
            requested_by: owner_id.clone(),
            member_count: guild.member_count,
        })
        .await?;

    if known.is_none() {
        data.storage
            .create_server(NewServer {
                server_id: server_id.clone(),
                server_name: guild.name.clone(),
                owner_discord_id: owner_id,
                is_approved: false,
                member_count: guild.member_count,
            })
            .await?;
    }

    if let Some(channel_id) = guild.system_channel_id {
        if let Err(e) = channel_id
            .say(&ctx.http, messages::system_channel_notice())
            .await
        {
            warn!(
                "Could not post approval notice in guild {}: {}",
                guild.id, e
            );
        }
    }

    match guild.owner_id.to_user(&ctx.http).await {
        Ok(owner) => {
            let dm = serenity::CreateMessage::new().content(messages::owner_notice(&guild.name));
            if let Err(e) = owner.direct_message(&ctx.http, dm).await {
                warn!("Could not DM owner {} of guild {}: {}", owner.tag(), guild.id, e);
            }
        }
        Err(e) => error!("Failed to fetch owner of guild {}: {}", guild.id, e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(approved: bool) -> Server {
        NewServer {
            server_id: "42".to_string(),
            server_name: "Test".to_string(),
            owner_discord_id: "1".to_string(),
            is_approved: approved,
            member_count: 3,
        }
        .into()
    }

    #[test]
    fn test_unknown_guild_needs_request() {
        assert!(needs_approval_request(None, None));
        assert!(needs_approval_request(None, Some(false)));
    }

    #[test]
    fn test_known_guilds_are_not_renotified() {
        assert!(!needs_approval_request(Some(&server(true)), Some(true)));
        assert!(!needs_approval_request(Some(&server(false)), Some(false)));
        assert!(!needs_approval_request(Some(&server(false)), None));
    }

    #[test]
    fn test_readded_unapproved_guild_needs_request() {
        assert!(needs_approval_request(Some(&server(false)), Some(true)));
    }
}
