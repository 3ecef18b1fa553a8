use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serenity::{EditMember, GuildId, Http, UserId};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::managers::permission_checker::{can_manage_nickname, highest_role_position};
use crate::verification::{IdentitySync, SyncReport};

/// Sets a member's server nickname to their Roblox username
pub struct NicknameSync {
    http: Arc<Http>,
    guild_id: Option<GuildId>,
}

impl NicknameSync {
    pub fn new(http: Arc<Http>, guild_id: Option<GuildId>) -> Self {
        Self { http, guild_id }
    }

    async fn apply(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        nickname: &str,
    ) -> Result<SyncReport, serenity::Error> {
        let http = self.http.as_ref();
        let guild = guild_id.to_partial_guild(http).await?;
        let bot_user = http.get_current_user().await?;
        let bot_member = guild.member(http, bot_user.id).await?;
        let member = guild.member(http, user_id).await?;

        #[allow(deprecated)]
        let bot_permissions = guild.member_permissions(&bot_member);

        if let Err(report) = can_manage_nickname(
            bot_permissions,
            highest_role_position(&guild, &bot_member.roles),
            highest_role_position(&guild, &member.roles),
            guild.owner_id == user_id,
        ) {
            debug!(
                "Not renaming {} in guild {}: {:?}",
                user_id, guild_id, report
            );
            return Ok(report);
        }

        guild_id
            .edit_member(http, user_id, EditMember::new().nickname(nickname))
            .await?;
        info!("Set nickname of {} in guild {} to '{}'", user_id, guild_id, nickname);
        Ok(SyncReport::Updated)
    }
}

#[async_trait]
impl IdentitySync for NicknameSync {
    async fn sync(&self, discord_id: &str, roblox_username: &str) -> SyncReport {
        let Some(guild_id) = self.guild_id else {
            return SyncReport::Skipped;
        };
        let Some(user_id) = discord_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(UserId::new)
        else {
            return SyncReport::Skipped;
        };

        match self.apply(guild_id, user_id, roblox_username).await {
            Ok(report) => report,
            Err(e) => {
                error!("Error updating nickname for {}: {}", discord_id, e);
                SyncReport::Failed(e.to_string())
            }
        }
    }
}
