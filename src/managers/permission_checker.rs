use poise::serenity_prelude::{GuildId, Http, PartialGuild, Permissions, RoleId};
use tracing::{error, info, warn};

use crate::verification::SyncReport;

/// Permissions the bot needs in every approved server
pub fn get_required_permissions() -> Vec<(&'static str, &'static str, Permissions)> {
    vec![
        ("VIEW_CHANNEL", "See channels", Permissions::VIEW_CHANNEL),
        ("SEND_MESSAGES", "Post approval notices", Permissions::SEND_MESSAGES),
        ("EMBED_LINKS", "Send verification instructions", Permissions::EMBED_LINKS),
        ("MANAGE_NICKNAMES", "Set nicknames to Roblox usernames", Permissions::MANAGE_NICKNAMES),
    ]
}

/// Result of a permission check for a single guild
#[derive(Debug)]
pub struct GuildPermissionCheck {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub missing: Vec<(&'static str, &'static str)>,
    pub bot_role_position: u16,
}

/// Highest position among `roles`; members with no roles sit at @everyone (0)
pub fn highest_role_position(guild: &PartialGuild, roles: &[RoleId]) -> u16 {
    roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .map(|role| role.position)
        .max()
        .unwrap_or(0)
}

/// Whether the bot may rename a member, or why not
pub fn can_manage_nickname(
    bot_permissions: Permissions,
    bot_position: u16,
    member_position: u16,
    member_is_owner: bool,
) -> Result<(), SyncReport> {
    if !bot_permissions.contains(Permissions::MANAGE_NICKNAMES)
        && !bot_permissions.contains(Permissions::ADMINISTRATOR)
    {
        return Err(SyncReport::MissingPermission);
    }
    if member_is_owner || bot_position <= member_position {
        return Err(SyncReport::Outranked);
    }
    Ok(())
}

/// Check bot permissions for a specific guild
pub async fn check_guild_permissions(
    http: &Http,
    guild_id: GuildId,
) -> Result<GuildPermissionCheck, String> {
    let guild = guild_id
        .to_partial_guild(http)
        .await
        .map_err(|e| format!("Failed to fetch guild {}: {}", guild_id, e))?;

    let bot_user = http
        .get_current_user()
        .await
        .map_err(|e| format!("Failed to get bot user: {}", e))?;

    let bot_member = guild
        .member(http, bot_user.id)
        .await
        .map_err(|e| format!("Failed to get bot member in guild {}: {}", guild_id, e))?;

    #[allow(deprecated)]
    let bot_permissions = guild.member_permissions(&bot_member);

    let missing = if bot_permissions.contains(Permissions::ADMINISTRATOR) {
        Vec::new()
    } else {
        get_required_permissions()
            .into_iter()
            .filter(|(_, _, permission)| !bot_permissions.contains(*permission))
            .map(|(name, description, _)| (name, description))
            .collect()
    };

    Ok(GuildPermissionCheck {
        guild_id,
        guild_name: guild.name.clone(),
        missing,
        bot_role_position: highest_role_position(&guild, &bot_member.roles),
    })
}

/// Check every guild and log what is missing
/// Returns true if all permissions are OK, false otherwise
pub async fn run_startup_permission_check(http: &Http, guild_ids: &[GuildId]) -> bool {
    let mut all_ok = true;

    for guild_id in guild_ids {
        match check_guild_permissions(http, *guild_id).await {
            Ok(check) if check.missing.is_empty() => {
                info!(
                    "Permissions OK in '{}' ({}), bot role position {}",
                    check.guild_name, check.guild_id, check.bot_role_position
                );
            }
            Ok(check) => {
                all_ok = false;
                warn!(
                    "Missing permissions in '{}' ({}):",
                    check.guild_name, check.guild_id
                );
                for (name, description) in &check.missing {
                    warn!("  [NO] {:<18} - {}", name, description);
                }
            }
            Err(e) => {
                all_ok = false;
                error!("Failed to check permissions for guild {}: {}", guild_id, e);
            }
        }
    }

    if !all_ok {
        warn!("Fix: Server Settings > Roles > Bot's role > enable the missing permissions");
    }
    all_ok
}
