// src/messages.rs

use std::time::Duration;

use crate::verification::ChallengeKind;

pub const EMBED_COLOR: u32 = 0x5865F2;

pub fn verify_embed_title(kind: ChallengeKind) -> &'static str {
    match kind {
        ChallengeKind::Verify => "Roblox Verification",
        ChallengeKind::Reverify => "Roblox Re-Verification",
    }
}

/// Instructions shown with the Verify button
pub fn verify_instructions(username: &str, token: &str, ttl: Duration) -> String {
    format!(
        "To verify that you own the Roblox account **{}**, please follow these steps:\n\n\
        1. Go to [your Roblox profile](https://www.roblox.com/my/profile)\n\
        2. Click the pencil icon (✏️) next to your profile\n\
        3. Add the following code to your \"About Me\" section:\n\
        ```\n{}\n```\n\
        4. Click Save\n\
        5. Click the \"Verify\" button below once you've added the code\n\n\
        The code will expire in {}. Make sure to add the code exactly as shown above, with no extra spaces or characters.",
        username,
        token,
        expiry_text(ttl)
    )
}

/// Instructions for text commands, where there is no button
pub fn text_verify_instructions(
    username: &str,
    token: &str,
    prefix: &str,
    ttl: Duration,
) -> String {
    format!(
        "To verify that you own the Roblox account **{}**, please follow these steps:\n\n\
        1. Go to your Roblox profile\n\
        2. Add the following code to your \"About Me\" section:\n\
        ```\n{}\n```\n\
        3. Once you've added the code, send `{}confirm`\n\n\
        The code will expire in {}.",
        username,
        token,
        prefix,
        expiry_text(ttl)
    )
}

/// Whole minutes when the lifetime divides evenly, otherwise seconds
fn expiry_text(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s >= 60 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}

/// Shown when the code was not found; the challenge is still valid
pub fn remediation_message(token: &str) -> String {
    format!(
        "❌ Verification failed. The code was not found in your Roblox profile.\n\
        Your verification code is:\n```\n{}\n```\n\
        Please make sure you:\n\n\
        1. Go to Roblox.com and log in\n\
        2. Click on your avatar in the top-right and select 'My Profile'\n\
        3. Click the pencil icon (✏️) to edit your profile\n\
        4. Copy and paste the entire verification code to your About section\n\
        5. Click the Save button\n\
        6. Try verifying again\n\n\
        The code must be added exactly as shown above, with no extra spaces or characters.\n\n\
        If you're still having trouble, try clearing your profile description completely, then add only the verification code.",
        token
    )
}

pub fn verification_success(username: &str, sync_note: &str) -> String {
    format!(
        "✅ Verification successful! Your Discord account is now linked to your Roblox account **{}**.\n\n{}",
        username, sync_note
    )
}

pub fn update_success(username: &str, sync_note: &str) -> String {
    format!(
        "Your verification has been updated. You are now verified as **{}**.\n\n{}",
        username, sync_note
    )
}

pub const SAVE_FAILED: &str = "There was an error saving your verification. Please try again later.";
pub const GENERIC_FAILURE: &str = "There was an error processing your request. Please try again later.";

pub const DM_NOT_SUPPORTED: &str = "Commands can only be used in servers, not in DMs.";
pub const BUTTON_DM_NOT_SUPPORTED: &str = "Buttons can only be used in servers, not in DMs.";
pub const SERVER_NOT_APPROVED: &str = "This server is not approved to use this bot. Please contact the bot owner to get approval or use the `/allowid` command if you are the bot admin.";
pub const BUTTON_SERVER_NOT_APPROVED: &str = "This server is not approved to use this bot. Please contact the bot owner to get approval.";

pub fn cooldown_message(remaining_secs: f64, command: &str) -> String {
    format!(
        "Please wait {:.1} more seconds before using the `{}` command.",
        remaining_secs, command
    )
}

// Approval workflow

pub const ADMIN_DISABLED: &str = "This command is currently disabled. Please contact the bot owner.";
pub const ADMIN_ONLY: &str = "You don't have permission to use this command. This incident has been logged.";

pub fn server_approved(server_id: &str) -> String {
    format!("Server {} has been approved.", server_id)
}

pub fn server_revoked(server_id: &str) -> String {
    format!(
        "Server {} permission has been revoked. The bot will no longer function in that server.",
        server_id
    )
}

pub fn server_not_found(server_id: &str) -> String {
    format!("Server {} not found in the database.", server_id)
}

pub fn system_channel_notice() -> String {
    "Thank you for adding the Roblox Verifier bot!\n\n\
    This server is not yet approved to use this bot. Your request has been sent to the bot administrator.\n\
    Once approved, all features will be available.\n\n\
    For expedited approval, please contact us on our website."
        .to_string()
}

pub fn owner_notice(guild_name: &str) -> String {
    format!(
        "Thank you for adding the Roblox Verifier bot to \"{}\"!\n\n\
        Your server is not yet approved to use this bot. Your request has been sent to the bot administrator.\n\
        Once approved, all features will be available.\n\n\
        For expedited approval, please contact us on our website.",
        guild_name
    )
}

// Help

pub fn help_user_commands(prefix: &str) -> String {
    format!(
        "- `/verify [roblox_username]` - Link your Discord account with your Roblox account\n\
        - `/update` - Update your verification information\n\
        - `/reverify [roblox_username]` - Re-verify with a different Roblox account\n\
        - `/confirm` - Check your profile for the verification code\n\
        - `/help` - Show this help message\n\n\
        Text commands work too: `{0}verify`, `{0}reverify`, `{0}update`, `{0}confirm`, `{0}help`.",
        prefix
    )
}

pub const HELP_ADMIN_COMMANDS: &str = "- `/allowid [server_id]` - Approve a server to use the bot\n\
    - `/disallowid [server_id]` - Revoke a server's permission to use the bot";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_includes_token() {
        let text = remediation_message("VERIFY-123456-7890");
        assert!(text.contains("```\nVERIFY-123456-7890\n```"));
    }

    #[test]
    fn test_cooldown_message_rounds_to_one_decimal() {
        assert_eq!(
            cooldown_message(2.345, "verify"),
            "Please wait 2.3 more seconds before using the `verify` command."
        );
    }

    #[test]
    fn test_instructions_mention_username_and_token() {
        let text = verify_instructions("Builderman", "VERIFY-111111-2222", Duration::from_secs(600));
        assert!(text.contains("**Builderman**"));
        assert!(text.contains("VERIFY-111111-2222"));

        let text = text_verify_instructions(
            "Builderman",
            "VERIFY-111111-2222",
            "!",
            Duration::from_secs(600),
        );
        assert!(text.contains("`!confirm`"));
    }

    #[test]
    fn test_instructions_follow_configured_lifetime() {
        let text = verify_instructions("Builderman", "VERIFY-111111-2222", Duration::from_secs(300));
        assert!(text.contains("expire in 5 minutes."));
        assert!(!text.contains("10 minutes"));

        let text = text_verify_instructions(
            "Builderman",
            "VERIFY-111111-2222",
            "!",
            Duration::from_secs(90),
        );
        assert!(text.contains("expire in 90 seconds."));

        assert_eq!(expiry_text(Duration::from_secs(60)), "1 minute");
        assert_eq!(expiry_text(Duration::from_secs(600)), "10 minutes");
    }
}
