// src/verification/types.rs
use async_trait::async_trait;
use std::time::Duration;

use super::challenge::ChallengeKind;

/// What the requester is shown after starting verify or reverify
#[derive(Debug, Clone)]
pub struct VerifyPrompt {
    pub embed_text: String,
    pub token: String,
    pub username: String,
    pub kind: ChallengeKind,
    /// How long the code stays valid
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub username: String,
    pub sync_note: String,
}

/// Result of checking the profile for a challenge
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub success: bool,
    pub kind: ChallengeKind,
    pub username: Option<String>,
    /// Retry instructions, set when the code was not found
    pub remediation: Option<String>,
    pub sync_note: Option<String>,
}

/// What happened when mirroring the Roblox username onto Discord
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    Updated,
    MissingPermission,
    /// The member's highest role is not below the bot's
    Outranked,
    /// Not in a guild, or the member could not be found
    Skipped,
    Failed(String),
}

impl SyncReport {
    pub fn message(&self) -> String {
        match self {
            SyncReport::Updated => {
                "Your nickname has been updated to match your Roblox username.".to_string()
            }
            SyncReport::MissingPermission => {
                "I don't have permission to update nicknames in this server.".to_string()
            }
            SyncReport::Outranked => {
                "I couldn't update your nickname because you have a higher role than me."
                    .to_string()
            }
            SyncReport::Skipped => String::new(),
            SyncReport::Failed(_) => {
                "I couldn't update your nickname due to an error.".to_string()
            }
        }
    }
}

/// Best-effort cosmetic sync run after a link is committed
#[async_trait]
pub trait IdentitySync: Send + Sync {
    async fn sync(&self, discord_id: &str, roblox_username: &str) -> SyncReport;
}

/// Sync that leaves Discord untouched
#[cfg(test)]
pub struct NoopSync;

#[cfg(test)]
#[async_trait]
impl IdentitySync for NoopSync {
    async fn sync(&self, _discord_id: &str, _roblox_username: &str) -> SyncReport {
        SyncReport::Skipped
    }
}
