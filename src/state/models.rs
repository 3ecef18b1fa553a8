use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Discord account linked to a Roblox account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedAccount {
    /// Discord user ID (snowflake as string)
    pub discord_id: String,

    /// Stable Roblox user ID
    pub roblox_id: String,

    /// Roblox username at the time of the last verification or update
    pub roblox_username: String,

    pub verified_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl LinkedAccount {
    pub fn new(discord_id: &str, roblox_id: &str, roblox_username: &str) -> Self {
        let now = Utc::now();
        Self {
            discord_id: discord_id.to_string(),
            roblox_id: roblox_id.to_string(),
            roblox_username: roblox_username.to_string(),
            verified_at: now,
            last_updated_at: now,
        }
    }

    /// Point the link at a (possibly different) Roblox account
    pub fn relink(&mut self, roblox_id: &str, roblox_username: &str) {
        self.roblox_id = roblox_id.to_string();
        self.roblox_username = roblox_username.to_string();
        self.last_updated_at = Utc::now();
    }
}

/// A Discord server the bot has been added to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub server_id: String,
    pub server_name: String,
    pub owner_discord_id: String,
    pub is_approved: bool,
    pub member_count: u64,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

/// Payload for registering a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServer {
    pub server_id: String,
    pub server_name: String,
    pub owner_discord_id: String,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub member_count: u64,
}

impl From<NewServer> for Server {
    fn from(new: NewServer) -> Self {
        let now = Utc::now();
        Self {
            server_id: new.server_id,
            server_name: new.server_name,
            owner_discord_id: new.owner_discord_id,
            is_approved: new.is_approved,
            member_count: new.member_count,
            requested_at: now,
            approved_at: new.is_approved.then_some(now),
        }
    }
}

/// Status of a server approval request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            other => Err(format!("unknown approval status '{}'", other)),
        }
    }
}

/// A request from a server to be allowed to use the bot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub server_id: String,
    pub server_name: String,
    pub requested_by: String,
    pub member_count: u64,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for filing an approval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    pub server_id: String,
    pub server_name: String,
    pub requested_by: String,
    #[serde(default)]
    pub member_count: u64,
}

impl From<NewApprovalRequest> for ApprovalRequest {
    fn from(new: NewApprovalRequest) -> Self {
        let now = Utc::now();
        Self {
            server_id: new.server_id,
            server_name: new.server_name,
            requested_by: new.requested_by,
            member_count: new.member_count,
            status: ApprovalStatus::Pending,
            requested_at: now,
            updated_at: now,
        }
    }
}

/// Counters shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotStats {
    pub commands_run: u64,
    pub verifications: u64,
    /// Seconds since `last_startup`, refreshed periodically
    pub uptime_secs: u64,
    pub last_startup: DateTime<Utc>,
}

impl Default for BotStats {
    fn default() -> Self {
        Self {
            commands_run: 0,
            verifications: 0,
            uptime_secs: 0,
            last_startup: Utc::now(),
        }
    }
}
