use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::models::{
    ApprovalRequest, ApprovalStatus, BotStats, LinkedAccount, NewApprovalRequest, NewServer,
    Server,
};
use crate::error::{BotError, Result};

const SCHEMA_VERSION: u32 = 1;

/// Snapshot of everything the bot persists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: u64,

    /// Servers by Discord guild ID
    #[serde(default)]
    pub servers: HashMap<String, Server>,

    /// Linked accounts by Discord user ID
    #[serde(default)]
    pub linked_accounts: HashMap<String, LinkedAccount>,

    /// Approval requests by Discord guild ID
    #[serde(default)]
    pub approval_requests: HashMap<String, ApprovalRequest>,

    #[serde(default)]
    pub stats: BotStats,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_updated: current_timestamp(),
            servers: HashMap::new(),
            linked_accounts: HashMap::new(),
            approval_requests: HashMap::new(),
            stats: BotStats::default(),
        }
    }
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let db: Self =
                    serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                        path: path.to_string(),
                        source: e,
                    })?;

                if db.version > SCHEMA_VERSION {
                    tracing::warn!(
                        "State file {} has schema version {} (newer than {}), loading anyway",
                        path,
                        db.version,
                        SCHEMA_VERSION
                    );
                }

                Ok(db)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        Ok(())
    }

    fn touch(&mut self) {
        self.last_updated = current_timestamp();
    }

    // Servers

    pub fn insert_server(&mut self, new: NewServer) -> Result<Server> {
        if self.servers.contains_key(&new.server_id) {
            return Err(BotError::Duplicate {
                kind: "server",
                key: new.server_id,
            });
        }
        let server = Server::from(new);
        self.servers.insert(server.server_id.clone(), server.clone());
        self.touch();
        Ok(server)
    }

    pub fn set_server_approval(&mut self, server_id: &str, approved: bool) -> Option<Server> {
        let server = self.servers.get_mut(server_id)?;
        server.is_approved = approved;
        server.approved_at = approved.then(Utc::now);
        let updated = server.clone();
        self.touch();
        Some(updated)
    }

    // Linked accounts

    pub fn insert_linked_account(&mut self, account: LinkedAccount) -> Result<LinkedAccount> {
        if self.linked_accounts.contains_key(&account.discord_id) {
            return Err(BotError::Duplicate {
                kind: "linked account",
                key: account.discord_id,
            });
        }
        self.linked_accounts
            .insert(account.discord_id.clone(), account.clone());
        self.touch();
        Ok(account)
    }

    pub fn relink_account(
        &mut self,
        discord_id: &str,
        roblox_id: &str,
        roblox_username: &str,
    ) -> Option<LinkedAccount> {
        let account = self.linked_accounts.get_mut(discord_id)?;
        account.relink(roblox_id, roblox_username);
        let updated = account.clone();
        self.touch();
        Some(updated)
    }

    // Approval requests

    /// File a request, or reopen an existing one as pending
    pub fn upsert_approval_request(&mut self, new: NewApprovalRequest) -> ApprovalRequest {
        let request = match self.approval_requests.get(&new.server_id) {
            Some(existing) => ApprovalRequest {
                server_name: new.server_name,
                requested_by: new.requested_by,
                member_count: new.member_count,
                status: ApprovalStatus::Pending,
                updated_at: Utc::now(),
                ..existing.clone()
            },
            None => ApprovalRequest::from(new),
        };
        self.approval_requests
            .insert(request.server_id.clone(), request.clone());
        self.touch();
        request
    }

    pub fn set_approval_status(
        &mut self,
        server_id: &str,
        status: ApprovalStatus,
    ) -> Option<ApprovalRequest> {
        let request = self.approval_requests.get_mut(server_id)?;
        request.status = status;
        request.updated_at = Utc::now();
        let updated = request.clone();
        self.touch();
        Some(updated)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_server(id: &str, approved: bool) -> NewServer {
        NewServer {
            server_id: id.to_string(),
            server_name: "Test Server".to_string(),
            owner_discord_id: "1".to_string(),
            is_approved: approved,
            member_count: 10,
        }
    }

    #[test]
    fn test_server_approval_sets_timestamp() {
        let mut db = Database::new();
        let server = db.insert_server(new_server("100", false)).unwrap();
        assert!(!server.is_approved);
        assert!(server.approved_at.is_none());

        let approved = db.set_server_approval("100", true).unwrap();
        assert!(approved.is_approved);
        assert!(approved.approved_at.is_some());

        let revoked = db.set_server_approval("100", false).unwrap();
        assert!(revoked.approved_at.is_none());

        assert!(db.set_server_approval("missing", true).is_none());
    }

    #[test]
    fn test_duplicate_server_rejected() {
        let mut db = Database::new();
        db.insert_server(new_server("100", true)).unwrap();
        let err = db.insert_server(new_server("100", false)).unwrap_err();
        assert!(matches!(err, BotError::Duplicate { kind: "server", .. }));
    }

    #[test]
    fn test_relink_bumps_last_updated() {
        let mut db = Database::new();
        let account = db
            .insert_linked_account(LinkedAccount::new("u1", "156", "Builderman"))
            .unwrap();

        let relinked = db.relink_account("u1", "1", "Roblox").unwrap();
        assert_eq!(relinked.roblox_id, "1");
        assert_eq!(relinked.roblox_username, "Roblox");
        assert_eq!(relinked.verified_at, account.verified_at);
        assert!(relinked.last_updated_at >= account.last_updated_at);
    }

    #[test]
    fn test_approval_request_reopens_as_pending() {
        let mut db = Database::new();
        let request = NewApprovalRequest {
            server_id: "100".to_string(),
            server_name: "Old Name".to_string(),
            requested_by: "owner#0001".to_string(),
            member_count: 5,
        };
        let first = db.upsert_approval_request(request.clone());
        db.set_approval_status("100", ApprovalStatus::Denied);

        let reopened = db.upsert_approval_request(NewApprovalRequest {
            server_name: "New Name".to_string(),
            ..request
        });
        assert_eq!(reopened.status, ApprovalStatus::Pending);
        assert_eq!(reopened.server_name, "New Name");
        assert_eq!(reopened.requested_at, first.requested_at);
    }
}
