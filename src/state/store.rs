use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::database::Database;
use super::models::{
    ApprovalRequest, ApprovalStatus, BotStats, LinkedAccount, NewApprovalRequest, NewServer,
    Server,
};
use crate::error::Result;

/// Persistence operations used by the bot and the web API
///
/// Implementations must be safe to share between the Discord event loop
/// and the web server.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_server(&self, server_id: &str) -> Result<Option<Server>>;
    async fn list_servers(&self) -> Result<Vec<Server>>;
    async fn list_approved_servers(&self) -> Result<Vec<Server>>;
    async fn create_server(&self, server: NewServer) -> Result<Server>;
    async fn update_server_approval(&self, server_id: &str, approved: bool)
        -> Result<Option<Server>>;

    /// Unknown servers are not approved
    async fn is_server_approved(&self, server_id: &str) -> Result<bool> {
        Ok(self
            .get_server(server_id)
            .await?
            .map(|s| s.is_approved)
            .unwrap_or(false))
    }

    async fn get_linked_account(&self, discord_id: &str) -> Result<Option<LinkedAccount>>;
    async fn create_linked_account(
        &self,
        discord_id: &str,
        roblox_id: &str,
        roblox_username: &str,
    ) -> Result<LinkedAccount>;
    async fn update_linked_account(
        &self,
        discord_id: &str,
        roblox_id: &str,
        roblox_username: &str,
    ) -> Result<Option<LinkedAccount>>;

    async fn get_approval_request(&self, server_id: &str) -> Result<Option<ApprovalRequest>>;
    async fn list_approval_requests(&self) -> Result<Vec<ApprovalRequest>>;
    async fn list_pending_approval_requests(&self) -> Result<Vec<ApprovalRequest>>;
    async fn create_approval_request(&self, request: NewApprovalRequest)
        -> Result<ApprovalRequest>;
    async fn update_approval_status(
        &self,
        server_id: &str,
        status: ApprovalStatus,
    ) -> Result<Option<ApprovalRequest>>;

    async fn get_stats(&self) -> Result<BotStats>;
    async fn increment_commands_run(&self) -> Result<()>;
    async fn increment_verifications(&self) -> Result<()>;
    async fn update_uptime(&self, seconds: u64) -> Result<()>;
    async fn record_startup(&self) -> Result<()>;
}

/// Shared storage type
pub type SharedStorage = Arc<dyn Storage>;

/// Storage backed by a JSON snapshot on disk
///
/// Every mutation is applied to a copy and written out before it becomes
/// visible, so a failed write leaves the in-memory state untouched.
pub struct FileStore {
    db: RwLock<Database>,
    path: Option<String>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: &str) -> Result<Self> {
        let db = Database::load(path).await?;
        debug!(
            "Loaded state from {}: {} servers, {} linked accounts",
            path,
            db.servers.len(),
            db.linked_accounts.len()
        );
        Ok(Self {
            db: RwLock::new(db),
            path: Some(path.to_string()),
        })
    }

    /// A store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            db: RwLock::new(Database::new()),
            path: None,
        }
    }

    async fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let db = self.db.read().await;
        f(&db)
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut db = self.db.write().await;
        let mut next = db.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            next.save(path).await?;
        }
        *db = next;
        Ok(out)
    }
}

#[async_trait]
impl Storage for FileStore {
    async fn get_server(&self, server_id: &str) -> Result<Option<Server>> {
        Ok(self.read(|db| db.servers.get(server_id).cloned()).await)
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        Ok(self.read(|db| db.servers.values().cloned().collect()).await)
    }

    async fn list_approved_servers(&self) -> Result<Vec<Server>> {
        Ok(self
            .read(|db| {
                db.servers
                    .values()
                    .filter(|s| s.is_approved)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_server(&self, server: NewServer) -> Result<Server> {
        self.mutate(|db| db.insert_server(server)).await
    }

    async fn update_server_approval(
        &self,
        server_id: &str,
        approved: bool,
    ) -> Result<Option<Server>> {
        self.mutate(|db| Ok(db.set_server_approval(server_id, approved)))
            .await
    }

    async fn get_linked_account(&self, discord_id: &str) -> Result<Option<LinkedAccount>> {
        Ok(self
            .read(|db| db.linked_accounts.get(discord_id).cloned())
            .await)
    }

    async fn create_linked_account(
        &self,
        discord_id: &str,
        roblox_id: &str,
        roblox_username: &str,
    ) -> Result<LinkedAccount> {
        let account = LinkedAccount::new(discord_id, roblox_id, roblox_username);
        self.mutate(|db| db.insert_linked_account(account)).await
    }

    async fn update_linked_account(
        &self,
        discord_id: &str,
        roblox_id: &str,
        roblox_username: &str,
    ) -> Result<Option<LinkedAccount>> {
        self.mutate(|db| Ok(db.relink_account(discord_id, roblox_id, roblox_username)))
            .await
    }

    async fn get_approval_request(&self, server_id: &str) -> Result<Option<ApprovalRequest>> {
        Ok(self
            .read(|db| db.approval_requests.get(server_id).cloned())
            .await)
    }

    async fn list_approval_requests(&self) -> Result<Vec<ApprovalRequest>> {
        Ok(self
            .read(|db| db.approval_requests.values().cloned().collect())
            .await)
    }

    async fn list_pending_approval_requests(&self) -> Result<Vec<ApprovalRequest>> {
        Ok(self
            .read(|db| {
                db.approval_requests
                    .values()
                    .filter(|r| r.status == ApprovalStatus::Pending)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn create_approval_request(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequest> {
        self.mutate(|db| Ok(db.upsert_approval_request(request)))
            .await
    }

    async fn update_approval_status(
        &self,
        server_id: &str,
        status: ApprovalStatus,
    ) -> Result<Option<ApprovalRequest>> {
        self.mutate(|db| Ok(db.set_approval_status(server_id, status)))
            .await
    }

    async fn get_stats(&self) -> Result<BotStats> {
        Ok(self.read(|db| db.stats.clone()).await)
    }

    async fn increment_commands_run(&self) -> Result<()> {
        self.mutate(|db| {
            db.stats.commands_run += 1;
            Ok(())
        })
        .await
    }

    async fn increment_verifications(&self) -> Result<()> {
        self.mutate(|db| {
            db.stats.verifications += 1;
            Ok(())
        })
        .await
    }

    async fn update_uptime(&self, seconds: u64) -> Result<()> {
        self.mutate(|db| {
            db.stats.uptime_secs = seconds;
            Ok(())
        })
        .await
    }

    async fn record_startup(&self) -> Result<()> {
        self.mutate(|db| {
            db.stats.last_startup = Utc::now();
            db.stats.uptime_secs = 0;
            Ok(())
        })
        .await
    }
}

pub fn create_shared_storage(store: FileStore) -> SharedStorage {
    Arc::new(store)
}
