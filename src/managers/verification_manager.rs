use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{BotError, Result};
use crate::messages;
use crate::roblox::{RobloxIdentity, SharedResolver};
use crate::state::SharedStorage;
use crate::verification::{
    ChallengeKind, ConfirmOutcome, IdentitySync, ProfileMatcher, SharedChallengeStore,
    UpdateOutcome, VerifyPrompt,
};

/// Drives the verify / reverify / update / confirm flow for each requester
///
/// Per requester: no challenge → challenge issued → confirmed (link committed,
/// challenge consumed) or not found (challenge kept for another try).
pub struct VerificationManager {
    storage: SharedStorage,
    resolver: SharedResolver,
    challenges: SharedChallengeStore,
    matcher: ProfileMatcher,
}

impl VerificationManager {
    pub fn new(
        storage: SharedStorage,
        resolver: SharedResolver,
        challenges: SharedChallengeStore,
        matcher: ProfileMatcher,
    ) -> Self {
        Self {
            storage,
            resolver,
            challenges,
            matcher,
        }
    }

    pub fn challenges(&self) -> &SharedChallengeStore {
        &self.challenges
    }

    /// Start a first-time link
    pub async fn start_verify(
        &self,
        requester_id: &str,
        username: Option<&str>,
    ) -> Result<VerifyPrompt> {
        let username = require_username(username)?;

        if let Some(existing) = self.storage.get_linked_account(requester_id).await? {
            return Err(BotError::AlreadyLinked {
                username: existing.roblox_username,
            });
        }

        self.issue(requester_id, username, ChallengeKind::Verify)
            .await
    }

    /// Start replacing an existing link with another Roblox account
    pub async fn start_reverify(
        &self,
        requester_id: &str,
        username: Option<&str>,
    ) -> Result<VerifyPrompt> {
        let username = require_username(username)?;

        if self
            .storage
            .get_linked_account(requester_id)
            .await?
            .is_none()
        {
            return Err(BotError::NotLinked);
        }

        self.issue(requester_id, username, ChallengeKind::Reverify)
            .await
    }

    async fn issue(
        &self,
        requester_id: &str,
        username: &str,
        kind: ChallengeKind,
    ) -> Result<VerifyPrompt> {
        let identity = self.resolver.resolve_handle_to_id(username).await?;
        let challenge = self.challenges.issue(requester_id, kind, identity);

        info!(
            "Issued {:?} code for {} → Roblox '{}' ({})",
            kind, requester_id, challenge.target.username, challenge.target.id
        );

        let ttl = self.challenges.ttl();
        Ok(VerifyPrompt {
            embed_text: messages::verify_instructions(
                &challenge.target.username,
                &challenge.token,
                ttl,
            ),
            token: challenge.token,
            username: challenge.target.username,
            kind,
            ttl,
        })
    }

    /// Refresh the stored username from the linked Roblox ID
    pub async fn start_update(
        &self,
        requester_id: &str,
        sync: &dyn IdentitySync,
    ) -> Result<UpdateOutcome> {
        let account = self
            .storage
            .get_linked_account(requester_id)
            .await?
            .ok_or(BotError::NotLinked)?;

        let identity = self.resolver.resolve_id_to_handle(&account.roblox_id).await?;
        self.storage
            .update_linked_account(requester_id, &identity.id, &identity.username)
            .await?
            .ok_or(BotError::NotLinked)?;

        info!(
            "Updated link for {}: '{}' → '{}'",
            requester_id, account.roblox_username, identity.username
        );

        let report = sync.sync(requester_id, &identity.username).await;
        Ok(UpdateOutcome {
            username: identity.username,
            sync_note: report.message(),
        })
    }

    /// Check the requester's profile for their code and commit on success
    ///
    /// A missing code is a normal `Ok` outcome with remediation text; the
    /// challenge stays valid. A storage failure is returned as an error and
    /// also leaves the challenge valid. A code made stale by a link change
    /// is dropped and the precondition error returned.
    pub async fn confirm(
        &self,
        requester_id: &str,
        sync: &dyn IdentitySync,
    ) -> Result<ConfirmOutcome> {
        let challenge = self.challenges.claim(requester_id)?;

        if !self.matcher.matches(&challenge).await {
            self.challenges.release(requester_id, &challenge.token);
            info!(
                "Code for {} not found on Roblox profile {}",
                requester_id, challenge.target.id
            );
            return Ok(ConfirmOutcome {
                success: false,
                kind: challenge.kind,
                username: None,
                remediation: Some(messages::remediation_message(&challenge.token)),
                sync_note: None,
            });
        }

        let target = &challenge.target;
        let committed = match challenge.kind {
            ChallengeKind::Verify => self.create_link(requester_id, target).await,
            ChallengeKind::Reverify => self
                .storage
                .update_linked_account(requester_id, &target.id, &target.username)
                .await
                .and_then(|updated| updated.map(|_| ()).ok_or(BotError::NotLinked)),
        };

        if let Err(e) = committed {
            if e.is_user_facing() {
                // The link changed since the code was issued; the code is stale
                self.challenges.consume(requester_id, &challenge.token);
                warn!(
                    "Dropped stale {:?} code for {}: {}",
                    challenge.kind, requester_id, e
                );
            } else {
                self.challenges.release(requester_id, &challenge.token);
                error!(
                    "Failed to save link for {} → {}: {}",
                    requester_id, target.id, e
                );
            }
            return Err(e);
        }

        self.challenges.consume(requester_id, &challenge.token);

        if let Err(e) = self.storage.increment_verifications().await {
            warn!("Failed to bump verification counter: {}", e);
        }

        info!(
            "{} verified as Roblox '{}' ({})",
            requester_id, target.username, target.id
        );

        let report = sync.sync(requester_id, &target.username).await;
        Ok(ConfirmOutcome {
            success: true,
            kind: challenge.kind,
            username: Some(target.username.clone()),
            remediation: None,
            sync_note: Some(report.message()),
        })
    }

    /// First-time link; an account linked after the code was issued wins
    async fn create_link(&self, requester_id: &str, target: &RobloxIdentity) -> Result<()> {
        if let Some(existing) = self.storage.get_linked_account(requester_id).await? {
            return Err(BotError::AlreadyLinked {
                username: existing.roblox_username,
            });
        }

        match self
            .storage
            .create_linked_account(requester_id, &target.id, &target.username)
            .await
        {
            Ok(_) => Ok(()),
            Err(BotError::Duplicate { .. }) => {
                let username = self
                    .storage
                    .get_linked_account(requester_id)
                    .await?
                    .map(|account| account.roblox_username)
                    .unwrap_or_default();
                Err(BotError::AlreadyLinked { username })
            }
            Err(e) => Err(e),
        }
    }
}

fn require_username(username: Option<&str>) -> Result<&str> {
    match username.map(str::trim) {
        Some(u) if !u.is_empty() => Ok(u),
        _ => Err(BotError::MissingUsername),
    }
}

/// Shared verification manager type
pub type SharedVerificationManager = Arc<VerificationManager>;

pub fn create_shared_verification_manager(manager: VerificationManager) -> SharedVerificationManager {
    Arc::new(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roblox::chain::Strategy;
    use crate::roblox::client::{LookupError, RawResponse};
    use crate::roblox::{create_shared_identity_cache, IdentityResolver, ProfileSource};
    use crate::state::store::Storage;
    use crate::state::FileStore;
    use crate::verification::{create_shared_challenge_store, NoopSync, SyncReport};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Fake Roblox directory keyed by lowercased username
    struct Directory(Vec<RobloxIdentity>);

    #[async_trait]
    impl Strategy<RobloxIdentity> for Directory {
        fn name(&self) -> &'static str {
            "directory"
        }

        async fn attempt(&self, input: &str) -> std::result::Result<RobloxIdentity, LookupError> {
            self.0
                .iter()
                .find(|i| i.username.eq_ignore_ascii_case(input) || i.id == input)
                .cloned()
                .ok_or_else(|| LookupError::NotFound(input.to_string()))
        }
    }

    /// Profile whose description the test can edit
    #[derive(Default)]
    struct EditableProfile {
        description: Mutex<String>,
    }

    impl EditableProfile {
        fn set(&self, text: &str) {
            *self.description.lock() = text.to_string();
        }
    }

    #[async_trait]
    impl ProfileSource for EditableProfile {
        async fn fetch_profile(&self, user_id: &str) -> std::result::Result<RawResponse, LookupError> {
            let description = self.description.lock().clone();
            let body = json!({"id": user_id, "description": description});
            Ok(RawResponse {
                status: 200,
                body: body.to_string(),
            })
        }

        async fn fetch_status(&self, _user_id: &str) -> std::result::Result<Option<String>, LookupError> {
            Ok(None)
        }
    }

    struct RecordingSync(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl IdentitySync for RecordingSync {
        async fn sync(&self, discord_id: &str, roblox_username: &str) -> SyncReport {
            self.0
                .lock()
                .push((discord_id.to_string(), roblox_username.to_string()));
            SyncReport::Updated
        }
    }

    struct Harness {
        manager: VerificationManager,
        storage: SharedStorage,
        profile: Arc<EditableProfile>,
    }

    fn harness_with(storage: SharedStorage, directory: Vec<RobloxIdentity>) -> Harness {
        let resolver = IdentityResolver::with_remote_strategies(
            vec![Box::new(Directory(directory.clone()))],
            vec![Box::new(Directory(directory))],
            create_shared_identity_cache(),
        );
        let profile = Arc::new(EditableProfile::default());
        let manager = VerificationManager::new(
            storage.clone(),
            Arc::new(resolver),
            create_shared_challenge_store(Duration::from_secs(600)),
            ProfileMatcher::new(profile.clone()),
        );
        Harness {
            manager,
            storage,
            profile,
        }
    }

    fn harness() -> Harness {
        harness_with(
            Arc::new(FileStore::in_memory()),
            vec![
                RobloxIdentity::new("1001", "Alice"),
                RobloxIdentity::new("1002", "Bob"),
            ],
        )
    }

    #[tokio::test]
    async fn test_verify_then_confirm_links_account() {
        let h = harness();
        let prompt = h.manager.start_verify("U1", Some("Alice")).await.unwrap();
        assert!(prompt.embed_text.contains(&prompt.token));
        assert!(prompt.embed_text.contains("expire in 10 minutes"));
        assert_eq!(prompt.kind, ChallengeKind::Verify);

        h.profile.set(&prompt.token);
        let sync = RecordingSync(Mutex::new(Vec::new()));
        let outcome = h.manager.confirm("U1", &sync).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.username.as_deref(), Some("Alice"));
        let account = h.storage.get_linked_account("U1").await.unwrap().unwrap();
        assert_eq!(account.roblox_id, "1001");
        assert!(h.manager.challenges().peek("U1").is_none());
        assert_eq!(h.storage.get_stats().await.unwrap().verifications, 1);
        assert_eq!(
            sync.0.lock().as_slice(),
            &[("U1".to_string(), "Alice".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_confirm_keeps_token_for_retry() {
        let h = harness();
        let prompt = h.manager.start_verify("U1", Some("Alice")).await.unwrap();

        let outcome = h.manager.confirm("U1", &NoopSync).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.remediation.unwrap().contains(&prompt.token));
        assert!(h.storage.get_linked_account("U1").await.unwrap().is_none());

        h.profile.set(&format!("about me: {}", prompt.token));
        let retry = h.manager.confirm("U1", &NoopSync).await.unwrap();
        assert!(retry.success);
        assert!(h.storage.get_linked_account("U1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reverify_requires_existing_link() {
        let h = harness();
        let err = h
            .manager
            .start_reverify("U1", Some("Bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::NotLinked));
        assert!(h.manager.challenges().peek("U1").is_none());
    }

    #[tokio::test]
    async fn test_reverify_replaces_link() {
        let h = harness();
        h.storage
            .create_linked_account("U1", "1001", "Alice")
            .await
            .unwrap();

        let prompt = h.manager.start_reverify("U1", Some("bob")).await.unwrap();
        assert_eq!(prompt.kind, ChallengeKind::Reverify);
        assert_eq!(prompt.username, "Bob");

        h.profile.set(&prompt.token);
        let outcome = h.manager.confirm("U1", &NoopSync).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.kind, ChallengeKind::Reverify);

        let account = h.storage.get_linked_account("U1").await.unwrap().unwrap();
        assert_eq!(account.roblox_id, "1002");
        assert_eq!(account.roblox_username, "Bob");
    }

    #[tokio::test]
    async fn test_verify_preconditions() {
        let h = harness();
        assert!(matches!(
            h.manager.start_verify("U1", None).await,
            Err(BotError::MissingUsername)
        ));
        assert!(matches!(
            h.manager.start_verify("U1", Some("  ")).await,
            Err(BotError::MissingUsername)
        ));

        h.storage
            .create_linked_account("U1", "1001", "Alice")
            .await
            .unwrap();
        let err = h
            .manager
            .start_verify("U1", Some("Bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::AlreadyLinked { username } if username == "Alice"));
        assert!(h.manager.challenges().peek("U1").is_none());
    }

    #[tokio::test]
    async fn test_confirm_without_challenge() {
        let h = harness();
        assert!(matches!(
            h.manager.confirm("U1", &NoopSync).await,
            Err(BotError::NoPendingChallenge)
        ));
    }

    #[tokio::test]
    async fn test_confirm_while_another_is_in_flight() {
        let h = harness();
        h.manager.start_verify("U1", Some("Alice")).await.unwrap();
        let held = h.manager.challenges().claim("U1").unwrap();

        assert!(matches!(
            h.manager.confirm("U1", &NoopSync).await,
            Err(BotError::ConfirmationInProgress)
        ));

        h.manager.challenges().release("U1", &held.token);
        h.profile.set(&held.token);
        assert!(h.manager.confirm("U1", &NoopSync).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_update_refreshes_username() {
        let h = harness_with(
            Arc::new(FileStore::in_memory()),
            vec![RobloxIdentity::new("1001", "AliceRenamed")],
        );
        h.storage
            .create_linked_account("U1", "1001", "Alice")
            .await
            .unwrap();

        let sync = RecordingSync(Mutex::new(Vec::new()));
        let outcome = h.manager.start_update("U1", &sync).await.unwrap();
        assert_eq!(outcome.username, "AliceRenamed");
        assert_eq!(outcome.sync_note, SyncReport::Updated.message());

        let account = h.storage.get_linked_account("U1").await.unwrap().unwrap();
        assert_eq!(account.roblox_username, "AliceRenamed");
        assert!(h.manager.challenges().peek("U1").is_none());

        assert!(matches!(
            h.manager.start_update("U2", &NoopSync).await,
            Err(BotError::NotLinked)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_challenge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verifier.json");
        std::fs::create_dir(dir.path().join("verifier.json.tmp")).unwrap();
        let store = FileStore::open(path.to_str().unwrap()).await.unwrap();

        let h = harness_with(Arc::new(store), vec![RobloxIdentity::new("1001", "Alice")]);
        let prompt = h.manager.start_verify("U1", Some("Alice")).await.unwrap();
        h.profile.set(&prompt.token);

        let err = h.manager.confirm("U1", &NoopSync).await.unwrap_err();
        assert!(matches!(err, BotError::StateSave { .. }));

        let still_there = h.manager.challenges().peek("U1").unwrap();
        assert_eq!(still_there.token, prompt.token);
        assert!(!still_there.in_flight);
    }

    #[tokio::test]
    async fn test_verify_code_confirmed_after_link_exists_is_dropped() {
        let h = harness();
        let prompt = h.manager.start_verify("U1", Some("Bob")).await.unwrap();

        // Linked through another path while the code was outstanding
        h.storage
            .create_linked_account("U1", "1001", "Alice")
            .await
            .unwrap();
        h.profile.set(&prompt.token);

        let sync = RecordingSync(Mutex::new(Vec::new()));
        let err = h.manager.confirm("U1", &sync).await.unwrap_err();
        assert!(matches!(&err, BotError::AlreadyLinked { username } if username == "Alice"));
        assert!(err.is_user_facing());

        assert!(h.manager.challenges().peek("U1").is_none());
        let account = h.storage.get_linked_account("U1").await.unwrap().unwrap();
        assert_eq!(account.roblox_id, "1001");
        assert_eq!(account.roblox_username, "Alice");
        assert_eq!(h.storage.get_stats().await.unwrap().verifications, 0);
        assert!(sync.0.lock().is_empty());

        let err = h.manager.confirm("U1", &NoopSync).await.unwrap_err();
        assert!(matches!(err, BotError::NoPendingChallenge));
    }
}
