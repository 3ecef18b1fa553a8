use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{BotError, Result};
use crate::roblox::RobloxIdentity;

/// Which flow issued a challenge, and so what a successful match commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// First link: create the account
    Verify,
    /// Existing link: replace it
    Reverify,
}

/// An outstanding proof-of-ownership code for one Discord user
#[derive(Debug, Clone)]
pub struct Challenge {
    pub requester_id: String,
    pub token: String,
    pub target: RobloxIdentity,
    pub kind: ChallengeKind,
    pub issued_at: DateTime<Utc>,
    /// Set while a confirmation is checking this challenge
    pub in_flight: bool,
}

/// `VERIFY-<6 random digits>-<last 4 chars of the requester ID>`
pub fn generate_token(requester_id: &str) -> String {
    let number: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    let count = requester_id.chars().count();
    let suffix: String = requester_id.chars().skip(count.saturating_sub(4)).collect();
    format!("VERIFY-{}-{}", number, suffix)
}

/// In-memory challenges, one per requester
pub struct ChallengeStore {
    challenges: DashMap<String, Challenge>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            challenges: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, challenge: &Challenge, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(challenge.issued_at).to_std() {
            Ok(age) => age > self.ttl,
            // Issued in the future relative to `now`
            Err(_) => false,
        }
    }

    /// Issue a fresh challenge, replacing any previous one for this requester
    pub fn issue(&self, requester_id: &str, kind: ChallengeKind, target: RobloxIdentity) -> Challenge {
        self.issue_at(requester_id, kind, target, Utc::now())
    }

    pub fn issue_at(
        &self,
        requester_id: &str,
        kind: ChallengeKind,
        target: RobloxIdentity,
        now: DateTime<Utc>,
    ) -> Challenge {
        let challenge = Challenge {
            requester_id: requester_id.to_string(),
            token: generate_token(requester_id),
            target,
            kind,
            issued_at: now,
            in_flight: false,
        };
        self.challenges
            .insert(requester_id.to_string(), challenge.clone());
        debug!(
            "Issued {:?} challenge for {} targeting Roblox ID {}",
            kind, requester_id, challenge.target.id
        );
        challenge
    }

    /// The live challenge for a requester, without consuming it
    pub fn peek(&self, requester_id: &str) -> Option<Challenge> {
        self.peek_at(requester_id, Utc::now())
    }

    pub fn peek_at(&self, requester_id: &str, now: DateTime<Utc>) -> Option<Challenge> {
        self.challenges
            .get(requester_id)
            .filter(|c| !self.is_expired(c, now))
            .map(|c| c.clone())
    }

    /// Atomically take a challenge for checking
    ///
    /// Fails with `NoPendingChallenge` if there is no live challenge and with
    /// `ConfirmationInProgress` if another confirmation holds it. A claimed
    /// challenge must be finished with [`consume`](Self::consume) or
    /// [`release`](Self::release).
    pub fn claim(&self, requester_id: &str) -> Result<Challenge> {
        self.claim_at(requester_id, Utc::now())
    }

    pub fn claim_at(&self, requester_id: &str, now: DateTime<Utc>) -> Result<Challenge> {
        match self.challenges.entry(requester_id.to_string()) {
            Entry::Vacant(_) => Err(BotError::NoPendingChallenge),
            Entry::Occupied(mut entry) => {
                if self.is_expired(entry.get(), now) {
                    entry.remove();
                    return Err(BotError::NoPendingChallenge);
                }
                if entry.get().in_flight {
                    return Err(BotError::ConfirmationInProgress);
                }
                entry.get_mut().in_flight = true;
                Ok(entry.get().clone())
            }
        }
    }

    /// Hand a claimed challenge back so it can be confirmed again
    pub fn release(&self, requester_id: &str, token: &str) {
        if let Some(mut challenge) = self.challenges.get_mut(requester_id) {
            if challenge.token == token {
                challenge.in_flight = false;
            }
        }
    }

    /// Remove the challenge if it still carries `token`
    pub fn consume(&self, requester_id: &str, token: &str) -> bool {
        self.challenges
            .remove_if(requester_id, |_, c| c.token == token)
            .is_some()
    }

    /// Drop every expired challenge, returning how many went
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.challenges.len();
        self.challenges.retain(|_, c| !self.is_expired(c, now));
        before.saturating_sub(self.challenges.len())
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

pub type SharedChallengeStore = Arc<ChallengeStore>;

pub fn create_shared_challenge_store(ttl: Duration) -> SharedChallengeStore {
    Arc::new(ChallengeStore::new(ttl))
}

/// Periodically sweep expired challenges until the runtime shuts down
pub fn spawn_sweeper(store: SharedChallengeStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // tokio rejects a zero period
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                info!("Swept {} expired verification challenge(s)", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const TEN_MINUTES: Duration = Duration::from_secs(600);

    fn target() -> RobloxIdentity {
        RobloxIdentity::new("156", "Builderman")
    }

    #[test]
    fn test_token_format() {
        let token = generate_token("123456789012345678");
        let parts: Vec<&str> = token.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "VERIFY");
        assert_eq!(parts[1].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2], "5678");

        assert!(generate_token("42").ends_with("-42"));
    }

    #[test]
    fn test_issue_overwrites_previous_challenge() {
        let store = ChallengeStore::new(TEN_MINUTES);
        let first = store.issue("u1", ChallengeKind::Verify, target());
        let second = store.issue("u1", ChallengeKind::Reverify, target());

        assert_eq!(store.len(), 1);
        let live = store.peek("u1").unwrap();
        assert_eq!(live.token, second.token);
        assert_eq!(live.kind, ChallengeKind::Reverify);
        // A late consume with the old token must not remove the new one
        if first.token != second.token {
            assert!(!store.consume("u1", &first.token));
            assert!(store.peek("u1").is_some());
        }
    }

    #[test]
    fn test_expired_challenge_is_absent_and_swept() {
        let store = ChallengeStore::new(TEN_MINUTES);
        let now = Utc::now();
        store.issue_at("old", ChallengeKind::Verify, target(), now - ChronoDuration::seconds(601));
        store.issue_at("edge", ChallengeKind::Verify, target(), now - ChronoDuration::seconds(600));
        store.issue_at("new", ChallengeKind::Verify, target(), now);

        assert!(store.peek_at("old", now).is_none());
        assert!(store.peek_at("edge", now).is_some());
        assert!(matches!(
            store.claim_at("old", now),
            Err(BotError::NoPendingChallenge)
        ));

        // "old" was already dropped by the failed claim
        store.issue_at("old", ChallengeKind::Verify, target(), now - ChronoDuration::seconds(700));
        assert_eq!(store.sweep_at(now), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let store = ChallengeStore::new(TEN_MINUTES);
        let issued = store.issue("u1", ChallengeKind::Verify, target());

        let claimed = store.claim("u1").unwrap();
        assert_eq!(claimed.token, issued.token);
        assert!(matches!(
            store.claim("u1"),
            Err(BotError::ConfirmationInProgress)
        ));

        store.release("u1", &claimed.token);
        assert!(store.claim("u1").is_ok());
    }

    #[test]
    fn test_consume_removes_claimed_challenge() {
        let store = ChallengeStore::new(TEN_MINUTES);
        store.issue("u1", ChallengeKind::Verify, target());
        let claimed = store.claim("u1").unwrap();

        assert!(store.consume("u1", &claimed.token));
        assert!(store.peek("u1").is_none());
        assert!(matches!(store.claim("u1"), Err(BotError::NoPendingChallenge)));
    }

    #[test]
    fn test_claim_without_challenge() {
        let store = ChallengeStore::new(TEN_MINUTES);
        assert!(matches!(store.claim("u1"), Err(BotError::NoPendingChallenge)));
        assert!(store.is_empty());
    }
}
