use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

type CooldownKey = (String, String);

/// Per-user, per-command rate limiting
///
/// Entries evict themselves once the cooldown has passed.
pub struct CooldownManager {
    last_used: Arc<DashMap<CooldownKey, Instant>>,
    cooldown: Duration,
}

impl CooldownManager {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_used: Arc::new(DashMap::new()),
            cooldown,
        }
    }

    /// Record a use, or return how long the user still has to wait
    pub fn check(&self, user_id: &str, command: &str) -> Result<(), Duration> {
        self.check_at(user_id, command, Instant::now())
    }

    pub fn check_at(&self, user_id: &str, command: &str, now: Instant) -> Result<(), Duration> {
        let key = (user_id.to_string(), command.to_string());

        match self.last_used.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < self.cooldown {
                    return Err(self.cooldown - elapsed);
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        self.schedule_eviction(key, now);
        Ok(())
    }

    fn schedule_eviction(&self, key: CooldownKey, stamped: Instant) {
        // Without a runtime (plain unit tests) entries simply stay until overwritten
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let map = self.last_used.clone();
        let cooldown = self.cooldown;
        handle.spawn(async move {
            tokio::time::sleep(cooldown).await;
            map.remove_if(&key, |_, t| *t == stamped);
        });
    }

    pub fn tracked(&self) -> usize {
        self.last_used.len()
    }
}

pub type SharedCooldownManager = Arc<CooldownManager>;

pub fn create_shared_cooldown_manager(cooldown: Duration) -> SharedCooldownManager {
    Arc::new(CooldownManager::new(cooldown))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_use_within_cooldown_is_rejected() {
        let cooldowns = CooldownManager::new(Duration::from_secs(3));
        let start = Instant::now();

        assert!(cooldowns.check_at("u1", "verify", start).is_ok());
        let remaining = cooldowns
            .check_at("u1", "verify", start + Duration::from_millis(1200))
            .unwrap_err();
        assert_eq!(remaining, Duration::from_millis(1800));

        // Other commands and other users are independent
        assert!(cooldowns.check_at("u1", "help", start).is_ok());
        assert!(cooldowns.check_at("u2", "verify", start).is_ok());

        assert!(cooldowns
            .check_at("u1", "verify", start + Duration::from_secs(3))
            .is_ok());
    }

    #[tokio::test]
    async fn test_entries_evict_themselves() {
        let cooldowns = CooldownManager::new(Duration::from_millis(50));
        cooldowns.check("u1", "verify").unwrap();
        assert_eq!(cooldowns.tracked(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cooldowns.tracked(), 0);
    }
}
