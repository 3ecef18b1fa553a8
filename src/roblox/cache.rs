use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::RobloxIdentity;

#[derive(Default)]
struct Maps {
    by_username: HashMap<String, RobloxIdentity>,
    by_id: HashMap<String, RobloxIdentity>,
}

/// Process-lifetime cache of resolved Roblox identities, keyed both ways
///
/// Usernames are keyed lowercased. Both maps are updated under one lock so a
/// lookup by either key always returns the same pair.
#[derive(Default)]
pub struct IdentityCache {
    maps: RwLock<Maps>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: &RobloxIdentity) {
        let key = identity.username.to_lowercase();
        let mut maps = self.maps.write();

        // Drop stale halves of pairs this one supersedes
        if let Some(old) = maps.by_username.get(&key).cloned() {
            if old.id != identity.id {
                maps.by_id.remove(&old.id);
            }
        }
        if let Some(old) = maps.by_id.get(&identity.id).cloned() {
            let old_key = old.username.to_lowercase();
            if old_key != key {
                maps.by_username.remove(&old_key);
            }
        }

        maps.by_username.insert(key, identity.clone());
        maps.by_id.insert(identity.id.clone(), identity.clone());
    }

    pub fn by_username(&self, username: &str) -> Option<RobloxIdentity> {
        self.maps
            .read()
            .by_username
            .get(&username.to_lowercase())
            .cloned()
    }

    pub fn by_id(&self, id: &str) -> Option<RobloxIdentity> {
        self.maps.read().by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedIdentityCache = Arc<IdentityCache>;

pub fn create_shared_identity_cache() -> SharedIdentityCache {
    Arc::new(IdentityCache::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways_case_insensitive() {
        let cache = IdentityCache::new();
        cache.insert(&RobloxIdentity::new("156", "Builderman"));

        let by_name = cache.by_username("BUILDERMAN").unwrap();
        let by_id = cache.by_id("156").unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_id.username, "Builderman");
        assert!(cache.by_username("roblox").is_none());
    }

    #[test]
    fn test_renamed_account_replaces_old_username() {
        let cache = IdentityCache::new();
        cache.insert(&RobloxIdentity::new("156", "OldName"));
        cache.insert(&RobloxIdentity::new("156", "NewName"));

        assert!(cache.by_username("oldname").is_none());
        assert_eq!(cache.by_id("156").unwrap().username, "NewName");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reassigned_username_drops_old_id() {
        let cache = IdentityCache::new();
        cache.insert(&RobloxIdentity::new("1", "Alice"));
        cache.insert(&RobloxIdentity::new("2", "alice"));

        assert!(cache.by_id("1").is_none());
        assert_eq!(cache.by_username("Alice").unwrap().id, "2");
        assert_eq!(cache.by_id("2").unwrap(), cache.by_username("ALICE").unwrap());
    }
}
