//! Username ↔ user ID resolution against Roblox
//!
//! Each direction is an ordered [`StrategyChain`]: five remote lookups, the
//! local cache, then a synthesized placeholder that always succeeds. The
//! placeholder keeps resolution total; ownership is proven separately by the
//! profile check, never by the identity lookup.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::cache::SharedIdentityCache;
use super::chain::{Strategy, StrategyChain};
use super::client::{json_id, LookupError, RobloxClient};
use super::RobloxIdentity;
use crate::error::{BotError, Result};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(7);
const PLACEHOLDER: &str = "placeholder";

static PROFILE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?i)data-userid="(\d+)""#,
        r"(?i)user/profile/(\d+)",
        r"(?i)user/id/(\d+)",
        r"(?i)userid=(\d+)",
        r#"(?i)data-id="(\d+)""#,
    ])
});

static PROFILE_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?i)<h1 class="profile-name"[^>]*>(.*?)</h1>"#,
        r"(?i)<title>(.*?)'s Profile",
        r#"(?i)<meta property="og:title" content="(.*?)'s Profile""#,
        r#"(?i)data-name="(.*?)""#,
        r#"(?i)displayName: "(.*?)""#,
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

// Response parsing

/// `{"Id": 156, "Username": "Builderman"}` from the legacy API
pub fn parse_legacy_user(value: &Value) -> Option<RobloxIdentity> {
    let id = json_id(&value["Id"])?;
    let username = non_empty(value["Username"].as_str())?;
    Some(RobloxIdentity::new(id, username))
}

/// Pick from a `{"data": [...]}` search result, preferring an exact
/// (case-insensitive) name match over the first entry
pub fn pick_search_result(
    value: &Value,
    username: &str,
    match_display_name: bool,
) -> Option<RobloxIdentity> {
    let entries = value["data"].as_array()?;
    let wanted = username.to_lowercase();

    let is_exact = |entry: &&Value| {
        let name_matches = entry["name"]
            .as_str()
            .map_or(false, |n| n.to_lowercase() == wanted);
        let display_matches = match_display_name
            && entry["displayName"]
                .as_str()
                .map_or(false, |n| n.to_lowercase() == wanted);
        name_matches || display_matches
    };

    let entry = entries.iter().find(is_exact).or_else(|| entries.first())?;
    data_entry(entry)
}

/// First entry of a `{"data": [{"id": .., "name": ..}]}` batch response
pub fn first_data_entry(value: &Value) -> Option<RobloxIdentity> {
    data_entry(value["data"].as_array()?.first()?)
}

fn data_entry(entry: &Value) -> Option<RobloxIdentity> {
    let id = json_id(&entry["id"])?;
    let username = non_empty(entry["name"].as_str())?;
    Some(RobloxIdentity::new(id, username))
}

/// First capture of the first pattern that matches with non-empty text
pub fn scrape_first(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn not_found(what: &str) -> LookupError {
    LookupError::NotFound(what.to_string())
}

// Username → ID strategies

struct LegacyUsernameLookup {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for LegacyUsernameLookup {
    fn name(&self) -> &'static str {
        "legacy get-by-username"
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!(
            "{}/users/get-by-username?username={}",
            self.client.endpoints.api,
            urlencoding::encode(username)
        );
        let body = self.client.get_json(&url).await?;
        parse_legacy_user(&body).ok_or_else(|| not_found("Id/Username"))
    }
}

struct UserSearch {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for UserSearch {
    fn name(&self) -> &'static str {
        "user search"
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!(
            "{}/v1/users/search?keyword={}&limit=10",
            self.client.endpoints.users,
            urlencoding::encode(username)
        );
        let body = self.client.get_json(&url).await?;
        pick_search_result(&body, username, false).ok_or_else(|| not_found("search results"))
    }
}

struct AvatarUsernames {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for AvatarUsernames {
    fn name(&self) -> &'static str {
        "avatar usernames"
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!("{}/v1/usernames/users", self.client.endpoints.avatar);
        let payload = json!({ "usernames": [username], "excludeBannedUsers": false });
        let body = self.client.post_for_json(&url, &payload).await?;
        first_data_entry(&body).ok_or_else(|| not_found("data[0]"))
    }
}

struct ProfilePageIdScrape {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for ProfilePageIdScrape {
    fn name(&self) -> &'static str {
        "profile page scrape"
    }

    fn timeout(&self) -> Duration {
        SCRAPE_TIMEOUT
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!(
            "{}/user.aspx?username={}",
            self.client.endpoints.www,
            urlencoding::encode(username)
        );
        let html = self.client.get_text(&url).await?;
        let id = scrape_first(&html, &PROFILE_ID_PATTERNS)
            .ok_or_else(|| not_found("user id in profile page"))?;
        Ok(RobloxIdentity::new(id, username))
    }
}

struct FriendsSearch {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for FriendsSearch {
    fn name(&self) -> &'static str {
        "friends search"
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!(
            "{}/v1/users/search?keyword={}&limit=10",
            self.client.endpoints.friends,
            urlencoding::encode(username)
        );
        let body = self.client.get_json(&url).await?;
        pick_search_result(&body, username, true).ok_or_else(|| not_found("search results"))
    }
}

struct CachedByUsername {
    cache: SharedIdentityCache,
}

#[async_trait]
impl Strategy<RobloxIdentity> for CachedByUsername {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        self.cache
            .by_username(username)
            .ok_or_else(|| not_found("cache entry"))
    }
}

struct PlaceholderId;

#[async_trait]
impl Strategy<RobloxIdentity> for PlaceholderId {
    fn name(&self) -> &'static str {
        PLACEHOLDER
    }

    async fn attempt(&self, username: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let id: u32 = rand::thread_rng().gen_range(10_000_000..=99_999_999);
        Ok(RobloxIdentity::new(id.to_string(), username))
    }
}

// ID → username strategies

struct UserById {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for UserById {
    fn name(&self) -> &'static str {
        "users v1"
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!("{}/v1/users/{}", self.client.endpoints.users, id);
        let body = self.client.get_json(&url).await?;
        let username = non_empty(body["name"].as_str()).ok_or_else(|| not_found("name"))?;
        Ok(RobloxIdentity::new(id, username))
    }
}

struct LegacyUserById {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for LegacyUserById {
    fn name(&self) -> &'static str {
        "legacy users"
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!("{}/users/{}", self.client.endpoints.api, id);
        let body = self.client.get_json(&url).await?;
        let username =
            non_empty(body["Username"].as_str()).ok_or_else(|| not_found("Username"))?;
        Ok(RobloxIdentity::new(id, username))
    }
}

struct ProfileHeader {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for ProfileHeader {
    fn name(&self) -> &'static str {
        "profile header"
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!(
            "{}/users/profile/profileheader-json?userId={}",
            self.client.endpoints.www, id
        );
        let body = self.client.get_json(&url).await?;
        let username =
            non_empty(body["Username"].as_str()).ok_or_else(|| not_found("Username"))?;
        Ok(RobloxIdentity::new(id, username))
    }
}

struct ProfilePageNameScrape {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for ProfilePageNameScrape {
    fn name(&self) -> &'static str {
        "profile page scrape"
    }

    fn timeout(&self) -> Duration {
        SCRAPE_TIMEOUT
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let url = format!("{}/users/{}/profile", self.client.endpoints.www, id);
        let html = self.client.get_text(&url).await?;
        let username = scrape_first(&html, &PROFILE_NAME_PATTERNS)
            .ok_or_else(|| not_found("username in profile page"))?;
        Ok(RobloxIdentity::new(id, username))
    }
}

struct BatchUsers {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RobloxIdentity> for BatchUsers {
    fn name(&self) -> &'static str {
        "users batch"
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        let numeric: u64 = id
            .parse()
            .map_err(|_| LookupError::Malformed(format!("'{}' is not numeric", id)))?;
        let url = format!("{}/v1/users", self.client.endpoints.users);
        let payload = json!({ "userIds": [numeric], "excludeBannedUsers": false });
        let body = self.client.post_for_json(&url, &payload).await?;
        let found = first_data_entry(&body).ok_or_else(|| not_found("data[0]"))?;
        Ok(RobloxIdentity::new(id, found.username))
    }
}

struct CachedById {
    cache: SharedIdentityCache,
}

#[async_trait]
impl Strategy<RobloxIdentity> for CachedById {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        self.cache.by_id(id).ok_or_else(|| not_found("cache entry"))
    }
}

struct PlaceholderUsername;

#[async_trait]
impl Strategy<RobloxIdentity> for PlaceholderUsername {
    fn name(&self) -> &'static str {
        PLACEHOLDER
    }

    async fn attempt(&self, id: &str) -> std::result::Result<RobloxIdentity, LookupError> {
        Ok(RobloxIdentity::new(id, format!("User_{}", id)))
    }
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && !username.chars().any(char::is_whitespace)
}

fn forward_well_formed(_username: &str, identity: &RobloxIdentity) -> bool {
    is_numeric_id(&identity.id) && !identity.username.trim().is_empty()
}

fn reverse_well_formed(id: &str, identity: &RobloxIdentity) -> bool {
    identity.id == id && !identity.username.trim().is_empty()
}

pub type RemoteStrategies = Vec<Box<dyn Strategy<RobloxIdentity>>>;

/// Resolves Roblox usernames to IDs and back
pub struct IdentityResolver {
    forward: StrategyChain<RobloxIdentity>,
    reverse: StrategyChain<RobloxIdentity>,
    cache: SharedIdentityCache,
}

impl IdentityResolver {
    pub fn new(client: RobloxClient, cache: SharedIdentityCache) -> Self {
        let client = Arc::new(client);
        let forward: RemoteStrategies = vec![
            Box::new(LegacyUsernameLookup {
                client: client.clone(),
            }),
            Box::new(UserSearch {
                client: client.clone(),
            }),
            Box::new(AvatarUsernames {
                client: client.clone(),
            }),
            Box::new(ProfilePageIdScrape {
                client: client.clone(),
            }),
            Box::new(FriendsSearch {
                client: client.clone(),
            }),
        ];
        let reverse: RemoteStrategies = vec![
            Box::new(UserById {
                client: client.clone(),
            }),
            Box::new(LegacyUserById {
                client: client.clone(),
            }),
            Box::new(ProfileHeader {
                client: client.clone(),
            }),
            Box::new(ProfilePageNameScrape {
                client: client.clone(),
            }),
            Box::new(BatchUsers { client }),
        ];
        Self::with_remote_strategies(forward, reverse, cache)
    }

    /// Build a resolver from custom remote strategies; the cache and
    /// placeholder fallbacks are always appended
    pub fn with_remote_strategies(
        forward: RemoteStrategies,
        reverse: RemoteStrategies,
        cache: SharedIdentityCache,
    ) -> Self {
        let mut forward_chain =
            StrategyChain::new("username→id").validated_by(forward_well_formed);
        for strategy in forward {
            forward_chain.push(strategy);
        }
        forward_chain.push(Box::new(CachedByUsername {
            cache: cache.clone(),
        }));
        forward_chain.push(Box::new(PlaceholderId));

        let mut reverse_chain = StrategyChain::new("id→username").validated_by(reverse_well_formed);
        for strategy in reverse {
            reverse_chain.push(strategy);
        }
        reverse_chain.push(Box::new(CachedById {
            cache: cache.clone(),
        }));
        reverse_chain.push(Box::new(PlaceholderUsername));

        Self {
            forward: forward_chain,
            reverse: reverse_chain,
            cache,
        }
    }

    pub fn cache(&self) -> &SharedIdentityCache {
        &self.cache
    }

    /// Resolve a username to its Roblox identity
    pub async fn resolve_handle_to_id(&self, username: &str) -> Result<RobloxIdentity> {
        let username = username.trim();
        if !is_valid_username(username) {
            return Err(BotError::InvalidUsername {
                username: username.to_string(),
            });
        }

        let success = self
            .forward
            .run(username)
            .await
            .map_err(|e| BotError::Resolution {
                input: username.to_string(),
                message: e.to_string(),
            })?;

        if success.name == PLACEHOLDER {
            warn!(
                "No Roblox lookup succeeded for '{}', using placeholder ID {}",
                username, success.value.id
            );
        } else {
            info!(
                "Resolved Roblox username '{}' to ID {} via #{} {}",
                username, success.value.id, success.index, success.name
            );
        }

        self.cache.insert(&success.value);
        Ok(success.value)
    }

    /// Resolve a Roblox user ID to its current identity
    pub async fn resolve_id_to_handle(&self, id: &str) -> Result<RobloxIdentity> {
        let id = id.trim();
        if !is_numeric_id(id) {
            return Err(BotError::InvalidRobloxId { id: id.to_string() });
        }

        let success = self
            .reverse
            .run(id)
            .await
            .map_err(|e| BotError::Resolution {
                input: id.to_string(),
                message: e.to_string(),
            })?;

        if success.name == PLACEHOLDER {
            warn!(
                "No Roblox lookup succeeded for ID {}, using placeholder username",
                id
            );
        } else {
            info!(
                "Resolved Roblox ID {} to '{}' via #{} {}",
                id, success.value.username, success.index, success.name
            );
        }

        self.cache.insert(&success.value);
        Ok(success.value)
    }
}

pub type SharedResolver = Arc<IdentityResolver>;

pub fn create_shared_resolver(resolver: IdentityResolver) -> SharedResolver {
    Arc::new(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roblox::cache::create_shared_identity_cache;

    struct Unreachable;

    #[async_trait]
    impl Strategy<RobloxIdentity> for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn attempt(&self, _input: &str) -> std::result::Result<RobloxIdentity, LookupError> {
            Err(LookupError::Transport("connection refused".to_string()))
        }
    }

    struct Known(RobloxIdentity);

    #[async_trait]
    impl Strategy<RobloxIdentity> for Known {
        fn name(&self) -> &'static str {
            "known"
        }

        async fn attempt(&self, _input: &str) -> std::result::Result<RobloxIdentity, LookupError> {
            Ok(self.0.clone())
        }
    }

    fn unreachable_x5() -> RemoteStrategies {
        (0..5)
            .map(|_| Box::new(Unreachable) as Box<dyn Strategy<RobloxIdentity>>)
            .collect()
    }

    fn offline_resolver() -> IdentityResolver {
        IdentityResolver::with_remote_strategies(
            unreachable_x5(),
            unreachable_x5(),
            create_shared_identity_cache(),
        )
    }

    #[tokio::test]
    async fn test_offline_resolution_still_returns_an_id() {
        let resolver = offline_resolver();
        let identity = resolver.resolve_handle_to_id("Alice").await.unwrap();

        assert_eq!(identity.username, "Alice");
        assert_eq!(identity.id.len(), 8);
        assert!(identity.id.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_offline_round_trip_goes_through_cache() {
        let resolver = offline_resolver();
        let forward = resolver.resolve_handle_to_id("Alice").await.unwrap();
        let back = resolver.resolve_id_to_handle(&forward.id).await.unwrap();

        assert_eq!(back.username, "Alice");
        assert_eq!(back, forward);
    }

    #[tokio::test]
    async fn test_unknown_id_gets_placeholder_username() {
        let resolver = offline_resolver();
        let identity = resolver.resolve_id_to_handle("424242").await.unwrap();
        assert_eq!(identity.username, "User_424242");
    }

    #[tokio::test]
    async fn test_remote_result_is_cached() {
        let cache = create_shared_identity_cache();
        let resolver = IdentityResolver::with_remote_strategies(
            vec![Box::new(Known(RobloxIdentity::new("156", "Builderman")))],
            vec![],
            cache.clone(),
        );

        let identity = resolver.resolve_handle_to_id("builderman").await.unwrap();
        assert_eq!(identity.id, "156");
        assert_eq!(cache.by_id("156").unwrap().username, "Builderman");

        // Reverse direction has no remote strategies, so this must come from the cache
        let back = resolver.resolve_id_to_handle("156").await.unwrap();
        assert_eq!(back.username, "Builderman");
    }

    #[tokio::test]
    async fn test_reverse_result_for_other_id_is_rejected() {
        let resolver = IdentityResolver::with_remote_strategies(
            vec![],
            vec![Box::new(Known(RobloxIdentity::new("1", "Roblox")))],
            create_shared_identity_cache(),
        );

        let identity = resolver.resolve_id_to_handle("2").await.unwrap();
        assert_eq!(identity.username, "User_2");
    }

    #[tokio::test]
    async fn test_malformed_input_is_rejected() {
        let resolver = offline_resolver();
        assert!(matches!(
            resolver.resolve_handle_to_id("   ").await,
            Err(BotError::InvalidUsername { .. })
        ));
        assert!(matches!(
            resolver.resolve_handle_to_id("two words").await,
            Err(BotError::InvalidUsername { .. })
        ));
        assert!(matches!(
            resolver.resolve_id_to_handle("12ab").await,
            Err(BotError::InvalidRobloxId { .. })
        ));
    }

    #[test]
    fn test_parse_legacy_user() {
        let body = json!({"Id": 156, "Username": "Builderman", "AvatarUri": null});
        assert_eq!(
            parse_legacy_user(&body),
            Some(RobloxIdentity::new("156", "Builderman"))
        );
        assert_eq!(parse_legacy_user(&json!({"success": false})), None);
    }

    #[test]
    fn test_search_prefers_exact_match() {
        let body = json!({"data": [
            {"id": 1, "name": "alice_fan", "displayName": "Alice"},
            {"id": 2, "name": "Alice", "displayName": "Al"}
        ]});
        assert_eq!(pick_search_result(&body, "alice", false).unwrap().id, "2");
        assert_eq!(pick_search_result(&body, "nobody", false).unwrap().id, "1");
        assert_eq!(pick_search_result(&json!({"data": []}), "alice", false), None);
    }

    #[test]
    fn test_friends_search_matches_display_name() {
        let body = json!({"data": [
            {"id": 7, "name": "someone", "displayName": "x"},
            {"id": 8, "name": "other", "displayName": "TargetName"}
        ]});
        assert_eq!(pick_search_result(&body, "targetname", true).unwrap().id, "8");
    }

    #[test]
    fn test_scrape_profile_id_tries_patterns_in_order() {
        let html = r#"<a href="/user/profile/99">x</a><div data-userid="12345"></div>"#;
        assert_eq!(
            scrape_first(html, &PROFILE_ID_PATTERNS),
            Some("12345".to_string())
        );
        assert_eq!(
            scrape_first("<a href=\"/users/x?UserId=77\">", &PROFILE_ID_PATTERNS),
            Some("77".to_string())
        );
        assert_eq!(scrape_first("<html></html>", &PROFILE_ID_PATTERNS), None);
    }

    #[test]
    fn test_scrape_profile_name() {
        let html = "<html><head><title>Builderman's Profile - Roblox</title></head></html>";
        assert_eq!(
            scrape_first(html, &PROFILE_NAME_PATTERNS),
            Some("Builderman".to_string())
        );

        let html = r#"<h1 class="profile-name" title="Roblox"> Roblox </h1>"#;
        assert_eq!(
            scrape_first(html, &PROFILE_NAME_PATTERNS),
            Some("Roblox".to_string())
        );
    }
}
