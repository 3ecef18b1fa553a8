use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::chain::{Strategy, StrategyChain};
use super::client::{LookupError, RawResponse, RobloxClient};

const PROFILE_TIMEOUT: Duration = Duration::from_secs(8);

/// Where profile documents come from
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the profile document for a user
    ///
    /// Any HTTP response counts as fetched, whatever its status. Errors mean
    /// no endpoint could be reached.
    async fn fetch_profile(&self, user_id: &str) -> Result<RawResponse, LookupError>;

    /// Status line from the profile header, if the user has one
    async fn fetch_status(&self, user_id: &str) -> Result<Option<String>, LookupError>;
}

struct UsersEndpoint {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RawResponse> for UsersEndpoint {
    fn name(&self) -> &'static str {
        "users v1"
    }

    fn timeout(&self) -> Duration {
        PROFILE_TIMEOUT
    }

    async fn attempt(&self, user_id: &str) -> Result<RawResponse, LookupError> {
        let url = format!("{}/v1/users/{}", self.client.endpoints.users, user_id);
        self.client.get(&url).await
    }
}

struct ProfilePage {
    client: Arc<RobloxClient>,
}

#[async_trait]
impl Strategy<RawResponse> for ProfilePage {
    fn name(&self) -> &'static str {
        "profile page"
    }

    fn timeout(&self) -> Duration {
        PROFILE_TIMEOUT
    }

    async fn attempt(&self, user_id: &str) -> Result<RawResponse, LookupError> {
        let url = format!("{}/users/{}/profile", self.client.endpoints.www, user_id);
        self.client.get(&url).await
    }
}

/// Profile documents fetched live from Roblox
pub struct RobloxProfileSource {
    client: Arc<RobloxClient>,
    chain: StrategyChain<RawResponse>,
}

impl RobloxProfileSource {
    pub fn new(client: RobloxClient) -> Self {
        let client = Arc::new(client);
        let chain = StrategyChain::new("profile")
            .with(UsersEndpoint {
                client: client.clone(),
            })
            .with(ProfilePage {
                client: client.clone(),
            });
        Self { client, chain }
    }
}

#[async_trait]
impl ProfileSource for RobloxProfileSource {
    async fn fetch_profile(&self, user_id: &str) -> Result<RawResponse, LookupError> {
        self.chain
            .run(user_id)
            .await
            .map(|success| success.value)
            .map_err(|e| LookupError::Transport(e.to_string()))
    }

    async fn fetch_status(&self, user_id: &str) -> Result<Option<String>, LookupError> {
        let url = format!(
            "{}/users/profile/profileheader-json?userId={}",
            self.client.endpoints.www, user_id
        );
        let body = tokio::time::timeout(PROFILE_TIMEOUT, self.client.get_json(&url))
            .await
            .map_err(|_| LookupError::Timeout(PROFILE_TIMEOUT))??;
        Ok(header_status(&body))
    }
}

/// `ProfileStatus`, else `UserStatus`, from the profile header JSON
pub fn header_status(body: &Value) -> Option<String> {
    ["ProfileStatus", "UserStatus"].iter().find_map(|key| {
        body[*key]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_status_key_order() {
        let both = json!({"ProfileStatus": "primary", "UserStatus": "secondary"});
        assert_eq!(header_status(&both), Some("primary".to_string()));

        let fallback = json!({"ProfileStatus": "", "UserStatus": "VERIFY-123456-7890"});
        assert_eq!(header_status(&fallback), Some("VERIFY-123456-7890".to_string()));

        assert_eq!(header_status(&json!({"Username": "x"})), None);
    }
}
