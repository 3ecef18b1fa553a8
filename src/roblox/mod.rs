pub mod cache;
pub mod chain;
pub mod client;
pub mod profile;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use cache::create_shared_identity_cache;
pub use client::RobloxClient;
pub use profile::{ProfileSource, RobloxProfileSource};
pub use resolver::{create_shared_resolver, IdentityResolver, SharedResolver};

/// A Roblox account: stable numeric ID plus its current username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobloxIdentity {
    pub id: String,
    pub username: String,
}

impl RobloxIdentity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}
