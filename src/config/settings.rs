use std::time::Duration;

use tracing::warn;

/// Runtime settings for the bot, read from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Discord user allowed to run admin commands and admin API calls
    pub admin_user_id: Option<String>,

    /// Directory for the JSON state snapshot
    pub state_path: String,

    /// Prefix for text commands (e.g. `!verify`)
    pub command_prefix: String,

    /// Per-user, per-command cooldown
    pub command_cooldown: Duration,

    /// How long a verification code stays valid
    pub challenge_ttl: Duration,

    /// How often expired codes are swept
    pub sweep_interval: Duration,

    pub roblox: RobloxSettings,
}

/// Settings for talking to Roblox
#[derive(Debug, Clone)]
pub struct RobloxSettings {
    /// `.ROBLOSECURITY` cookie used for authenticated lookups
    pub cookie: Option<String>,
    pub user_agent: String,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_user_id: None,
            state_path: "state".to_string(),
            command_prefix: "!".to_string(),
            command_cooldown: Duration::from_millis(3_000),
            challenge_ttl: Duration::from_millis(600_000),
            sweep_interval: Duration::from_millis(60_000),
            roblox: RobloxSettings::default(),
        }
    }
}

impl Default for RobloxSettings {
    fn default() -> Self {
        Self {
            cookie: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Create settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let admin_user_id = std::env::var("ADMIN_USER_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if admin_user_id.is_none() {
            warn!("ADMIN_USER_ID not set: admin commands and admin API endpoints are disabled");
        }

        Self {
            admin_user_id,
            state_path: std::env::var("STATE_PATH").unwrap_or(defaults.state_path),
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            command_cooldown: env_millis("COMMAND_COOLDOWN_MS").unwrap_or(defaults.command_cooldown),
            challenge_ttl: env_secs("CHALLENGE_TTL_SECS").unwrap_or(defaults.challenge_ttl),
            sweep_interval: env_secs("CHALLENGE_SWEEP_SECS").unwrap_or(defaults.sweep_interval),
            roblox: RobloxSettings {
                cookie: std::env::var("ROBLOX_COOKIE").ok().filter(|s| !s.is_empty()),
                user_agent: std::env::var("ROBLOX_USER_AGENT")
                    .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            },
        }
    }

    /// Whether the given Discord user is the configured bot admin
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_id.as_deref() == Some(user_id)
    }

    pub fn linked_accounts_path(&self) -> String {
        format!("{}/verifier.json", self.state_path)
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    parse_positive_duration(key, std::env::var(key).ok(), Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    parse_positive_duration(key, std::env::var(key).ok(), Duration::from_secs)
}

/// Zero and malformed values fall back to the default
fn parse_positive_duration(
    key: &str,
    raw: Option<String>,
    to_duration: fn(u64) -> Duration,
) -> Option<Duration> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            warn!("{} must be greater than zero, using the default", key);
            None
        }
        Ok(value) => Some(to_duration(value)),
        Err(_) => {
            warn!("{} is not a whole number ({:?}), using the default", key, raw);
            None
        }
    }
}
