use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // State errors
    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Record already exists: {kind} '{key}'")]
    Duplicate { kind: &'static str, key: String },

    // Verification errors
    #[error("Please provide your Roblox username.")]
    MissingUsername,

    #[error("'{username}' is not a valid Roblox username.")]
    InvalidUsername { username: String },

    #[error("'{id}' is not a valid Roblox user ID.")]
    InvalidRobloxId { id: String },

    #[error("You are already verified as {username}. If you need to change your account, use `/reverify` instead.")]
    AlreadyLinked { username: String },

    #[error("You are not verified yet. Please use `/verify` to link your Roblox account first.")]
    NotLinked,

    #[error("You don't have a pending verification. Use `/verify` to get a new code.")]
    NoPendingChallenge,

    #[error("A verification check is already running for your account. Please wait a moment.")]
    ConfirmationInProgress,

    #[error("Could not resolve Roblox identity for '{input}': {message}")]
    Resolution { input: String, message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Errors that are safe to show to the requester verbatim.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BotError::MissingUsername
                | BotError::InvalidUsername { .. }
                | BotError::InvalidRobloxId { .. }
                | BotError::AlreadyLinked { .. }
                | BotError::NotLinked
                | BotError::NoPendingChallenge
                | BotError::ConfirmationInProgress
        )
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_precondition_errors_are_user_facing() {
        assert!(BotError::NotLinked.is_user_facing());
        assert!(BotError::AlreadyLinked {
            username: "Alice".into()
        }
        .is_user_facing());
        assert!(!BotError::Duplicate {
            kind: "linked account",
            key: "U1".into()
        }
        .is_user_facing());
        assert!(!BotError::Internal {
            message: "boom".into()
        }
        .is_user_facing());
    }
}
