pub mod challenge;
pub mod matcher;
pub mod types;

pub use challenge::{
    create_shared_challenge_store, spawn_sweeper, ChallengeKind, SharedChallengeStore,
};
pub use matcher::ProfileMatcher;
#[cfg(test)]
pub use types::NoopSync;
pub use types::{ConfirmOutcome, IdentitySync, SyncReport, UpdateOutcome, VerifyPrompt};
