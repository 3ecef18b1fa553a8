pub mod cooldown_manager;
pub mod nickname_sync;
pub mod permission_checker;
pub mod verification_manager;

pub use cooldown_manager::{create_shared_cooldown_manager, SharedCooldownManager};
pub use nickname_sync::NicknameSync;
pub use permission_checker::run_startup_permission_check;
pub use verification_manager::{
    create_shared_verification_manager, SharedVerificationManager, VerificationManager,
};
