pub mod database;
pub mod models;
pub mod store;

pub use models::{
    ApprovalRequest, ApprovalStatus, BotStats, LinkedAccount, NewApprovalRequest, NewServer,
    Server,
};
pub use store::{create_shared_storage, FileStore, SharedStorage};
