pub mod admin;
pub mod checks;
pub mod general;
pub mod verification;

pub use admin::{allowid, disallowid};
pub use checks::command_gate;
pub use general::{help, ping};
pub use verification::{confirm, reverify, update, verify};
