pub mod settings;

pub use settings::{RobloxSettings, Settings};
