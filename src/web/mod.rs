//! Dashboard API served alongside the Discord bot
//!
//! Exposes servers, linked accounts, approval requests, counters and the
//! captured log stream as JSON.

mod api;
mod server;

pub use api::ApiState;
pub use server::{start_web_server, WebServerConfig};
