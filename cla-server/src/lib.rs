pub mod config;
pub mod github;
pub mod middleware;
pub mod signature_store;
pub mod webhook;

use std::sync::Arc;

use cla_core::{SessionProvider, SignatureStore};

pub use github::{GitHubApp, InstallationClient};
pub use signature_store::SqliteSignatureStore;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_bot_version() -> String {
    // A hash injected by the packaging environment wins over the one `built` found
    let git_hash = option_env!("CLA_BOT_GIT_HASH").or(built_info::GIT_COMMIT_HASH);
    match git_hash {
        Some(hash) if hash.len() >= 8 => hash[..8].to_string(),
        Some(hash) => hash.to_string(),
        None => "unknown".to_string(),
    }
}

pub struct AppState {
    pub sessions: Arc<dyn SessionProvider>,
    pub signatures: Arc<dyn SignatureStore>,
    pub webhook_secret: String,
    pub cla_version: String,
}
