use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_PRIVATE_KEY_PATH: &str = "the-cla.pem";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DATABASE_FILE: &str = "cla-signatures.db";

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    /// The CLA version every pull request author must have signed.
    pub cla_version: String,
    pub github_api_url: String,
    pub port: u16,
    /// Directory holding the signature database.
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let github_app_id = var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = match var("GITHUB_PRIVATE_KEY") {
            Some(key) => key.replace("\\n", "\n"),
            None => {
                let path = var("GITHUB_PRIVATE_KEY_PATH")
                    .unwrap_or_else(|| DEFAULT_PRIVATE_KEY_PATH.to_string());
                std::fs::read_to_string(&path).with_context(|| {
                    format!(
                        "GITHUB_PRIVATE_KEY is unset and the key file {} could not be read",
                        path
                    )
                })?
            }
        };

        let github_webhook_secret = var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let cla_version = var("CLA_VERSION")
            .filter(|s| !s.trim().is_empty())
            .context("CLA_VERSION environment variable is required")?;

        let github_api_url =
            var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            cla_version,
            github_api_url,
            port,
            state_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}
