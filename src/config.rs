use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::api::Credential;
use crate::util::is_local_endpoint_url;

const API_URL_ENV: &str = "AGENTDECK_API_URL";
const TOKEN_ENV: &str = "AGENTDECK_TOKEN";
const TOKEN_FILE_ENV: &str = "AGENTDECK_TOKEN_FILE";
const REQUEST_TIMEOUT_ENV: &str = "AGENTDECK_REQUEST_TIMEOUT_SECS";
const LIST_POLL_ENV: &str = "AGENTDECK_LIST_POLL_SECS";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIST_POLL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub credential: Option<Credential>,
    pub request_timeout: Duration,
    pub list_poll_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var(API_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let credential = match std::env::var(TOKEN_ENV).ok().and_then(Credential::new) {
            Some(credential) => Some(credential),
            None => match std::env::var(TOKEN_FILE_ENV) {
                Ok(path) if !path.trim().is_empty() => read_token_file(Path::new(path.trim()))?,
                _ => None,
            },
        };

        Ok(Self {
            api_url,
            credential,
            request_timeout: Duration::from_secs(env_secs(
                REQUEST_TIMEOUT_ENV,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            list_poll_interval: Duration::from_secs(env_secs(
                LIST_POLL_ENV,
                DEFAULT_LIST_POLL_SECS,
            )?),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid {API_URL_ENV} '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.credential.is_none() {
            bail!(
                "{TOKEN_ENV} or {TOKEN_FILE_ENV} must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.request_timeout.is_zero() {
            bail!("{REQUEST_TIMEOUT_ENV} must be greater than zero");
        }

        if self.list_poll_interval.is_zero() {
            bail!("{LIST_POLL_ENV} must be greater than zero");
        }

        Ok(())
    }

    fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

pub fn read_token_file(path: &Path) -> Result<Option<Credential>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading credential file {}", path.display()))?;
    Ok(Credential::new(contents))
}

fn env_secs(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a whole number of seconds, got '{value}'")),
        _ => Ok(default),
    }
}
