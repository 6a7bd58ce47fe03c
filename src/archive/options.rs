//! Configurable knobs for the archive HTTP client along with validation helpers.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("roundlogs/", env!("CARGO_PKG_VERSION"));
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ArchiveClientOptions {
    /// Upper bound for one candidate attempt, body included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Forum session id. Selects the authenticated link template when present.
    pub session_credential: Option<String>,
}

impl Default for ArchiveClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            session_credential: None,
        }
    }
}

impl ArchiveClientOptions {
    pub fn is_authenticated(&self) -> bool {
        self.session_credential.is_some()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        if self.user_agent.trim().is_empty() {
            bail!("user_agent cannot be empty");
        }
        if let Some(credential) = &self.session_credential {
            if credential.trim().is_empty() {
                bail!("session_credential cannot be blank when provided");
            }
        }
        Ok(())
    }
}
