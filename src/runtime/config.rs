use crate::archive::links::{
    AUTHENTICATED_LOG_TEMPLATE, DEFAULT_ARCHIVE_BASE_URL, PLAIN_LOG_TEMPLATE,
};
use crate::archive::options::DEFAULT_USER_AGENT;
use crate::pipeline::coordinator::DEFAULT_MAX_BUFFERED_MB;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OUTPUT_PATH: &str = "logs.log";
const ROUND_ID_PLACEHOLDER: &str = "{round_id}";

/// Runtime configuration for a round log download.
///
/// All instances must be constructed via [`DownloaderConfig::builder`] or
/// [`DownloaderConfig::new`] so invariants are validated before any consumer observes the
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    archive_base_url: String,
    session_credential: Option<String>,
    user_agent: String,
    output_path: PathBuf,
    request_timeout: Duration,
    max_buffered_mb: usize,
    plain_template: String,
    authenticated_template: String,
}

pub struct DownloaderConfigParams {
    pub archive_base_url: String,
    pub session_credential: Option<String>,
    pub user_agent: String,
    pub output_path: PathBuf,
    pub request_timeout: Duration,
    pub max_buffered_mb: usize,
    pub plain_template: String,
    pub authenticated_template: String,
}

impl DownloaderConfig {
    /// Returns a builder where every field starts at its default.
    pub fn builder() -> DownloaderConfigBuilder {
        DownloaderConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: DownloaderConfigParams) -> Result<Self> {
        let DownloaderConfigParams {
            archive_base_url,
            session_credential,
            user_agent,
            output_path,
            request_timeout,
            max_buffered_mb,
            plain_template,
            authenticated_template,
        } = params;

        let config = Self {
            archive_base_url: trimmed_string(archive_base_url),
            session_credential: session_credential
                .map(trimmed_string)
                .filter(|credential| !credential.is_empty()),
            user_agent: trimmed_string(user_agent),
            output_path,
            request_timeout,
            max_buffered_mb,
            plain_template,
            authenticated_template,
        };

        config.validate()?;
        Ok(config)
    }

    /// Archive root, scheme included.
    pub fn archive_base_url(&self) -> &str {
        &self.archive_base_url
    }

    /// Forum session id, if the user logged in.
    pub fn session_credential(&self) -> Option<&str> {
        self.session_credential.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// File the runner writes to when the caller supplies no path.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Upper bound for a single candidate request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Maximum megabytes of fetched logs held while waiting for an earlier round.
    pub fn max_buffered_mb(&self) -> usize {
        self.max_buffered_mb
    }

    pub fn plain_template(&self) -> &str {
        &self.plain_template
    }

    pub fn authenticated_template(&self) -> &str {
        &self.authenticated_template
    }

    /// Returns a copy carrying `credential`, revalidated.
    pub fn with_session_credential(&self, credential: Option<String>) -> Result<Self> {
        let mut params = self.to_params();
        params.session_credential = credential;
        Self::new(params)
    }

    fn to_params(&self) -> DownloaderConfigParams {
        DownloaderConfigParams {
            archive_base_url: self.archive_base_url.clone(),
            session_credential: self.session_credential.clone(),
            user_agent: self.user_agent.clone(),
            output_path: self.output_path.clone(),
            request_timeout: self.request_timeout,
            max_buffered_mb: self.max_buffered_mb,
            plain_template: self.plain_template.clone(),
            authenticated_template: self.authenticated_template.clone(),
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.archive_base_url)?;
        ensure_not_empty(&self.user_agent, "user_agent")?;

        if self.output_path.as_os_str().is_empty() {
            bail!("output_path cannot be empty");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.max_buffered_mb == 0 {
            bail!("max_buffered_mb must be greater than 0");
        }

        ensure_template(&self.plain_template, "plain_template")?;
        ensure_template(&self.authenticated_template, "authenticated_template")?;

        Ok(())
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_owned(),
            session_credential: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_buffered_mb: DEFAULT_MAX_BUFFERED_MB,
            plain_template: PLAIN_LOG_TEMPLATE.to_owned(),
            authenticated_template: AUTHENTICATED_LOG_TEMPLATE.to_owned(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DownloaderConfigBuilder {
    archive_base_url: Option<String>,
    session_credential: Option<String>,
    user_agent: Option<String>,
    output_path: Option<PathBuf>,
    request_timeout: Option<Duration>,
    max_buffered_mb: Option<usize>,
    plain_template: Option<String>,
    authenticated_template: Option<String>,
}

impl DownloaderConfigBuilder {
    pub fn archive_base_url(mut self, url: impl Into<String>) -> Self {
        self.archive_base_url = Some(url.into());
        self
    }

    pub fn session_credential(mut self, credential: impl Into<String>) -> Self {
        self.session_credential = Some(credential.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_buffered_mb(mut self, megabytes: usize) -> Self {
        self.max_buffered_mb = Some(megabytes);
        self
    }

    pub fn plain_template(mut self, template: impl Into<String>) -> Self {
        self.plain_template = Some(template.into());
        self
    }

    pub fn authenticated_template(mut self, template: impl Into<String>) -> Self {
        self.authenticated_template = Some(template.into());
        self
    }

    pub fn build(self) -> Result<DownloaderConfig> {
        let defaults = DownloaderConfig::default();
        let params = DownloaderConfigParams {
            archive_base_url: self.archive_base_url.unwrap_or(defaults.archive_base_url),
            session_credential: self.session_credential,
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            output_path: self.output_path.unwrap_or(defaults.output_path),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_buffered_mb: self.max_buffered_mb.unwrap_or(defaults.max_buffered_mb),
            plain_template: self.plain_template.unwrap_or(defaults.plain_template),
            authenticated_template: self
                .authenticated_template
                .unwrap_or(defaults.authenticated_template),
        };

        DownloaderConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn ensure_template(template: &str, field: &str) -> Result<()> {
    if !template.contains(ROUND_ID_PLACEHOLDER) {
        bail!("{field} must contain the {ROUND_ID_PLACEHOLDER} placeholder");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("archive_base_url must start with http:// or https://");
    }
    Ok(())
}
