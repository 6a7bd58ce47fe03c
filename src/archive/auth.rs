//! Session headers shared by every archive request.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};

pub const SESSION_COOKIE_NAME: &str = "tgforums_sid";

pub(crate) fn build_session_headers(
    user_agent: &str,
    session_credential: Option<&str>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(user_agent).context("failed to build User-Agent header")?;
    headers.insert(USER_AGENT, agent);

    if let Some(credential) = session_credential {
        let mut cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={credential}"))
            .context("failed to build session cookie header")?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);
    }
    Ok(headers)
}
