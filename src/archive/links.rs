//! Candidate URL construction for round logs.

use crate::pipeline::round::DatedRound;
use chrono::Datelike;

pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://tgstation13.download";
pub const PLAIN_LOG_TEMPLATE: &str =
    "{base}/parsed-logs/{server}/data/logs/{year}/{month}/{day}/round-{round_id}/game.txt";
pub const AUTHENTICATED_LOG_TEMPLATE: &str =
    "{base}/raw-logs/{server}/data/logs/{year}/{month}/{day}/round-{round_id}/game.log";

/// Servers whose archive directory was renamed after the round list was recorded.
const SERVER_RENAMES: &[(&str, &str)] = &[("bagil", "basil")];

/// Builds the ordered list of archive URLs that may hold a round's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolver {
    base_url: String,
    plain_template: String,
    authenticated_template: String,
    authenticated: bool,
}

impl LinkResolver {
    pub fn new(base_url: impl Into<String>, authenticated: bool) -> Self {
        Self::with_templates(
            base_url,
            PLAIN_LOG_TEMPLATE,
            AUTHENTICATED_LOG_TEMPLATE,
            authenticated,
        )
    }

    pub fn with_templates(
        base_url: impl Into<String>,
        plain_template: impl Into<String>,
        authenticated_template: impl Into<String>,
        authenticated: bool,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            plain_template: plain_template.into(),
            authenticated_template: authenticated_template.into(),
            authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns the candidate URLs for `round`, most preferred first. Never empty.
    ///
    /// A session sees the raw-log location first with the public parsed log as fallback;
    /// anonymous callers only get the public location.
    pub fn resolve(&self, round: &DatedRound<'_>) -> Vec<String> {
        let mut candidates = Vec::with_capacity(2);
        if self.authenticated {
            candidates.push(self.render(&self.authenticated_template, round));
        }
        let plain = self.render(&self.plain_template, round);
        if !candidates.contains(&plain) {
            candidates.push(plain);
        }
        candidates
    }

    fn render(&self, template: &str, round: &DatedRound<'_>) -> String {
        let date = round.archive_date();
        template
            .replace("{base}", &self.base_url)
            .replace("{server}", &archive_server_name(&round.round().server))
            .replace("{year}", &date.year().to_string())
            .replace("{month}", &format!("{:02}", date.month()))
            .replace("{day}", &format!("{:02}", date.day()))
            .replace("{round_id}", &round.round().round_id.to_string())
    }
}

/// Lower-cases a server name and applies historical directory renames.
pub fn archive_server_name(server: &str) -> String {
    let mut name = server.to_lowercase();
    for (old, new) in SERVER_RENAMES {
        if name.contains(old) {
            name = name.replace(old, new);
        }
    }
    name
}
