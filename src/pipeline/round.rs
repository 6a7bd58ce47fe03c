use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// One completed round on a game server, as supplied by the round-list source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoundDescriptor {
    pub server: String,
    #[serde(rename = "roundID")]
    pub round_id: u64,
    /// ISO-8601 text; normalized once at the start of the round's fetch.
    pub timestamp: String,
    #[serde(rename = "roundStartSuicide", default)]
    pub round_start_suicide: bool,
}

impl RoundDescriptor {
    pub fn new(server: impl Into<String>, round_id: u64, timestamp: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            round_id,
            timestamp: timestamp.into(),
            round_start_suicide: false,
        }
    }

    pub fn with_round_start_suicide(mut self, flagged: bool) -> Self {
        self.round_start_suicide = flagged;
        self
    }

    /// Parses the textual timestamp into a [`DatedRound`].
    pub fn dated(&self) -> Result<DatedRound<'_>> {
        let timestamp = parse_iso_timestamp(&self.timestamp).with_context(|| {
            format!(
                "round {} on {} has an invalid timestamp",
                self.round_id, self.server
            )
        })?;
        Ok(DatedRound {
            round: self,
            timestamp,
        })
    }
}

/// A descriptor paired with its parsed timestamp. The offset written in the round list is
/// kept; timestamps without one are read as UTC.
#[derive(Debug, Clone, Copy)]
pub struct DatedRound<'a> {
    round: &'a RoundDescriptor,
    timestamp: DateTime<FixedOffset>,
}

impl<'a> DatedRound<'a> {
    pub fn round(&self) -> &'a RoundDescriptor {
        self.round
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Calendar date of the round in its own offset; the archive is laid out by it.
    pub fn archive_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Raw lines of a round's log, or the marker that no candidate produced one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundLog {
    Present(Vec<Bytes>),
    Absent,
}

impl RoundLog {
    pub fn is_absent(&self) -> bool {
        matches!(self, RoundLog::Absent)
    }

    /// Bytes retained while the outcome is parked waiting for an earlier round.
    pub fn queue_bytes(&self) -> usize {
        match self {
            RoundLog::Present(lines) => lines
                .iter()
                .map(|line| line.len().saturating_add(core::mem::size_of::<Bytes>()))
                .fold(0usize, usize::saturating_add),
            RoundLog::Absent => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    round: RoundDescriptor,
    log: RoundLog,
}

impl FetchOutcome {
    pub fn new(round: RoundDescriptor, log: RoundLog) -> Self {
        Self { round, log }
    }

    pub fn absent(round: RoundDescriptor) -> Self {
        Self::new(round, RoundLog::Absent)
    }

    pub fn round(&self) -> &RoundDescriptor {
        &self.round
    }

    pub fn log(&self) -> &RoundLog {
        &self.log
    }

    pub fn into_parts(self) -> (RoundDescriptor, RoundLog) {
        (self.round, self.log)
    }

    pub fn queue_bytes(&self) -> usize {
        let metadata_bytes = core::mem::size_of::<RoundDescriptor>()
            .saturating_add(self.round.server.len())
            .saturating_add(self.round.timestamp.len());
        metadata_bytes.saturating_add(self.log.queue_bytes())
    }
}

/// Splits a response body into lines, accepting both `\n` and `\r\n` terminators.
pub fn split_lines(body: Bytes) -> Vec<Bytes> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut start = 0usize;
    for (idx, byte) in body.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(trim_carriage_return(body.slice(start..idx)));
            start = idx + 1;
        }
    }
    if start < body.len() {
        lines.push(trim_carriage_return(body.slice(start..)));
    }
    lines
}

fn trim_carriage_return(line: Bytes) -> Bytes {
    match line.last() {
        Some(b'\r') => line.slice(..line.len() - 1),
        _ => line,
    }
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y%m%dT%H%M%S%.f%z",
    "%Y%m%dT%H%M%z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

fn parse_iso_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("timestamp is empty");
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed);
    }

    // `%z` does not take the `Z` designator.
    let zulu;
    let with_offset = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(stripped) => {
            zulu = format!("{stripped}+0000");
            zulu.as_str()
        }
        None => raw,
    };
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(with_offset, format) {
            return Ok(parsed);
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight.and_utc().fixed_offset());
            }
        }
    }

    bail!("unrecognised ISO-8601 timestamp {raw:?}")
}
