use super::round::RoundDescriptor;
use console::{Color, StyledObject};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;

const PROGRESS_TEMPLATE: &str = "{msg} {wide_bar} {pos}/{len} [{elapsed_precise}<{eta_precise}]";

/// Advisory notice about a single round. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Missing { server: String, round_id: u64 },
    RoundStartSuicide { server: String, round_id: u64 },
}

impl Diagnostic {
    pub fn missing(round: &RoundDescriptor) -> Self {
        Diagnostic::Missing {
            server: round.server.clone(),
            round_id: round.round_id,
        }
    }

    pub fn round_start_suicide(round: &RoundDescriptor) -> Self {
        Diagnostic::RoundStartSuicide {
            server: round.server.clone(),
            round_id: round.round_id,
        }
    }

    pub fn round_id(&self) -> u64 {
        match self {
            Diagnostic::Missing { round_id, .. } | Diagnostic::RoundStartSuicide { round_id, .. } => {
                *round_id
            }
        }
    }

    pub fn server(&self) -> &str {
        match self {
            Diagnostic::Missing { server, .. } | Diagnostic::RoundStartSuicide { server, .. } => {
                server
            }
        }
    }

    /// Terminal color of the notice: yellow for a missing log, magenta for a suicide.
    pub fn color(&self) -> Color {
        match self {
            Diagnostic::Missing { .. } => Color::Yellow,
            Diagnostic::RoundStartSuicide { .. } => Color::Magenta,
        }
    }

    /// The notice text colored for stderr. Styling is dropped when stderr is not a terminal.
    pub fn styled(&self) -> StyledObject<String> {
        console::style(self.to_string()).fg(self.color()).for_stderr()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Missing { server, round_id } => {
                write!(f, "WARNING: Could not find round {round_id} on {server}")
            }
            Diagnostic::RoundStartSuicide { server, round_id } => {
                write!(
                    f,
                    "NOTICE: round start suicide in round {round_id} on {server}"
                )
            }
        }
    }
}

/// Progress bar plus the status channel for per-round diagnostics.
///
/// Diagnostics are printed above the bar so they never tear the progress line.
#[derive(Clone)]
pub struct RoundProgress {
    bar: ProgressBar,
}

impl RoundProgress {
    /// Terminal progress drawn on stderr.
    pub fn stderr(total_rounds: usize) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(total_rounds as u64),
            ProgressDrawTarget::stderr_with_hz(12),
        );
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            bar.set_style(style);
        }
        Self { bar }
    }

    /// Progress that draws nothing; diagnostics still reach `tracing`.
    pub fn hidden(total_rounds: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_rounds as u64);
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn start_round(&self, round: &RoundDescriptor) {
        self.bar.set_message(format!(
            "Getting ID {} on {}",
            round.round_id, round.server
        ));
    }

    pub fn finish_round(&self) {
        self.bar.inc(1);
    }

    pub fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Missing { server, round_id } => {
                tracing::warn!(server = %server, round_id, "could not find round log");
            }
            Diagnostic::RoundStartSuicide { server, round_id } => {
                tracing::info!(server = %server, round_id, "round start suicide");
            }
        }
        self.bar.println(diagnostic.styled().to_string());
    }

    pub fn finish_with_message(&self, message: &'static str) {
        self.bar.finish_with_message(message);
    }
}
