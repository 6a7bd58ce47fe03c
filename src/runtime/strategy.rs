use crate::pipeline::round::RoundDescriptor;
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::io::{BufRead, Write};

pub type RoundListFuture<'a> = BoxFuture<'a, Result<Vec<RoundDescriptor>>>;

const LOGIN_PROMPT: &str = "Would you like to log in? ";
const AFFIRMATIVE_ANSWERS: &[&str] = &["y", "yes", "true", "1"];

/// Selects which raw lines of a round survive into the output file.
pub trait LineFilter: Send + Sync {
    fn filter_lines(&self, lines: Vec<Bytes>) -> Vec<Bytes>;
}

impl<F> LineFilter for F
where
    F: Fn(Vec<Bytes>) -> Vec<Bytes> + Send + Sync,
{
    fn filter_lines(&self, lines: Vec<Bytes>) -> Vec<Bytes> {
        self(lines)
    }
}

/// Filter that keeps every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepAll;

impl LineFilter for KeepAll {
    fn filter_lines(&self, lines: Vec<Bytes>) -> Vec<Bytes> {
        lines
    }
}

/// Capability set of a concrete downloader: where the rounds come from, which lines to
/// keep, and how to obtain a session. The pipeline only ever talks to this trait.
pub trait LogDownloader: LineFilter + 'static {
    /// Produces the rounds to download, in output order.
    fn update_round_list(&mut self) -> RoundListFuture<'_>;

    /// Obtains a forum session credential. Anonymous by default.
    fn authenticate(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Asks whether to log in and, on an affirmative answer, calls [`Self::authenticate`].
    fn authenticate_interactive(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<Option<String>> {
        if !prompt_yes_no(input, output, LOGIN_PROMPT)? {
            return Ok(None);
        }
        self.authenticate()
    }

    /// Builds a downloader by asking the user for its settings.
    fn interactive(input: &mut dyn BufRead, output: &mut dyn Write) -> Result<Self>
    where
        Self: Sized;
}

/// Writes `prompt`, reads one line and reports whether it was an affirmative answer.
pub fn prompt_yes_no(input: &mut dyn BufRead, output: &mut dyn Write, prompt: &str) -> Result<bool> {
    let answer = prompt_line(input, output, prompt)?;
    let answer = answer.to_lowercase();
    Ok(AFFIRMATIVE_ANSWERS.contains(&answer.as_str()))
}

/// Writes `prompt` and returns the trimmed line typed in response.
pub fn prompt_line(input: &mut dyn BufRead, output: &mut dyn Write, prompt: &str) -> Result<String> {
    output
        .write_all(prompt.as_bytes())
        .and_then(|_| output.flush())
        .context("failed to write prompt")?;
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed to read answer")?;
    Ok(answer.trim().to_owned())
}
