use std::collections::VecDeque;
use std::io::{self, BufRead, Stdout, StdinLock, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

/// Yes/no gate in front of every destructive step.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Asks on a terminal-style stream pair; `y`/`yes` in any case is the only approval.
pub struct PromptConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptConfirm<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.output, "{question} (y/n): ").context("failed to write prompt")?;
        self.output.flush().context("failed to flush prompt")?;
        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .context("failed to read confirmation")?;
        if read == 0 {
            return Ok(false);
        }
        Ok(is_affirmative(&answer))
    }
}

/// Approves everything; used for `--yes`.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!(question, "auto-confirmed");
        Ok(true)
    }
}

/// Pre-recorded answers, consumed in order. Asking past the end is an error.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.asked.push(question.to_string());
        match self.answers.pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("no scripted answer for: {question}"),
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_ascii_lowercase();
    answer == "y" || answer == "yes"
}
