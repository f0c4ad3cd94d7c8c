//! Operator confirmation before an existing function is overwritten.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

pub trait OverwritePrompt {
    /// Ask whether `function_name` may be overwritten.
    fn confirm_overwrite(&self, function_name: &str) -> Result<bool>;
}

/// Reads the answer from standard input.
pub struct StdinPrompt;

impl OverwritePrompt for StdinPrompt {
    fn confirm_overwrite(&self, function_name: &str) -> Result<bool> {
        let mut stderr = io::stderr();
        write!(
            stderr,
            "Function '{}' already exists. Overwrite its code and configuration? [y/N] ",
            function_name
        )?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation from stdin")?;
        Ok(is_affirmative(&answer))
    }
}

/// `--yes`: never asks.
pub struct AssumeYes;

impl OverwritePrompt for AssumeYes {
    fn confirm_overwrite(&self, _function_name: &str) -> Result<bool> {
        Ok(true)
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
