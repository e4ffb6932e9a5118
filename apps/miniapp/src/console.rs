use std::{io::Write as _, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use client_core::ConfirmationPrompt;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::Mutex,
};

/// Stdin shared by the command loop and the confirmation prompt.
pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(io::stdin()).lines()))
}

pub async fn next_line(lines: &SharedLines) -> Result<Option<String>> {
    lines
        .lock()
        .await
        .next_line()
        .await
        .context("failed to read stdin")
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "д" | "да"
    )
}

pub struct StdinConfirmation {
    lines: SharedLines,
}

impl StdinConfirmation {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl ConfirmationPrompt for StdinConfirmation {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        print!("{prompt} [y/N] ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let answer = next_line(&self.lines).await?;
        // EOF declines.
        Ok(answer.as_deref().is_some_and(is_affirmative))
    }
}
