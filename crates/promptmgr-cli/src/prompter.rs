//! Terminal implementation of [`Prompter`].

use console::style;
use promptmgr_core::SecretString;
use promptmgr_secrets::Prompter;
use std::io::{self, BufRead, Write};

/// Hidden password entry via `rpassword`, confirmations on stdin, messages on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_password(&self, prompt: &str) -> io::Result<SecretString> {
        rpassword::prompt_password(prompt).map(SecretString::new)
    }

    fn confirm(&self, question: &str) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{question} [y/N]: ")?;
        stderr.flush()?;

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        Ok(is_yes(&answer))
    }

    fn message(&self, text: &str) {
        eprintln!("{}", style(text).cyan());
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Read a secret value without echo.
pub fn prompt_value(name: &str) -> anyhow::Result<String> {
    rpassword::prompt_password(format!("Enter value for '{name}': "))
        .map_err(|e| anyhow::anyhow!("Failed to read value: {}", e))
}
