//! Interactive input used by authentication and confirmations.
//!
//! Prompts are blocking calls. An error from the prompter (closed stdin,
//! Ctrl-C) aborts the current operation; it is never retried silently.

use promptmgr_core::SecretString;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

/// Source of passwords and yes/no answers.
pub trait Prompter: Send + Sync {
    /// Read a password without echoing it.
    fn read_password(&self, prompt: &str) -> io::Result<SecretString>;

    /// Ask a yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, question: &str) -> io::Result<bool>;

    /// Show a status line to the user.
    fn message(&self, text: &str);
}

/// A prompter that replays pre-recorded answers.
///
/// Used for non-interactive runs and tests. Running out of passwords behaves
/// like a closed terminal; running out of confirmations answers "no".
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    passwords: Mutex<VecDeque<String>>,
    confirmations: Mutex<VecDeque<bool>>,
    password_prompts: Mutex<usize>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue passwords, answered in order.
    pub fn with_passwords<I, S>(self, passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_passwords(passwords);
        self
    }

    /// Queue yes/no answers, answered in order.
    pub fn with_confirmations(self, answers: impl IntoIterator<Item = bool>) -> Self {
        lock(&self.confirmations).extend(answers);
        self
    }

    /// Queue more passwords after construction.
    pub fn push_passwords<I, S>(&self, passwords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.passwords).extend(passwords.into_iter().map(Into::into));
    }

    /// How many times a password was asked for.
    pub fn password_prompts(&self) -> usize {
        *lock(&self.password_prompts)
    }

    /// Passwords still queued.
    pub fn remaining_passwords(&self) -> usize {
        lock(&self.passwords).len()
    }

    /// Messages shown so far.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn read_password(&self, _prompt: &str) -> io::Result<SecretString> {
        *lock(&self.password_prompts) += 1;
        lock(&self.passwords)
            .pop_front()
            .map(SecretString::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted password left"))
    }

    fn confirm(&self, _question: &str) -> io::Result<bool> {
        Ok(lock(&self.confirmations).pop_front().unwrap_or(false))
    }

    fn message(&self, text: &str) {
        lock(&self.messages).push(text.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
