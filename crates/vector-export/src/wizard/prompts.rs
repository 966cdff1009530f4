//! Terminal prompts backed by dialoguer.

use console::Term;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};

use super::Prompter;
use crate::error::{Error, Result};

/// Prompts on the controlling terminal.
///
/// Without a terminal, questions that have a default take it and every
/// other question fails with a configuration error.
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
    attended: bool,
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl DialoguerPrompter {
    /// Creates a new prompter.
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
            attended: Term::stderr().is_term(),
        }
    }

    fn unattended(prompt: &str) -> Error {
        Error::Config(format!("no terminal to ask for '{prompt}'; pass it as a flag"))
    }
}

fn cancelled(e: dialoguer::Error) -> Error {
    Error::Config(format!("Input cancelled: {e}"))
}

impl Prompter for DialoguerPrompter {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        if !self.attended {
            return default
                .map(str::to_string)
                .ok_or_else(|| Self::unattended(prompt));
        }

        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(cancelled)
    }

    fn password(&self, prompt: &str) -> Result<String> {
        if !self.attended {
            return Err(Self::unattended(prompt));
        }

        Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(cancelled)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if !self.attended {
            return Ok(default);
        }

        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(cancelled)
    }
}
