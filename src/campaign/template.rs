//! Message template rendering.
//!
//! `{{column}}` tokens naming a header column are replaced with the row's value;
//! any other token is kept as written.

use crate::error::{BotError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;

#[allow(clippy::unwrap_used)]
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

/// Campaign message text, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    text: String,
}

impl MessageTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BotError::TemplateRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { text })
    }

    /// Fill the template for one row. `columns` and `values` are positional.
    pub fn render(&self, columns: &[String], values: &[String]) -> String {
        render(&self.text, columns, values)
    }

    /// Placeholder names used by the template that no column provides.
    pub fn unknown_placeholders(&self, columns: &[String]) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(&self.text)
            .map(|caps| caps[1].to_string())
            .filter(|name| !columns.contains(name))
            .collect()
    }
}

pub fn render(template: &str, columns: &[String], values: &[String]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            columns
                .iter()
                .position(|c| c == &caps[1])
                .and_then(|i| values.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
