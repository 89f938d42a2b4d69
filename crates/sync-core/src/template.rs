//! Template token resolution for new notes.
//!
//! Pure substitution over `{{token}}` placeholders. The engine never trusts
//! template output for identity fields; after rendering, a hydration step
//! re-writes the frontmatter contract (see the reconciler).
//!
//! Date tokens: `{{date}}`, `{{time}}`, and `{{date:FORMAT}}` /
//! `{{time:FORMAT}}` with chrono format strings. Unknown tokens are left
//! in place.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Token values for one note.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    tokens: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: &str, value: impl Into<String>) {
        self.tokens.insert(token.to_string(), value.into());
    }

    pub fn with(mut self, token: &str, value: impl Into<String>) -> Self {
        self.set(token, value);
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Resolve every `{{token}}` in `template`.
pub fn resolve(template: &str, now: DateTime<Utc>, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let token = after_open[..close].trim();
                match resolve_token(token, now, ctx) {
                    Some(value) => out.push_str(&value),
                    // Unknown token: keep the placeholder verbatim
                    None => {
                        out.push_str("{{");
                        out.push_str(&after_open[..close]);
                        out.push_str("}}");
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated braces: emit the remainder as-is
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_token(token: &str, now: DateTime<Utc>, ctx: &TemplateContext) -> Option<String> {
    if token == "date" {
        return Some(now.format("%Y-%m-%d").to_string());
    }
    if token == "time" {
        return Some(now.format("%H:%M").to_string());
    }
    if let Some(fmt) = token.strip_prefix("date:") {
        return Some(now.format(fmt).to_string());
    }
    if let Some(fmt) = token.strip_prefix("time:") {
        return Some(now.format(fmt).to_string());
    }
    ctx.get(token).map(str::to_string)
}
