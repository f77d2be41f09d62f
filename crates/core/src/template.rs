//! Minimal renderer for stored email templates.
//!
//! Templates reference context values as `$name` or `${name}`. A reference
//! with no value is left untouched, unless written in the quiet form
//! (`$!name` / `$!{name}`), which renders as an empty string.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::notification::NotificationContext;

/// Matches `$name`, `${name}`, `$!name` and `$!{name}`.
const REFERENCE_PATTERN: &str =
    r"\$(!?)(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))";

static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REFERENCE_PATTERN).expect("valid regex"));

/// Substitute context values into `template`.
pub fn render(template: &str, context: &NotificationContext) -> String {
    REFERENCE_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let quiet = !caps[1].is_empty();
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();

            match context.get(name) {
                Some(value) => value.to_string(),
                None if quiet => String::new(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
