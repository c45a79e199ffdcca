//! Inbound email hygiene: sender parsing, HTML fallback, reply stripping.

use regex::Regex;

use crate::{AppError, Result};

/// Compiled patterns used on every inbound email.
///
/// Built once at startup and shared by the pipeline.
#[derive(Debug, Clone)]
pub struct ContentRules {
    quoted_line: Regex,
    blank_run: Regex,
    html_tag: Regex,
    html_break: Regex,
    address: Regex,
}

impl ContentRules {
    /// Compile the content patterns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| AppError::Config(format!("invalid content pattern: {err}")))
        };

        Ok(Self {
            quoted_line: compile(r"(?m)^>.*$")?,
            blank_run: compile(r"\n{3,}")?,
            html_tag: compile(r"(?s)<[^>]*>")?,
            html_break: compile(r"(?i)<br\s*/?>|</p\s*>|</div\s*>")?,
            address: compile(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
        })
    }

    /// Drop quoted-reply lines, collapse 3+ newlines to one blank line, trim.
    #[must_use]
    pub fn normalize(&self, body: &str) -> String {
        let body = body.replace("\r\n", "\n");
        let unquoted = self.quoted_line.replace_all(&body, "");
        let collapsed = self.blank_run.replace_all(&unquoted, "\n\n");
        collapsed.trim().to_owned()
    }

    /// Plain-text rendition of an HTML body.
    #[must_use]
    pub fn strip_html(&self, html: &str) -> String {
        let with_breaks = self.html_break.replace_all(html, "\n");
        let text = self.html_tag.replace_all(&with_breaks, "");
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    /// Bare address from a `sender` value such as `Jane <jane@x.com>`.
    ///
    /// Returns `None` when the result is not a plausible address.
    #[must_use]
    pub fn sender_address(&self, sender: &str) -> Option<String> {
        let trimmed = sender.trim();
        let candidate = match (trimmed.rfind('<'), trimmed.rfind('>')) {
            (Some(open), Some(close)) if open < close => &trimmed[open + 1..close],
            _ => trimmed,
        };
        let candidate = candidate.trim();
        self.address
            .is_match(candidate)
            .then(|| candidate.to_owned())
    }

    /// Whether `email` is a plausible bare address.
    #[must_use]
    pub fn is_valid_address(&self, email: &str) -> bool {
        self.address.is_match(email)
    }
}
