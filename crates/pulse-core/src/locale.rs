//! Locale-aware integer grouping for display strings.
//!
//! Cached epidemic figures are stored in their human-readable form
//! ("1,234,567" or "1.234.567"), so reading them back means undoing the
//! same grouping convention.

/// Thousands-grouping convention for one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLocale {
    grouping: char,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self { grouping: ',' }
    }
}

impl NumberLocale {
    pub fn new(grouping: char) -> Self {
        Self { grouping }
    }

    /// Pick the grouping separator for a tag like `de_DE` or `fr-CA`.
    pub fn from_tag(tag: &str) -> Self {
        let mut parts = tag.split(['_', '-', '.']);
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        let region = parts.next().unwrap_or_default().to_ascii_uppercase();

        if region == "CH" || region == "LI" {
            return Self::new('\'');
        }

        let grouping = match language.as_str() {
            "de" | "it" | "es" | "nl" | "pt" | "id" | "da" | "tr" | "el" | "ro" | "sl"
            | "hr" | "sr" | "vi" => '.',
            "fr" | "ru" | "pl" | "cs" | "sk" | "uk" | "fi" | "sv" | "nb" | "no" | "hu"
            | "bg" | "lt" | "lv" | "et" => '\u{a0}',
            _ => ',',
        };
        Self::new(grouping)
    }

    pub fn grouping(&self) -> char {
        self.grouping
    }

    /// Format `value` with a separator every three digits.
    pub fn format(&self, value: i64) -> String {
        let digits = value.unsigned_abs().to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
        if value < 0 {
            out.push('-');
        }
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(self.grouping);
            }
            out.push(ch);
        }
        out
    }

    /// Parse a string produced by [`NumberLocale::format`].
    ///
    /// Returns `None` for anything that isn't a grouped integer, which
    /// callers must tolerate since cached fields are not type-checked.
    pub fn parse(&self, text: &str) -> Option<i64> {
        let cleaned: String = text
            .trim()
            .chars()
            .filter(|c| *c != self.grouping)
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse().ok()
    }
}
