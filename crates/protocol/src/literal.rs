//! Literal-table rendering for hash-files.
//!
//! The check/decode scripts parse their input as a PowerShell hashtable
//! literal. The exact layout below (2-space indent growth per nesting
//! level, `;` between entries, no separator after the last entry) is a
//! wire contract with those scripts, not cosmetics.

use std::fmt::Write;

/// A value in a literal table: either a quoted string or a nested table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    Text(String),
    Table(LiteralTable),
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        LiteralValue::Text(s.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(s: String) -> Self {
        LiteralValue::Text(s)
    }
}

impl From<LiteralTable> for LiteralValue {
    fn from(t: LiteralTable) -> Self {
        LiteralValue::Table(t)
    }
}

/// An insertion-ordered string-keyed table.
///
/// Order matters: the rendered text must list entries in the same order
/// the manifest was built so remote output lines up with local state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralTable {
    entries: Vec<(String, LiteralValue)>,
}

impl LiteralTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Keys are not de-duplicated here; callers key by
    /// content hash which is unique by construction.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<LiteralValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Renders the table as a `@{ ... }` literal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_at(&mut out, 0);
        out
    }

    fn render_at(&self, out: &mut String, indent: usize) {
        out.push_str("@{\n");
        let inner = indent + 2;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            let _ = write!(out, "{:inner$}\"{}\" = ", "", escape(key));
            match value {
                LiteralValue::Text(s) => {
                    let _ = write!(out, "\"{}\"", escape(s));
                }
                LiteralValue::Table(t) => t.render_at(out, inner),
            }
            if i + 1 < self.entries.len() {
                out.push(';');
            }
            out.push('\n');
        }
        let _ = write!(out, "{:indent$}}}", "");
    }
}

/// Escapes a string for embedding in a double-quoted literal.
///
/// Backtick is the remote shell's escape character; `$` would trigger
/// variable expansion for anything but the deliberate `$env:` prefix.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '`' => out.push_str("``"),
            '"' => out.push_str("`\""),
            _ => out.push(c),
        }
    }
    out
}
