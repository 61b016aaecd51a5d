//! Raw header block parsing.
//!
//! Email headers are a loosely structured line protocol: a header starts on a
//! line whose first character is not whitespace and that contains a colon;
//! any immediately following whitespace-led lines are folded continuations of
//! its value. The store keeps headers in original order, supports repeated
//! names (`Received` appears once per relay hop), and never fails on
//! malformed input — absence simply yields empty results.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct HeaderStore {
    /// (original name, unfolded value) in document order.
    entries: Vec<(String, String)>,
    /// Occurrence count per lower-cased name.
    counts: HashMap<String, usize>,
    raw: String,
}

impl HeaderStore {
    /// Parse the header block of a raw message. Only the text up to the
    /// first blank line is considered; if no blank line exists the whole
    /// input is treated as headers.
    pub fn parse(raw: &str) -> Self {
        let block = header_block(raw);

        let mut entries: Vec<(String, String)> = Vec::new();
        for line in block.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let first = line.chars().next().unwrap_or(' ');
            if first == ' ' || first == '\t' {
                // Continuation of the current header; stray continuations
                // before any header are discarded.
                if let Some((_, value)) = entries.last_mut() {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(trimmed);
                    }
                }
            } else if let Some(colon) = line.find(':') {
                if colon > 0 {
                    let name = line[..colon].trim().to_string();
                    let value = line[colon + 1..].trim().to_string();
                    entries.push((name, value));
                }
            }
            // Lines with no colon and no header context are noise; skip.
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for (name, _) in &entries {
            *counts.entry(name.to_lowercase()).or_insert(0) += 1;
        }

        Self {
            entries,
            counts,
            raw: block.to_string(),
        }
    }

    /// First value for a header name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| n.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header name in document order (top of the block
    /// first). Needed for `Received`, where each hop is its own instance.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let lower = name.to_lowercase();
        self.entries
            .iter()
            .filter(|(n, _)| n.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// How many times a header name occurs, case-insensitive.
    pub fn count(&self, name: &str) -> usize {
        self.counts.get(&name.to_lowercase()).copied().unwrap_or(0)
    }

    /// The header block as received, for the report's `raw` field.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Slice off everything after the first blank line (the body separator).
fn header_block(raw: &str) -> &str {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(idx) = raw.find(sep) {
            return &raw[..idx];
        }
    }
    raw
}
