//! Received-chain forensics.
//!
//! Every relay hop prepends its own `Received:` header, so the chain reads
//! newest-first from the top of the block. The analyzer extracts per-hop
//! origin IPs and timestamps, flags private/non-routable origins and
//! suspicious HELO/EHLO greetings, and verifies that hop timestamps do not
//! run backwards.

use crate::headers::HeaderStore;
use crate::report::{Check, CheckStatus};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::net::Ipv4Addr;

/// One relay hop, in document order (index 0 = most recent).
#[derive(Debug, Clone)]
pub struct ReceivedHop {
    pub ip: Option<Ipv4Addr>,
    pub is_private: bool,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

pub struct ChainAnalyzer {
    bracket_ip_re: Regex,
    from_ip_re: Regex,
    helo_re: Regex,
    comment_re: Regex,
    dotted_quad_re: Regex,
}

/// Headers where more than one occurrence is itself a forgery signal.
const UNIQUE_HEADERS: [&str; 5] = ["From", "Subject", "To", "Date", "Message-ID"];

impl ChainAnalyzer {
    pub fn new() -> Self {
        Self {
            bracket_ip_re: Regex::new(r"\[(\d{1,3}(?:\.\d{1,3}){3})\]").unwrap(),
            from_ip_re: Regex::new(r"(?i)\bfrom\b.*?\b(\d{1,3}(?:\.\d{1,3}){3})").unwrap(),
            helo_re: Regex::new(r"(?i)\b(?:HELO|EHLO)[=\s]+(\[[^\]]*\]|[^\s;()]+)").unwrap(),
            comment_re: Regex::new(r"\([^)]*\)\s*$").unwrap(),
            dotted_quad_re: Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").unwrap(),
        }
    }

    /// Parse all `Received` instances into hops, newest first.
    pub fn parse_hops(&self, store: &HeaderStore) -> Vec<ReceivedHop> {
        store
            .get_all("Received")
            .iter()
            .map(|value| {
                let ip = self.extract_ip(value);
                ReceivedHop {
                    is_private: ip.map(is_private_or_loopback).unwrap_or(false),
                    timestamp: self.extract_timestamp(value),
                    ip,
                }
            })
            .collect()
    }

    fn extract_ip(&self, received: &str) -> Option<Ipv4Addr> {
        let candidate = self
            .bracket_ip_re
            .captures(received)
            .or_else(|| self.from_ip_re.captures(received))
            .map(|c| c[1].to_string())?;
        candidate.parse().ok()
    }

    /// Timestamp is the text after the last `;`, with any trailing
    /// `(comment)` such as `(PST)` stripped before RFC 2822 parsing.
    fn extract_timestamp(&self, received: &str) -> Option<DateTime<FixedOffset>> {
        let tail = received.rsplit(';').next()?.trim();
        let cleaned = self.comment_re.replace(tail, "");
        DateTime::parse_from_rfc2822(cleaned.trim()).ok()
    }

    /// The `received_chain` check: warn on a private/loopback origin (the
    /// oldest hop is the boundary closest to the sender), good for any
    /// non-empty public chain, info when no Received headers exist.
    pub fn chain_check(&self, hops: &[ReceivedHop]) -> Check {
        let origin = hops.last();
        match origin {
            Some(hop) if hop.is_private => {
                let ip = hop.ip.map(|i| i.to_string()).unwrap_or_default();
                log::debug!("Received chain originates from private address {ip}");
                Check::new(
                    "received_chain",
                    "Received chain",
                    CheckStatus::Warn,
                    format!("{} hops; private origin {ip}", hops.len()),
                )
            }
            Some(hop) => {
                let ip = hop
                    .ip
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "?".to_string());
                Check::new(
                    "received_chain",
                    "Received chain",
                    CheckStatus::Good,
                    format!("{} hops; origin {ip}", hops.len()),
                )
            }
            None => Check::new(
                "received_chain",
                "Received chain",
                CheckStatus::Info,
                "no Received headers",
            ),
        }
    }

    /// The `helo` check over the raw header corpus: a greeting of
    /// `localhost`, a bracketed literal, or a bare dotted-quad is the mark
    /// of a poorly configured or deliberately anonymous sender.
    pub fn helo_check(&self, raw: &str) -> Check {
        let greetings: Vec<String> = self
            .helo_re
            .captures_iter(raw)
            .map(|c| c[1].to_lowercase())
            .collect();

        if greetings.is_empty() {
            return Check::new("helo", "HELO/EHLO", CheckStatus::Info, "not found");
        }

        let suspicious = greetings.iter().any(|g| {
            g == "localhost" || g.starts_with('[') || self.dotted_quad_re.is_match(g)
        });

        Check::new(
            "helo",
            "HELO/EHLO",
            if suspicious { CheckStatus::Warn } else { CheckStatus::Good },
            greetings.join(", "),
        )
    }

    /// The `time` check: traversed from the oldest hop to the newest, hop
    /// timestamps must be non-decreasing. Fewer than two parseable
    /// timestamps is indeterminate.
    pub fn time_check(&self, hops: &[ReceivedHop]) -> Check {
        let stamps: Vec<DateTime<FixedOffset>> =
            hops.iter().filter_map(|h| h.timestamp).collect();

        if stamps.len() < 2 {
            return Check::new(
                "time",
                "Received timestamps",
                CheckStatus::Info,
                if stamps.is_empty() { "none parsed".to_string() } else { "1 timestamp".to_string() },
            );
        }

        // Document order is newest-first; walk oldest-to-newest.
        let monotonic = stamps.windows(2).all(|pair| pair[0] >= pair[1]);
        Check::new(
            "time",
            "Received timestamps",
            if monotonic { CheckStatus::Good } else { CheckStatus::Warn },
            format!("{} timestamps", stamps.len()),
        )
    }

    /// The `dups` check over uniqueness-sensitive headers.
    pub fn duplicates_check(&self, store: &HeaderStore) -> Check {
        let dups: Vec<String> = UNIQUE_HEADERS
            .iter()
            .filter_map(|name| {
                let count = store.count(name);
                (count > 1).then(|| format!("{name}×{count}"))
            })
            .collect();

        if dups.is_empty() {
            Check::new("dups", "Duplicate headers", CheckStatus::Good, "none")
        } else {
            Check::new(
                "dups",
                "Duplicate headers",
                CheckStatus::Warn,
                dups.join(", "),
            )
        }
    }
}

impl Default for ChainAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_private_or_loopback(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback()
}
