//! Domain extraction and relaxed alignment.
//!
//! "Relaxed" alignment is the DMARC notion: two domains align when they are
//! equal or one is a dotted suffix of the other (mail.example.com aligns
//! with example.com). Used for From vs Return-Path, Reply-To, and the
//! SPF/DKIM/DMARC alignment checks.

use crate::auth_results::{AuthSignals, AuthVerdict};
use crate::report::{Check, CheckStatus};
use regex::Regex;

/// Extract the domain of the first email address in a header value, from
/// angle-bracket or bare form, lower-cased.
pub fn domain_of(header_value: &str) -> Option<String> {
    // Compiled per call; header values are short and this path is cold.
    let re = Regex::new(r"@([A-Za-z0-9.-]+\.[A-Za-z]{2,})").unwrap();
    re.captures(header_value).map(|c| c[1].to_lowercase())
}

/// True iff the domains are equal or one is a dotted suffix of the other.
/// Empty on either side is never aligned.
pub fn relaxed_align(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a == b || a.ends_with(&format!(".{b}")) || b.ends_with(&format!(".{a}"))
}

/// Last two labels of a domain (example.com for mail.example.com). Good
/// enough to tolerate selector sub-domains in DKIM identities; public
/// suffix handling is out of scope for a triage aid.
pub fn registrable_suffix(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        domain.to_lowercase()
    } else {
        labels[labels.len() - 2..].join(".").to_lowercase()
    }
}

/// Alignment findings for one message.
pub struct AlignmentEvaluator {
    pub from_domain: Option<String>,
    pub return_domain: Option<String>,
    pub reply_domain: Option<String>,
}

impl AlignmentEvaluator {
    pub fn new(from: &str, return_path: &str, reply_to: &str) -> Self {
        Self {
            from_domain: domain_of(from),
            return_domain: domain_of(return_path),
            reply_domain: domain_of(reply_to),
        }
    }

    /// The five alignment checks, in canonical order fragments used by the
    /// orchestrator: from_vs_return and reply_to go out early, the three
    /// align_* checks close the report.
    pub fn from_vs_return_check(&self) -> Check {
        match (&self.from_domain, &self.return_domain) {
            (Some(f), Some(r)) if !relaxed_align(f, r) => Check::new(
                "from_vs_return",
                "From vs Return-Path",
                CheckStatus::Warn,
                format!("{f} vs {r}"),
            ),
            // Missing sides are indeterminate, not penalized.
            _ => Check::new(
                "from_vs_return",
                "From vs Return-Path",
                CheckStatus::Good,
                self.from_domain.clone().unwrap_or_else(|| "—".into()),
            ),
        }
    }

    /// True when From and Return-Path are both present and do not align.
    /// This is the score-bearing condition; a missing side is neutral.
    pub fn sender_mismatch(&self) -> bool {
        matches!(
            (&self.from_domain, &self.return_domain),
            (Some(f), Some(r)) if !relaxed_align(f, r)
        )
    }

    pub fn reply_to_check(&self) -> Check {
        match (&self.reply_domain, &self.from_domain) {
            (Some(r), Some(f)) if !relaxed_align(r, f) => Check::new(
                "reply_to",
                "Reply-To domain",
                CheckStatus::Warn,
                format!("{r} (≠ {f})"),
            ),
            (Some(r), _) => Check::new("reply_to", "Reply-To domain", CheckStatus::Good, r.clone()),
            (None, _) => Check::new(
                "reply_to",
                "Reply-To domain",
                CheckStatus::Info,
                "not present",
            ),
        }
    }

    /// SPF aligns when the verdict passed and Return-Path sits in the From
    /// domain tree.
    pub fn spf_aligned(&self, signals: &AuthSignals) -> bool {
        signals.spf == AuthVerdict::Pass
            && match (&self.return_domain, &self.from_domain) {
                (Some(r), Some(f)) => relaxed_align(r, f),
                _ => false,
            }
    }

    /// DKIM aligns when the verdict passed and any signing domain aligns
    /// with the From domain or its registrable suffix (selector
    /// sub-domains like s1.dkim.example.com still count).
    pub fn dkim_aligned(&self, signals: &AuthSignals) -> bool {
        if signals.dkim != AuthVerdict::Pass {
            return false;
        }
        let Some(from) = &self.from_domain else {
            return false;
        };
        let suffix = registrable_suffix(from);
        signals
            .dkim_domains
            .iter()
            .any(|d| relaxed_align(d, from) || relaxed_align(d, &suffix))
    }

    pub fn alignment_checks(&self, signals: &AuthSignals) -> Vec<Check> {
        let spf_ok = self.spf_aligned(signals);
        let dkim_ok = self.dkim_aligned(signals);
        let from = self.from_domain.as_deref().unwrap_or("?");
        let ret = self.return_domain.as_deref().unwrap_or("?");

        vec![
            Check::new(
                "align_spf",
                "SPF alignment",
                if spf_ok { CheckStatus::Good } else { CheckStatus::Warn },
                format!("{ret} vs {from}"),
            ),
            Check::new(
                "align_dkim",
                "DKIM alignment",
                if dkim_ok { CheckStatus::Good } else { CheckStatus::Warn },
                from.to_string(),
            ),
            // DMARC needs only one of the two identifiers to align.
            Check::new(
                "align_dmarc",
                "DMARC alignment",
                if spf_ok || dkim_ok { CheckStatus::Good } else { CheckStatus::Warn },
                if spf_ok || dkim_ok { "aligned" } else { "no aligned identifier" },
            ),
        ]
    }
}
