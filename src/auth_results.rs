//! Authentication-Results signal extraction.
//!
//! Reads the unfolded `Authentication-Results` value and derives SPF, DKIM
//! and DMARC verdicts plus the DKIM signing domains (`header.i=@...`) and
//! selectors (`header.s=...`) used later for alignment and DNS checks.

use regex::Regex;

/// Per-mechanism verdict as reported by a verifying MTA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    Pass,
    Fail,
    SoftFail,
    Neutral,
    None,
    TempError,
    PermError,
    Unknown,
}

impl AuthVerdict {
    fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "pass" => AuthVerdict::Pass,
            "fail" => AuthVerdict::Fail,
            "softfail" => AuthVerdict::SoftFail,
            "neutral" => AuthVerdict::Neutral,
            "none" => AuthVerdict::None,
            "temperror" => AuthVerdict::TempError,
            "permerror" => AuthVerdict::PermError,
            _ => AuthVerdict::Unknown,
        }
    }

    /// FAIL and NONE are the score-bearing outcomes.
    pub fn is_failing(&self) -> bool {
        matches!(self, AuthVerdict::Fail | AuthVerdict::None)
    }
}

impl std::fmt::Display for AuthVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthVerdict::Pass => "PASS",
            AuthVerdict::Fail => "FAIL",
            AuthVerdict::SoftFail => "SOFTFAIL",
            AuthVerdict::Neutral => "NEUTRAL",
            AuthVerdict::None => "NONE",
            AuthVerdict::TempError => "TEMPERROR",
            AuthVerdict::PermError => "PERMERROR",
            AuthVerdict::Unknown => "?",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct AuthSignals {
    pub spf: AuthVerdict,
    pub dkim: AuthVerdict,
    pub dmarc: AuthVerdict,
    /// Signing domains from `header.i=@domain`, lower-cased, in order seen.
    pub dkim_domains: Vec<String>,
    /// Selector names from `header.s=selector`, in order seen.
    pub dkim_selectors: Vec<String>,
}

impl AuthSignals {
    /// Scan an unfolded Authentication-Results value. A message relayed
    /// through several verifying hops can carry multiple verdicts per
    /// mechanism; PASS wins if any instance passed, otherwise the first
    /// verdict seen stands. An empty value yields all-Unknown.
    pub fn extract(auth_results: &str) -> Self {
        let extractor = Extractor::new();
        extractor.extract(auth_results)
    }
}

struct Extractor {
    verdict_re: Regex,
    domain_re: Regex,
    selector_re: Regex,
}

impl Extractor {
    fn new() -> Self {
        Self {
            verdict_re: Regex::new(
                r"(?i)\b(spf|dkim|dmarc)\s*=\s*(pass|fail|softfail|neutral|none|temperror|permerror)\b",
            )
            .unwrap(),
            domain_re: Regex::new(r"(?i)header\.i=\s*@([A-Za-z0-9.-]+\.[A-Za-z]{2,})").unwrap(),
            selector_re: Regex::new(r"(?i)header\.s=([A-Za-z0-9._-]+)").unwrap(),
        }
    }

    fn extract(&self, auth_results: &str) -> AuthSignals {
        let mut spf: Vec<AuthVerdict> = Vec::new();
        let mut dkim: Vec<AuthVerdict> = Vec::new();
        let mut dmarc: Vec<AuthVerdict> = Vec::new();

        for caps in self.verdict_re.captures_iter(auth_results) {
            let verdict = AuthVerdict::from_token(&caps[2]);
            match caps[1].to_lowercase().as_str() {
                "spf" => spf.push(verdict),
                "dkim" => dkim.push(verdict),
                "dmarc" => dmarc.push(verdict),
                _ => {}
            }
        }

        let dkim_domains = self
            .domain_re
            .captures_iter(auth_results)
            .map(|c| c[1].to_lowercase())
            .collect();
        let dkim_selectors = self
            .selector_re
            .captures_iter(auth_results)
            .map(|c| c[1].to_string())
            .collect();

        AuthSignals {
            spf: resolve(&spf),
            dkim: resolve(&dkim),
            dmarc: resolve(&dmarc),
            dkim_domains,
            dkim_selectors,
        }
    }
}

/// PASS if any hop passed, else the first verdict seen, else Unknown.
fn resolve(verdicts: &[AuthVerdict]) -> AuthVerdict {
    if verdicts.contains(&AuthVerdict::Pass) {
        AuthVerdict::Pass
    } else {
        verdicts.first().copied().unwrap_or(AuthVerdict::Unknown)
    }
}
