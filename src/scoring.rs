//! Risk scoring.
//!
//! Additive penalties over mutually exclusive rules, clamped to [0, 100].
//! The weights mirror how much each signal, on its own, should move a
//! message toward the malicious threshold: a failed SPF plus failed DKIM
//! plus failed DMARC crosses it without any other evidence.

use crate::alignment::AlignmentEvaluator;
use crate::auth_results::{AuthSignals, AuthVerdict};
use crate::report::{Check, CheckStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub spf_failure: u32,
    pub dkim_failure: u32,
    pub dmarc_failure: u32,
    pub sender_mismatch: u32,
    pub suspicious_subject: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            spf_failure: 35,
            dkim_failure: 30,
            dmarc_failure: 25,
            sender_mismatch: 20,
            suspicious_subject: 10,
        }
    }
}

/// Subject tokens that correlate with credential-phishing lures, matched as
/// case-insensitive substrings (covers inflections: "verifica", "verified").
pub fn default_subject_keywords() -> Vec<String> {
    [
        "urgent", "urgente", "verify", "verifica", "cuenta", "banco", "paypal",
        "contraseña", "password", "suspend", "suspendida", "invoice", "factura",
        "pago", "transferencia", "ganaste", "premio",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub struct RiskScorer {
    weights: ScoringWeights,
    subject_keywords: Vec<String>,
}

impl RiskScorer {
    pub fn new(weights: ScoringWeights, subject_keywords: Vec<String>) -> Self {
        Self {
            weights,
            subject_keywords,
        }
    }

    /// The spf/dkim/dmarc verdict checks. PASS is good, an unreported
    /// mechanism is info, anything else is bad. DKIM details carry the
    /// signing domains when known.
    pub fn auth_checks(&self, signals: &AuthSignals) -> Vec<Check> {
        let status_of = |v: AuthVerdict| match v {
            AuthVerdict::Pass => CheckStatus::Good,
            AuthVerdict::Unknown => CheckStatus::Info,
            _ => CheckStatus::Bad,
        };

        let dkim_details = if signals.dkim_domains.is_empty() {
            signals.dkim.to_string()
        } else {
            format!("{} ({})", signals.dkim, signals.dkim_domains.join(", "))
        };

        vec![
            Check::new(
                "spf",
                "SPF (Auth-Results)",
                status_of(signals.spf),
                signals.spf.to_string(),
            ),
            Check::new(
                "dkim",
                "DKIM (Auth-Results)",
                status_of(signals.dkim),
                dkim_details,
            ),
            Check::new(
                "dmarc",
                "DMARC (Auth-Results)",
                status_of(signals.dmarc),
                signals.dmarc.to_string(),
            ),
        ]
    }

    /// The `subject` check plus whether it is score-bearing.
    pub fn subject_check(&self, subject: &str) -> (Check, bool) {
        let lower = subject.to_lowercase();
        let matched = !subject.is_empty()
            && self
                .subject_keywords
                .iter()
                .any(|kw| lower.contains(&kw.to_lowercase()));

        let check = if matched {
            let shown: String = subject.chars().take(120).collect();
            Check::new("subject", "Subject wording", CheckStatus::Warn, shown)
        } else {
            Check::new("subject", "Subject wording", CheckStatus::Good, "—")
        };
        (check, matched)
    }

    /// Total penalty, clamped to [0, 100].
    pub fn score(
        &self,
        signals: &AuthSignals,
        alignment: &AlignmentEvaluator,
        subject_matched: bool,
    ) -> u32 {
        let mut score: u32 = 0;
        if signals.spf.is_failing() {
            score += self.weights.spf_failure;
        }
        if signals.dkim.is_failing() {
            score += self.weights.dkim_failure;
        }
        if signals.dmarc.is_failing() {
            score += self.weights.dmarc_failure;
        }
        if alignment.sender_mismatch() {
            score += self.weights.sender_mismatch;
        }
        if subject_matched {
            score += self.weights.suspicious_subject;
        }
        score.min(100)
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), default_subject_keywords())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(spf: AuthVerdict, dkim: AuthVerdict, dmarc: AuthVerdict) -> AuthSignals {
        AuthSignals {
            spf,
            dkim,
            dmarc,
            dkim_domains: vec![],
            dkim_selectors: vec![],
        }
    }

    #[test]
    fn test_all_failures_cross_malicious_threshold() {
        let scorer = RiskScorer::default();
        let s = signals(AuthVerdict::Fail, AuthVerdict::Fail, AuthVerdict::Fail);
        let alignment = AlignmentEvaluator::new("a@x.com", "b@y.com", "");
        let score = scorer.score(&s, &alignment, false);
        assert_eq!(score, 100); // 35+30+25+20 clamped
        assert!(score >= 70);
    }

    #[test]
    fn test_none_penalized_like_fail() {
        let scorer = RiskScorer::default();
        let s = signals(AuthVerdict::None, AuthVerdict::Unknown, AuthVerdict::Unknown);
        let alignment = AlignmentEvaluator::new("", "", "");
        assert_eq!(scorer.score(&s, &alignment, false), 35);
    }

    #[test]
    fn test_softfail_and_unknown_carry_no_penalty() {
        let scorer = RiskScorer::default();
        let s = signals(AuthVerdict::SoftFail, AuthVerdict::Unknown, AuthVerdict::Neutral);
        let alignment = AlignmentEvaluator::new("", "", "");
        assert_eq!(scorer.score(&s, &alignment, false), 0);
    }

    #[test]
    fn test_clean_message_scores_under_ten() {
        let scorer = RiskScorer::default();
        let s = signals(AuthVerdict::Pass, AuthVerdict::Pass, AuthVerdict::Pass);
        let alignment = AlignmentEvaluator::new("a@example.com", "a@example.com", "");
        assert!(scorer.score(&s, &alignment, false) < 10);
    }

    #[test]
    fn test_subject_keyword_match() {
        let scorer = RiskScorer::default();
        let (check, matched) = scorer.subject_check("URGENTE: verifica tu cuenta");
        assert!(matched);
        assert_eq!(check.status, CheckStatus::Warn);

        let (check, matched) = scorer.subject_check("Weekly team notes");
        assert!(!matched);
        assert_eq!(check.status, CheckStatus::Good);

        let (_, matched) = scorer.subject_check("");
        assert!(!matched);
    }

    #[test]
    fn test_auth_check_statuses() {
        let scorer = RiskScorer::default();
        let s = signals(AuthVerdict::Pass, AuthVerdict::Fail, AuthVerdict::Unknown);
        let checks = scorer.auth_checks(&s);
        assert_eq!(checks[0].status, CheckStatus::Good);
        assert_eq!(checks[1].status, CheckStatus::Bad);
        assert_eq!(checks[2].status, CheckStatus::Info);
        assert_eq!(checks[2].details, "?");
    }

    #[test]
    fn test_dkim_details_include_domains() {
        let scorer = RiskScorer::default();
        let mut s = signals(AuthVerdict::Pass, AuthVerdict::Pass, AuthVerdict::Pass);
        s.dkim_domains = vec!["example.com".to_string()];
        let checks = scorer.auth_checks(&s);
        assert!(checks[1].details.contains("example.com"));
    }
}
