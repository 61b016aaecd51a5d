//! Analysis orchestrator.
//!
//! `analyze` is effectively a pure function of the raw message for a fixed
//! resolver: every entity is built fresh per invocation, the caller owns
//! the resulting Report, and nothing is cached across calls. Checks are
//! emitted in a canonical order so UIs and tests can index by key.

use crate::alignment::AlignmentEvaluator;
use crate::auth_results::AuthSignals;
use crate::body_analysis::{fuse_body_score, BodyAnalyzer, HttpBodyAnalyzer};
use crate::config::{Config, DnsTransport};
use crate::dns::{DnsResolver, DnsVerifier, DohResolver, SystemResolver};
use crate::headers::HeaderStore;
use crate::received::ChainAnalyzer;
use crate::report::{Check, CheckStatus, Classification, Report, Summary};
use crate::scoring::RiskScorer;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct Analyzer {
    config: Config,
    scorer: RiskScorer,
    chain: ChainAnalyzer,
    resolver: Option<Arc<dyn DnsResolver>>,
    body_analyzer: Option<Arc<dyn BodyAnalyzer>>,
}

impl Analyzer {
    /// Build an analyzer with the transports named in the config.
    pub fn new(config: Config) -> Result<Self> {
        let resolver: Arc<dyn DnsResolver> = match config.dns_transport {
            DnsTransport::Doh => Arc::new(DohResolver::new(&config.doh_endpoint)),
            DnsTransport::System => Arc::new(SystemResolver::from_system_conf()?),
        };
        let body_analyzer: Option<Arc<dyn BodyAnalyzer>> = if config.body_api_url.is_empty() {
            None
        } else {
            Some(Arc::new(HttpBodyAnalyzer::new(
                &config.body_api_url,
                Duration::from_secs(config.body_timeout_seconds),
            )?))
        };
        Ok(Self::with_collaborators(config, Some(resolver), body_analyzer))
    }

    /// Build with injected collaborators; `None` resolver disables DNS
    /// verification (its checks degrade to info). This is the seam tests
    /// use to stay off the network.
    pub fn with_collaborators(
        config: Config,
        resolver: Option<Arc<dyn DnsResolver>>,
        body_analyzer: Option<Arc<dyn BodyAnalyzer>>,
    ) -> Self {
        let scorer = RiskScorer::new(config.scoring.clone(), config.subject_keywords.clone());
        Self {
            config,
            scorer,
            chain: ChainAnalyzer::new(),
            resolver,
            body_analyzer,
        }
    }

    /// Analyze a raw header block into a complete Report. Never fails:
    /// malformed input degrades to neutral findings.
    pub async fn analyze_headers(&self, raw: &str) -> Report {
        let store = HeaderStore::parse(raw);

        let from = store.get("From").unwrap_or("");
        let return_path = store.get("Return-Path").unwrap_or("");
        let reply_to = store.get("Reply-To").unwrap_or("");
        let subject = store.get("Subject").unwrap_or("");

        // A message can carry one Authentication-Results header per
        // verifying hop; scan them as one corpus so the PASS-wins rule
        // sees every verdict.
        let auth_results = store.get_all("Authentication-Results").join("; ");
        let signals = AuthSignals::extract(&auth_results);
        let alignment = AlignmentEvaluator::new(from, return_path, reply_to);
        let hops = self.chain.parse_hops(&store);

        let mut checks: Vec<Check> = Vec::with_capacity(18);
        checks.extend(self.scorer.auth_checks(&signals));
        checks.push(alignment.from_vs_return_check());
        checks.push(alignment.reply_to_check());
        checks.push(self.chain.chain_check(&hops));
        checks.push(self.chain.helo_check(store.raw()));
        checks.push(self.chain.time_check(&hops));
        checks.push(self.chain.duplicates_check(&store));

        let (subject_check, subject_matched) = self.scorer.subject_check(subject);
        checks.push(subject_check);

        checks.extend(self.dns_checks(&alignment, &signals).await);
        checks.extend(alignment.alignment_checks(&signals));

        let score = self.scorer.score(&signals, &alignment, subject_matched);
        log::debug!(
            "Header analysis complete: score {score}, {} checks",
            checks.len()
        );

        Report {
            score,
            classification: Classification::from_score(score),
            header_score: score,
            content_score: None,
            content_verdict: None,
            checks,
            summary: Summary {
                from: display_or_dash(from),
                return_path: display_or_dash(return_path),
                spf: signals.spf.to_string(),
                dkim: signals.dkim.to_string(),
                dmarc: signals.dmarc.to_string(),
            },
            raw: store.raw().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Full analysis: headers, then optional body classification fused in.
    /// A failing or absent body collaborator degrades to the header-only
    /// report.
    pub async fn analyze(&self, raw_headers: &str, body: Option<&str>) -> Report {
        let report = self.analyze_headers(raw_headers).await;

        let body_text = match body {
            Some(text) if !text.trim().is_empty() => text,
            _ => return report,
        };
        let Some(analyzer) = &self.body_analyzer else {
            return report;
        };

        match analyzer.analyze(body_text).await {
            Ok(analysis) => fuse_body_score(&report, &analysis),
            Err(e) => {
                log::warn!("Body analysis unavailable, using header-only score: {e}");
                report
            }
        }
    }

    async fn dns_checks(&self, alignment: &AlignmentEvaluator, signals: &AuthSignals) -> Vec<Check> {
        match &self.resolver {
            Some(resolver) => {
                let verifier = DnsVerifier::new(
                    resolver.clone(),
                    Duration::from_secs(self.config.dns_timeout_seconds),
                    self.config.dns_parallelism,
                );
                verifier
                    .verify(alignment.from_domain.as_deref(), signals)
                    .await
            }
            None => [
                ("mx", "MX records (From domain)"),
                ("spf_dns", "SPF record (DNS TXT)"),
                ("dmarc_dns", "DMARC record (DNS TXT)"),
                ("dkim_dns", "DKIM selector TXT"),
            ]
            .iter()
            .map(|(key, label)| {
                Check::new(key, label, CheckStatus::Info, "DNS verification disabled")
            })
            .collect(),
        }
    }
}

fn display_or_dash(value: &str) -> String {
    if value.is_empty() {
        "—".to_string()
    } else {
        value.to_string()
    }
}
