//! Authoritative DNS verification of the sending domain.
//!
//! All lookups are advisory: a transport failure or timeout degrades the
//! finding it was backing to `info` and never disturbs the rest of the
//! report. The engine only depends on the `DnsResolver` capability; the two
//! production transports are DNS-over-HTTPS and the system resolver. Tests
//! inject canned resolvers.

use crate::auth_results::AuthSignals;
use crate::report::{Check, CheckStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Mx,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
        }
    }

    /// RR type code on the DoH wire.
    fn code(&self) -> u16 {
        match self {
            RecordType::Mx => 15,
            RecordType::Txt => 16,
        }
    }
}

/// Injected resolver capability. Answers are record payload strings: MX
/// answers carry the exchange host (priority stripped), TXT answers carry
/// the unquoted record text.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Vec<String>>;
}

// --- DNS-over-HTTPS transport ---

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

/// Resolver over a Google/Cloudflare style JSON DoH endpoint.
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Vec<String>> {
        let url = format!("{}?name={}&type={}", self.endpoint, name, rtype.as_str());
        log::debug!("DoH query: {url}");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/dns-json")
            .send()
            .await
            .with_context(|| format!("DoH request failed for {name}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("DoH endpoint returned {}", response.status()));
        }

        let body: DohResponse = response
            .json()
            .await
            .with_context(|| format!("malformed DoH response for {name}"))?;

        Ok(body
            .answer
            .into_iter()
            .filter(|a| a.rtype == rtype.code())
            .map(|a| match rtype {
                RecordType::Mx => mx_exchange(&a.data),
                RecordType::Txt => unquote_txt(&a.data),
            })
            .collect())
    }
}

/// MX payload is "<priority> <exchange>"; keep the exchange host only.
fn mx_exchange(data: &str) -> String {
    data.split_whitespace()
        .last()
        .unwrap_or(data)
        .trim_end_matches('.')
        .to_string()
}

/// TXT data arrives quoted on the DoH wire; strip one layer of surrounding
/// quotes and unescape embedded `\"`.
fn unquote_txt(data: &str) -> String {
    let trimmed = data
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(data);
    trimmed.replace("\\\"", "\"")
}

// --- System resolver transport ---

/// Resolver backed by the host's configured DNS.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn from_system_conf() -> Result<Self> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .context("failed to create system DNS resolver")?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Vec<String>> {
        match rtype {
            RecordType::Mx => {
                let response = self.inner.mx_lookup(name).await?;
                Ok(response
                    .iter()
                    .map(|mx| mx.exchange().to_string().trim_end_matches('.').to_string())
                    .collect())
            }
            RecordType::Txt => {
                let response = self.inner.txt_lookup(name).await?;
                Ok(response.iter().map(|txt| txt.to_string()).collect())
            }
        }
    }
}

// --- Verification ---

/// Tri-state outcome of one lookup.
enum LookupOutcome {
    Present(Vec<String>),
    Absent,
    /// Transport failure or timeout; the record's existence is unknowable.
    Unknown,
}

pub struct DnsVerifier {
    resolver: Arc<dyn DnsResolver>,
    timeout: Duration,
    parallelism: usize,
    policy_re: Regex,
}

impl DnsVerifier {
    pub fn new(resolver: Arc<dyn DnsResolver>, timeout: Duration, parallelism: usize) -> Self {
        Self {
            resolver,
            timeout,
            parallelism: parallelism.max(1),
            policy_re: Regex::new(r"(?i)\bp\s*=\s*(none|quarantine|reject)").unwrap(),
        }
    }

    async fn lookup(&self, name: &str, rtype: RecordType) -> LookupOutcome {
        match tokio::time::timeout(self.timeout, self.resolver.resolve(name, rtype)).await {
            Ok(Ok(answers)) if !answers.is_empty() => LookupOutcome::Present(answers),
            Ok(Ok(_)) => LookupOutcome::Absent,
            Ok(Err(e)) => {
                log::debug!("{} lookup failed for {name}: {e}", rtype.as_str());
                LookupOutcome::Unknown
            }
            Err(_) => {
                log::debug!("{} lookup timed out for {name}", rtype.as_str());
                LookupOutcome::Unknown
            }
        }
    }

    /// Run every advisory lookup for the message and emit the DNS checks in
    /// canonical order: mx, spf_dns, dmarc_dns [, dmarc_policy], dkim_dns.
    pub async fn verify(&self, from_domain: Option<&str>, signals: &AuthSignals) -> Vec<Check> {
        let mut checks = Vec::new();

        match from_domain {
            Some(domain) => {
                checks.push(self.mx_check(domain).await);
                checks.push(self.spf_check(domain).await);
                checks.extend(self.dmarc_checks(domain).await);
            }
            None => {
                for (key, label) in [
                    ("mx", "MX records (From domain)"),
                    ("spf_dns", "SPF record (DNS TXT)"),
                    ("dmarc_dns", "DMARC record (DNS TXT)"),
                ] {
                    checks.push(Check::new(key, label, CheckStatus::Info, "domain not detected"));
                }
            }
        }

        checks.push(self.dkim_selector_check(from_domain, signals).await);
        checks
    }

    async fn mx_check(&self, domain: &str) -> Check {
        match self.lookup(domain, RecordType::Mx).await {
            LookupOutcome::Present(hosts) => Check::new(
                "mx",
                "MX records (From domain)",
                CheckStatus::Good,
                hosts.join(", "),
            ),
            LookupOutcome::Absent => Check::new(
                "mx",
                "MX records (From domain)",
                CheckStatus::Warn,
                format!("no MX for {domain}"),
            ),
            LookupOutcome::Unknown => Check::new(
                "mx",
                "MX records (From domain)",
                CheckStatus::Info,
                "could not be queried",
            ),
        }
    }

    async fn spf_check(&self, domain: &str) -> Check {
        match self.lookup(domain, RecordType::Txt).await {
            LookupOutcome::Present(records) => {
                let spf: Vec<&String> = records
                    .iter()
                    .filter(|r| r.to_lowercase().contains("v=spf1"))
                    .collect();
                match spf.first() {
                    Some(record) => Check::new(
                        "spf_dns",
                        "SPF record (DNS TXT)",
                        CheckStatus::Good,
                        record.as_str(),
                    ),
                    None => Check::new(
                        "spf_dns",
                        "SPF record (DNS TXT)",
                        CheckStatus::Warn,
                        format!("no v=spf1 record for {domain}"),
                    ),
                }
            }
            LookupOutcome::Absent => Check::new(
                "spf_dns",
                "SPF record (DNS TXT)",
                CheckStatus::Warn,
                format!("no v=spf1 record for {domain}"),
            ),
            LookupOutcome::Unknown => Check::new(
                "spf_dns",
                "SPF record (DNS TXT)",
                CheckStatus::Info,
                "could not be queried",
            ),
        }
    }

    /// `dmarc_dns`, plus `dmarc_policy` when a record exists.
    async fn dmarc_checks(&self, domain: &str) -> Vec<Check> {
        let name = format!("_dmarc.{domain}");
        match self.lookup(&name, RecordType::Txt).await {
            LookupOutcome::Present(records) => {
                let record = records[0].clone();
                let policy = self
                    .policy_re
                    .captures(&record)
                    .map(|c| c[1].to_uppercase());
                let mut checks = vec![Check::new(
                    "dmarc_dns",
                    "DMARC record (DNS TXT)",
                    CheckStatus::Good,
                    record,
                )];
                checks.push(match policy {
                    Some(p) => Check::new("dmarc_policy", "DMARC policy (p=)", CheckStatus::Good, p),
                    None => Check::new(
                        "dmarc_policy",
                        "DMARC policy (p=)",
                        CheckStatus::Info,
                        "no p= token",
                    ),
                });
                checks
            }
            LookupOutcome::Absent => vec![Check::new(
                "dmarc_dns",
                "DMARC record (DNS TXT)",
                CheckStatus::Warn,
                format!("no record at {name}"),
            )],
            LookupOutcome::Unknown => vec![Check::new(
                "dmarc_dns",
                "DMARC record (DNS TXT)",
                CheckStatus::Info,
                "could not be queried",
            )],
        }
    }

    /// One TXT query per discovered selector at
    /// `<selector>._domainkey.<dkim-domain>`, run concurrently up to the
    /// parallelism cap. The lookups are idempotent; only the union of
    /// results matters.
    async fn dkim_selector_check(
        &self,
        from_domain: Option<&str>,
        signals: &AuthSignals,
    ) -> Check {
        if signals.dkim_selectors.is_empty() {
            return Check::new(
                "dkim_dns",
                "DKIM selector TXT",
                CheckStatus::Info,
                "no selector visible",
            );
        }

        let dkim_domain = signals
            .dkim_domains
            .first()
            .map(|d| d.as_str())
            .or(from_domain);
        let Some(dkim_domain) = dkim_domain else {
            return Check::new(
                "dkim_dns",
                "DKIM selector TXT",
                CheckStatus::Info,
                "no signing domain detected",
            );
        };

        let mut selectors = signals.dkim_selectors.clone();
        selectors.dedup();
        let names: Vec<String> = selectors
            .iter()
            .map(|s| format!("{s}._domainkey.{dkim_domain}"))
            .collect();

        let mut pending = names.into_iter();
        let mut set: JoinSet<bool> = JoinSet::new();
        for name in pending.by_ref().take(self.parallelism) {
            set.spawn(resolve_selector(self.resolver.clone(), name, self.timeout));
        }

        let mut any_resolved = false;
        while let Some(result) = set.join_next().await {
            if let Ok(found) = result {
                any_resolved |= found;
            }
            if let Some(name) = pending.next() {
                set.spawn(resolve_selector(self.resolver.clone(), name, self.timeout));
            }
        }

        Check::new(
            "dkim_dns",
            "DKIM selector TXT",
            if any_resolved { CheckStatus::Good } else { CheckStatus::Warn },
            selectors.join(", "),
        )
    }
}

async fn resolve_selector(
    resolver: Arc<dyn DnsResolver>,
    name: String,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, resolver.resolve(&name, RecordType::Txt)).await {
        Ok(Ok(answers)) => !answers.is_empty(),
        Ok(Err(e)) => {
            log::debug!("DKIM selector lookup failed for {name}: {e}");
            false
        }
        Err(_) => {
            log::debug!("DKIM selector lookup timed out for {name}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_results::AuthVerdict;
    use std::collections::HashMap;

    /// Canned resolver: (name, type) -> answers; unknown names error.
    struct FakeResolver {
        records: HashMap<(String, &'static str), Vec<String>>,
        fail_names: Vec<String>,
    }

    impl FakeResolver {
        fn new() -> Self {
            Self {
                records: HashMap::new(),
                fail_names: Vec::new(),
            }
        }

        fn with(mut self, name: &str, rtype: RecordType, answers: &[&str]) -> Self {
            self.records.insert(
                (name.to_string(), rtype.as_str()),
                answers.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.fail_names.push(name.to_string());
            self
        }
    }

    #[async_trait]
    impl DnsResolver for FakeResolver {
        async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Vec<String>> {
            if self.fail_names.iter().any(|n| n == name) {
                return Err(anyhow!("simulated transport failure"));
            }
            Ok(self
                .records
                .get(&(name.to_string(), rtype.as_str()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn signals_with_selectors(selectors: &[&str], domains: &[&str]) -> AuthSignals {
        AuthSignals {
            spf: AuthVerdict::Unknown,
            dkim: AuthVerdict::Unknown,
            dmarc: AuthVerdict::Unknown,
            dkim_domains: domains.iter().map(|s| s.to_string()).collect(),
            dkim_selectors: selectors.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn verifier(resolver: FakeResolver) -> DnsVerifier {
        DnsVerifier::new(Arc::new(resolver), Duration::from_secs(3), 8)
    }

    #[test]
    fn test_unquote_txt() {
        assert_eq!(unquote_txt("\"v=spf1 -all\""), "v=spf1 -all");
        assert_eq!(unquote_txt("\"a \\\"b\\\" c\""), "a \"b\" c");
        assert_eq!(unquote_txt("unquoted"), "unquoted");
    }

    #[test]
    fn test_mx_exchange() {
        assert_eq!(mx_exchange("10 mx.example.com."), "mx.example.com");
        assert_eq!(mx_exchange("mx.example.com"), "mx.example.com");
    }

    #[tokio::test]
    async fn test_mx_present_and_absent() {
        let v = verifier(
            FakeResolver::new().with("example.com", RecordType::Mx, &["mx1.example.com"]),
        );
        let check = v.mx_check("example.com").await;
        assert_eq!(check.status, CheckStatus::Good);
        assert!(check.details.contains("mx1.example.com"));

        let v = verifier(FakeResolver::new());
        assert_eq!(v.mx_check("example.com").await.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn test_spf_txt_filtering() {
        let v = verifier(FakeResolver::new().with(
            "example.com",
            RecordType::Txt,
            &["google-site-verification=xyz", "v=spf1 include:_spf.example.com -all"],
        ));
        let check = v.spf_check("example.com").await;
        assert_eq!(check.status, CheckStatus::Good);
        assert!(check.details.contains("v=spf1"));

        let v = verifier(
            FakeResolver::new().with("example.com", RecordType::Txt, &["unrelated=1"]),
        );
        assert_eq!(v.spf_check("example.com").await.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn test_dmarc_policy_parsed() {
        let v = verifier(FakeResolver::new().with(
            "_dmarc.example.com",
            RecordType::Txt,
            &["v=DMARC1; p=reject; rua=mailto:d@example.com"],
        ));
        let checks = v.dmarc_checks("example.com").await;
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].key, "dmarc_dns");
        assert_eq!(checks[0].status, CheckStatus::Good);
        assert_eq!(checks[1].key, "dmarc_policy");
        assert_eq!(checks[1].details, "REJECT");
    }

    #[tokio::test]
    async fn test_dmarc_absent_warns() {
        let v = verifier(FakeResolver::new());
        let checks = v.dmarc_checks("example.com").await;
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_info() {
        let v = verifier(FakeResolver::new().failing("_dmarc.example.com"));
        let checks = v.dmarc_checks("example.com").await;
        assert_eq!(checks[0].status, CheckStatus::Info);
        assert!(checks[0].details.contains("could not be queried"));
    }

    #[tokio::test]
    async fn test_dkim_selector_any_resolves() {
        let v = verifier(FakeResolver::new().with(
            "sel2._domainkey.example.com",
            RecordType::Txt,
            &["v=DKIM1; k=rsa; p=MIIB..."],
        ));
        let signals = signals_with_selectors(&["sel1", "sel2"], &["example.com"]);
        let check = v.dkim_selector_check(Some("example.com"), &signals).await;
        assert_eq!(check.status, CheckStatus::Good);
    }

    #[tokio::test]
    async fn test_dkim_selector_none_resolve() {
        let v = verifier(FakeResolver::new());
        let signals = signals_with_selectors(&["sel1"], &["example.com"]);
        let check = v.dkim_selector_check(Some("example.com"), &signals).await;
        assert_eq!(check.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn test_dkim_no_selector_is_info() {
        let v = verifier(FakeResolver::new());
        let signals = signals_with_selectors(&[], &[]);
        let check = v.dkim_selector_check(Some("example.com"), &signals).await;
        assert_eq!(check.status, CheckStatus::Info);
    }

    #[tokio::test]
    async fn test_verify_without_domain_emits_all_dimensions() {
        let v = verifier(FakeResolver::new());
        let checks = v.verify(None, &signals_with_selectors(&[], &[])).await;
        let keys: Vec<&str> = checks.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["mx", "spf_dns", "dmarc_dns", "dkim_dns"]);
        assert!(checks.iter().all(|c| c.status == CheckStatus::Info));
    }
}
