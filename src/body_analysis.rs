//! Body-analysis collaborator and score fusion.
//!
//! The content classifier is an external black-box service; this module
//! only speaks its wire shape and merges its score into a header report.
//! Fusion is deliberately worst-case: the final score is the maximum of the
//! header score and the content score, so a clean header block cannot mask
//! a malicious body and vice versa. The header-only score stays available
//! in `Report.header_score` for audit.

use crate::report::{Check, CheckStatus, Classification, Report};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Response shape of the content-classification service.
#[derive(Debug, Clone, Deserialize)]
pub struct BodyAnalysis {
    #[serde(rename = "resultado")]
    pub result: BodyResult,
    #[serde(rename = "analisis_heuristico", default)]
    pub heuristics: Option<HeuristicAnalysis>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodyResult {
    /// SEGURO | SOSPECHOSO | MALICIOSO.
    #[serde(rename = "veredicto")]
    pub verdict: String,
    /// Percentage string, e.g. "85.00%".
    #[serde(rename = "probabilidad_phishing")]
    pub phishing_probability: String,
    #[serde(rename = "alertas_detectadas", default)]
    pub alert_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeuristicAnalysis {
    #[serde(rename = "alertas", default)]
    pub alerts: Vec<String>,
    #[serde(rename = "detalle_urls", default)]
    pub url_details: Vec<UrlDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlDetail {
    /// Model risk in "0.0".."1.0".
    #[serde(rename = "riesgo_ia", default)]
    pub ai_risk: String,
}

impl BodyAnalysis {
    /// Content risk in [0, 100], parsed from the "NN.NN%" wire string.
    /// Unparseable values read as 0 rather than failing the report.
    pub fn content_score(&self) -> u32 {
        let stripped = self.result.phishing_probability.trim_end_matches('%');
        let parsed: f64 = stripped.trim().parse().unwrap_or(0.0);
        parsed.clamp(0.0, 100.0).round() as u32
    }
}

/// Injected collaborator capability; the engine never sees the transport.
#[async_trait]
pub trait BodyAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<BodyAnalysis>;
}

/// Production client for the HTTP content-classification service.
pub struct HttpBodyAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBodyAnalyzer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build body-analysis HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl BodyAnalyzer for HttpBodyAnalyzer {
    async fn analyze(&self, text: &str) -> Result<BodyAnalysis> {
        log::debug!("Submitting {} bytes of body text for analysis", text.len());
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("body-analysis request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("body-analysis service returned {}", response.status());
        }
        response
            .json::<BodyAnalysis>()
            .await
            .context("malformed body-analysis response")
    }
}

/// Merge a content classification into a header report, producing a new
/// Report. The original is left untouched.
pub fn fuse_body_score(header_report: &Report, analysis: &BodyAnalysis) -> Report {
    let content_score = analysis.content_score();
    let final_score = header_report.header_score.max(content_score).min(100);
    let verdict = analysis.result.verdict.to_uppercase();

    let mut checks = header_report.checks.clone();

    if let Some(heuristics) = &analysis.heuristics {
        if !heuristics.alerts.is_empty() {
            checks.push(Check::new(
                "body_heuristics",
                "Body heuristics",
                CheckStatus::Bad,
                format!("{} alerts", heuristics.alerts.len()),
            ));
        }

        let risky_urls = heuristics
            .url_details
            .iter()
            .filter(|u| u.ai_risk.trim().parse::<f64>().unwrap_or(0.0) > 0.3)
            .count();
        if risky_urls > 0 {
            checks.push(Check::new(
                "malicious_urls",
                "Suspicious links",
                CheckStatus::Bad,
                format!("{risky_urls} high-risk links"),
            ));
        }
    }

    let verdict_status = match verdict.as_str() {
        "SEGURO" => CheckStatus::Good,
        "SOSPECHOSO" => CheckStatus::Warn,
        _ => CheckStatus::Bad,
    };
    checks.push(Check::new(
        "body_analysis",
        "Body classification",
        verdict_status,
        format!(
            "{} ({}, {} alerts)",
            verdict, analysis.result.phishing_probability, analysis.result.alert_count
        ),
    ));

    Report {
        score: final_score,
        classification: Classification::from_score(final_score),
        header_score: header_report.header_score,
        content_score: Some(content_score),
        content_verdict: Some(verdict),
        checks,
        summary: header_report.summary.clone(),
        raw: header_report.raw.clone(),
        created_at: header_report.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Summary;
    use chrono::Utc;

    fn header_report(score: u32) -> Report {
        Report {
            score,
            classification: Classification::from_score(score),
            header_score: score,
            content_score: None,
            content_verdict: None,
            checks: vec![Check::new("spf", "SPF", CheckStatus::Good, "PASS")],
            summary: Summary {
                from: "a@example.com".into(),
                return_path: "a@example.com".into(),
                spf: "PASS".into(),
                dkim: "PASS".into(),
                dmarc: "PASS".into(),
            },
            raw: String::new(),
            created_at: Utc::now(),
        }
    }

    fn analysis(verdict: &str, probability: &str) -> BodyAnalysis {
        BodyAnalysis {
            result: BodyResult {
                verdict: verdict.to_string(),
                phishing_probability: probability.to_string(),
                alert_count: 2,
            },
            heuristics: None,
        }
    }

    #[test]
    fn test_probability_parsing() {
        assert_eq!(analysis("SEGURO", "85.00%").content_score(), 85);
        assert_eq!(analysis("SEGURO", "0%").content_score(), 0);
        assert_eq!(analysis("SEGURO", "garbage").content_score(), 0);
        assert_eq!(analysis("SEGURO", "250%").content_score(), 100);
    }

    #[test]
    fn test_fusion_takes_worst_case() {
        let header = header_report(20);
        let fused = fuse_body_score(&header, &analysis("MALICIOSO", "90.00%"));
        assert_eq!(fused.score, 90);
        assert_eq!(fused.classification, Classification::Malicious);
        assert_eq!(fused.header_score, 20);
        assert_eq!(fused.content_score, Some(90));
        // Original untouched.
        assert_eq!(header.score, 20);

        let fused = fuse_body_score(&header_report(80), &analysis("SEGURO", "5.00%"));
        assert_eq!(fused.score, 80);
    }

    #[test]
    fn test_fusion_appends_body_checks() {
        let mut a = analysis("SOSPECHOSO", "55.00%");
        a.heuristics = Some(HeuristicAnalysis {
            alerts: vec!["shortened url".into()],
            url_details: vec![
                UrlDetail { ai_risk: "0.7".into() },
                UrlDetail { ai_risk: "0.1".into() },
            ],
        });
        let fused = fuse_body_score(&header_report(10), &a);

        let body = fused.check("body_analysis").unwrap();
        assert_eq!(body.status, CheckStatus::Warn);
        assert!(body.details.contains("SOSPECHOSO"));

        assert_eq!(fused.check("body_heuristics").unwrap().status, CheckStatus::Bad);
        let urls = fused.check("malicious_urls").unwrap();
        assert!(urls.details.contains("1 high-risk"));
    }

    #[test]
    fn test_wire_deserialization() {
        let json = r#"{
            "resultado": {
                "veredicto": "SOSPECHOSO",
                "probabilidad_phishing": "42.50%",
                "alertas_detectadas": 3
            },
            "analisis_heuristico": {
                "alertas": ["a", "b"],
                "detalle_urls": [{"riesgo_ia": "0.4"}]
            }
        }"#;
        let parsed: BodyAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.result.verdict, "SOSPECHOSO");
        assert_eq!(parsed.content_score(), 43);
        assert_eq!(parsed.heuristics.unwrap().alerts.len(), 2);
    }
}
