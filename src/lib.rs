pub mod alignment;
pub mod analyzer;
pub mod auth_results;
pub mod body_analysis;
pub mod config;
pub mod dns;
pub mod headers;
pub mod received;
pub mod report;
pub mod scoring;

pub use analyzer::Analyzer;
pub use auth_results::{AuthSignals, AuthVerdict};
pub use config::{Config, DnsTransport};
pub use dns::{DnsResolver, DnsVerifier, DohResolver, RecordType, SystemResolver};
pub use headers::HeaderStore;
pub use report::{Check, CheckStatus, Classification, Report, Summary};
