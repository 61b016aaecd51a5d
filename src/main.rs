use clap::{Arg, Command};
use headerscope::analyzer::Analyzer;
use headerscope::config::Config;
use headerscope::report::Report;
use log::LevelFilter;
use std::io::Read;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("headerscope")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forensic email-header analysis and phishing triage")
        .arg(
            Arg::new("message")
                .value_name("FILE")
                .help("Raw message file (headers, optionally followed by a blank line and body); reads stdin when omitted"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Emit the full report as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-dns")
                .long("no-dns")
                .help("Skip authoritative DNS verification")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-body")
                .long("no-body")
                .help("Skip body classification even when a body is present")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        match Config::default().save(path) {
            Ok(()) => {
                println!("Default configuration written to {path}");
                return;
            }
            Err(e) => {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
    }

    let config = match matches.get_one::<String>("config") {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let input = match read_input(matches.get_one::<String>("message")) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };
    let (headers, body) = split_message(&input);

    let analyzer = if matches.get_flag("no-dns") {
        Analyzer::with_collaborators(config, None, None)
    } else {
        match Analyzer::new(config) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
    };

    let body = if matches.get_flag("no-body") { None } else { body };
    let report = analyzer.analyze(headers, body).await;

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {e}");
                process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn read_input(path: Option<&String>) -> anyhow::Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Split a raw message at the first blank line into (headers, body).
fn split_message(input: &str) -> (&str, Option<&str>) {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(idx) = input.find(sep) {
            let body = &input[idx + sep.len()..];
            let body = (!body.trim().is_empty()).then_some(body);
            return (&input[..idx], body);
        }
    }
    (input, None)
}

fn print_report(report: &Report) {
    println!(
        "Classification: {}  (score {}/100, headers {}/100)",
        report.classification, report.score, report.header_score
    );
    if let Some(content) = report.content_score {
        println!(
            "Content score: {content}/100 ({})",
            report.content_verdict.as_deref().unwrap_or("?")
        );
    }
    println!("From: {}", report.summary.from);
    println!("Return-Path: {}", report.summary.return_path);
    println!(
        "Auth: spf={} dkim={} dmarc={}",
        report.summary.spf, report.summary.dkim, report.summary.dmarc
    );
    println!();
    for check in &report.checks {
        println!("[{:>4}] {}: {}", check.status, check.label, check.details);
    }
}
