//! Concurrent multi-host checking example.
//!
//! Checks several hosts through the bounded worker pool and prints a
//! summary line per target, in input order.
//!
//! Run with: cargo run --example multiple_hosts

use std::time::Duration;

use certcheck::runner::{run_checks, RunOptions};
use certcheck::Target;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Multi-Host Certificate Check ===\n");

    let targets = [
        "google.com",
        "github.com",
        "rust-lang.org",
        "crates.io",
        "docs.rs",
    ]
    .iter()
    .map(|spec| Target::parse(spec))
    .collect::<Result<Vec<_>, _>>()?;

    let options = RunOptions {
        concurrency: 3,
        timeout: Duration::from_secs(10),
        global_timeout: Duration::from_secs(60),
        threshold_days: 30,
    };
    let results = run_checks(&targets, &options);

    println!(
        "{:<24} {:<10} {:>9}   {}",
        "Host", "Status", "Days Left", "Details"
    );
    println!("{}", "=".repeat(70));

    for result in &results {
        let days = result
            .days_remaining()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let details = result.error_message().unwrap_or("");
        println!(
            "{:<24} {:<10} {:>9}   {}",
            result.target.to_string(),
            result.status().to_string(),
            days,
            details
        );
    }

    Ok(())
}
