//! Basic certificate checking example.
//!
//! Performs a single TLS certificate check and prints the extracted fields.
//!
//! Run with: cargo run --example basic_check

use std::time::Duration;

use certcheck::{check_target, CheckOutcome, Target};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Basic TLS Certificate Check ===\n");

    let target = Target::parse("google.com")?;
    let result = check_target(&target, Duration::from_secs(30), 30);

    match &result.outcome {
        CheckOutcome::Certificate {
            certificate,
            cipher,
            days_remaining,
            status,
        } => {
            println!("Target: {}", result.target);
            println!("Status: {}", status);
            println!("Subject: {}", certificate.subject.common_name);
            println!("Issuer: {}", certificate.issuer.organization);
            println!("Valid from: {}", certificate.valid_from);
            println!("Valid to: {}", certificate.valid_to);
            println!("Days remaining: {}", days_remaining);
            println!("Self-signed: {}", certificate.is_self_signed);
            println!();

            println!("Cipher Suite: {}", cipher.name);
            println!("Protocol Version: {}", cipher.version);
            println!();

            println!("Subject Alternative Names (SANs):");
            for san in &certificate.sans {
                println!("  - {}", san);
            }
        }
        CheckOutcome::Error { message } => {
            println!("Check failed: {}", message);
        }
    }

    Ok(())
}
