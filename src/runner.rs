//! Concurrent check scheduling.
//!
//! Targets are fanned out to a fixed-width pool of worker threads and the
//! results are collected into one slot per input index, so the report always
//! comes back in the order the targets were given, no matter which hosts
//! answer first. A global deadline bounds the whole run; targets still
//! outstanding when it passes are reported as errors.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{check_target, CheckOutcome, CheckResult, Target};

/// Knobs for a batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of worker threads checking targets at once.
    pub concurrency: usize,
    /// Per-target connect/read timeout.
    pub timeout: Duration,
    /// Deadline for the whole batch.
    pub global_timeout: Duration,
    /// Warning threshold in days.
    pub threshold_days: i64,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            concurrency: 4,
            timeout: Duration::from_secs(30),
            global_timeout: Duration::from_secs(300),
            threshold_days: 30,
        }
    }
}

/// Checks every target and returns results in input order.
pub fn run_checks(targets: &[Target], options: &RunOptions) -> Vec<CheckResult> {
    let timeout = options.timeout;
    let threshold_days = options.threshold_days;
    run_with(targets, options, move |target| {
        check_target(target, timeout, threshold_days)
    })
}

/// Pool driver, generic over the per-target check so scheduling behavior can
/// be tested without touching the network.
pub fn run_with<F>(targets: &[Target], options: &RunOptions, check: F) -> Vec<CheckResult>
where
    F: Fn(&Target) -> CheckResult + Send + Sync + 'static,
{
    if targets.is_empty() {
        return Vec::new();
    }

    let deadline = Instant::now() + options.global_timeout;
    let queue: Arc<Mutex<VecDeque<(usize, Target)>>> =
        Arc::new(Mutex::new(targets.iter().cloned().enumerate().collect()));
    let check = Arc::new(check);
    let (sender, receiver) = mpsc::channel::<(usize, CheckResult)>();

    let workers = options.concurrency.clamp(1, targets.len());
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let check = Arc::clone(&check);
        let sender = sender.clone();
        thread::spawn(move || loop {
            let job = queue.lock().map(|mut q| q.pop_front()).unwrap_or(None);
            let Some((index, target)) = job else {
                break;
            };
            debug!("checking {target}");
            let result = check(&target);
            if let Some(message) = result.error_message() {
                warn!("{target}: {message}");
            }
            if sender.send((index, result)).is_err() {
                // Collector hit the deadline and went away.
                break;
            }
        });
    }
    drop(sender);

    let mut slots: Vec<Option<CheckResult>> = vec![None; targets.len()];
    let mut outstanding = targets.len();
    while outstanding > 0 {
        let budget = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(budget) {
            Ok((index, result)) => {
                if slots[index].is_none() {
                    outstanding -= 1;
                }
                slots[index] = Some(result);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Keep queued targets from starting; workers mid-check are
                // bounded by their own socket timeouts.
                if let Ok(mut q) = queue.lock() {
                    q.clear();
                }
                warn!("global deadline reached with {outstanding} checks outstanding");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let global_secs = options.global_timeout.as_secs();
    slots
        .into_iter()
        .zip(targets.iter())
        .map(|(slot, target)| {
            slot.unwrap_or_else(|| CheckResult {
                target: target.clone(),
                outcome: CheckOutcome::Error {
                    message: format!("check did not complete within global timeout ({global_secs}s)"),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CertificateInfo, Cipher, Issuer, Status, Subject};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options(concurrency: usize, global_secs: u64) -> RunOptions {
        RunOptions {
            concurrency,
            timeout: Duration::from_secs(1),
            global_timeout: Duration::from_secs(global_secs),
            threshold_days: 30,
        }
    }

    fn stub_certificate(common_name: &str) -> CertificateInfo {
        CertificateInfo {
            subject: Subject {
                country_or_region: "None".to_string(),
                state_or_province: "None".to_string(),
                locality: "None".to_string(),
                organization_unit: "None".to_string(),
                organization: "None".to_string(),
                common_name: common_name.to_string(),
            },
            issuer: Issuer {
                country_or_region: "US".to_string(),
                organization: "Stub CA".to_string(),
                common_name: "Stub CA".to_string(),
            },
            valid_from: "Jan  1 00:00:00 2026 GMT".to_string(),
            valid_to: "Jan  1 00:00:00 2027 GMT".to_string(),
            not_after_unix: 1_800_000_000,
            serial_number: "1".to_string(),
            signature_algorithm: "sha256WithRSAEncryption".to_string(),
            version: "2".to_string(),
            sans: vec![common_name.to_string()],
            is_self_signed: false,
        }
    }

    fn stub_ok(target: &Target) -> CheckResult {
        CheckResult {
            target: target.clone(),
            outcome: CheckOutcome::Certificate {
                certificate: stub_certificate(&target.host),
                cipher: Cipher {
                    name: "TLS_AES_128_GCM_SHA256".to_string(),
                    version: "TLSv1.3".to_string(),
                },
                days_remaining: 100,
                status: Status::Valid,
            },
        }
    }

    fn targets(hosts: &[&str]) -> Vec<Target> {
        hosts.iter().map(|h| Target::new(*h, 443)).collect()
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let results = run_checks(&[], &options(4, 5));
        assert!(results.is_empty());
    }

    #[test]
    fn preserves_input_order_under_out_of_order_completion() {
        // First target is the slowest, so completion order is reversed.
        let targets = targets(&["slow.example.com", "medium.example.com", "fast.example.com"]);
        let results = run_with(&targets, &options(3, 10), |target| {
            let delay = match target.host.as_str() {
                "slow.example.com" => 120,
                "medium.example.com" => 60,
                _ => 0,
            };
            thread::sleep(Duration::from_millis(delay));
            stub_ok(target)
        });

        let hosts: Vec<&str> = results.iter().map(|r| r.target.host.as_str()).collect();
        assert_eq!(
            hosts,
            vec!["slow.example.com", "medium.example.com", "fast.example.com"]
        );
    }

    #[test]
    fn pool_width_is_bounded() {
        let targets = targets(&["a", "b", "c", "d", "e", "f"]);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let in_flight_probe = Arc::clone(&in_flight);
        let peak_probe = Arc::clone(&peak);
        let results = run_with(&targets, &options(2, 10), move |target| {
            let now = in_flight_probe.fetch_add(1, Ordering::SeqCst) + 1;
            peak_probe.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(40));
            in_flight_probe.fetch_sub(1, Ordering::SeqCst);
            stub_ok(target)
        });

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn deadline_converts_stragglers_into_errors() {
        let targets = targets(&["quick.example.com", "hung.example.com"]);
        let options = RunOptions {
            concurrency: 2,
            timeout: Duration::from_secs(1),
            global_timeout: Duration::from_millis(200),
            threshold_days: 30,
        };
        let results = run_with(&targets, &options, |target| {
            if target.host == "hung.example.com" {
                thread::sleep(Duration::from_secs(5));
            }
            stub_ok(target)
        });

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status(), Status::Valid);
        assert_eq!(results[1].status(), Status::Error);
        assert!(results[1]
            .error_message()
            .unwrap()
            .contains("global timeout"));
    }

    #[test]
    fn every_target_appears_exactly_once() {
        let targets = targets(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let results = run_with(&targets, &options(3, 10), stub_ok);
        assert_eq!(results.len(), targets.len());
        for (target, result) in targets.iter().zip(&results) {
            assert_eq!(&result.target, target);
        }
    }
}
