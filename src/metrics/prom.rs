use lazy_static::lazy_static;
use log::{debug, warn};
use prometheus::{labels, register_gauge, Gauge};

use crate::{CheckOutcome, CheckResult, Status};

lazy_static! {
    static ref CERTCHECK_DAYS_REMAINING: Gauge = register_gauge!(
        "certcheck_days_remaining",
        "days before certificate expiration"
    )
    .unwrap();
    static ref CERTCHECK_STATUS: Gauge = register_gauge!(
        "certcheck_status",
        "certificate status (0 valid, 1 warning, 2 expired, 3 error)"
    )
    .unwrap();
}

/// Pushes one metric set per result to a Prometheus Push Gateway. Grouping
/// labels include the host, so successive runs for the same target overwrite
/// the same series. Push failures are logged and never fail the run.
pub fn push_metrics(results: &[CheckResult], gateway_address: &str) {
    for result in results.iter() {
        let status_value = match result.status() {
            Status::Valid => 0.0,
            Status::Warning => 1.0,
            Status::Expired => 2.0,
            Status::Error => 3.0,
        };
        CERTCHECK_STATUS.set(status_value);
        if let Some(days) = result.days_remaining() {
            CERTCHECK_DAYS_REMAINING.set(days as f64);
        }

        let (issuer, cipher) = match &result.outcome {
            CheckOutcome::Certificate {
                certificate,
                cipher,
                ..
            } => (
                certificate.issuer.organization.clone(),
                format!("{} {}", cipher.version, cipher.name),
            ),
            CheckOutcome::Error { .. } => (String::new(), String::new()),
        };

        let metric_families = prometheus::gather();
        let push_outcome = prometheus::push_metrics(
            "certcheck",
            labels! {
                "instance".to_owned() => "certcheck".to_owned(),
                "job".to_owned() => "certcheck".to_owned(),
                "host".to_owned() => result.target.to_string(),
                "issuer".to_owned() => issuer,
                "cipher".to_owned() => cipher,
                "status".to_owned() => result.status().to_string(),
            },
            gateway_address,
            metric_families,
            None,
        );

        match push_outcome {
            Ok(_) => debug!("pushed metrics for {}", result.target),
            Err(e) => warn!("failed to push metrics to prometheus: {}", e),
        }
    }
}
