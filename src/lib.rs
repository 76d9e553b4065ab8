use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode};
use openssl::x509::{X509NameEntries, X509Ref, X509VerifyResult, X509};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;

pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;

pub use error::CheckError;

/// Port used when a target spec does not name one.
pub const DEFAULT_PORT: u16 = 443;

const SECS_PER_DAY: i64 = 86_400;

/// A single endpoint to check, parsed from a CLI argument or a config entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Server name sent during the handshake when it differs from `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Target {
            host: host.into(),
            port,
            sni: None,
        }
    }

    /// Parses a target spec. Accepts `host`, `host:port` and
    /// `scheme://host[:port]` spellings; the last form shows up in config
    /// files where people paste full URLs.
    pub fn parse(spec: &str) -> Result<Self, CheckError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(CheckError::InvalidTarget {
                spec: spec.to_string(),
                reason: "empty target".to_string(),
            });
        }

        if spec.contains("://") {
            let parsed = Url::parse(spec).map_err(|e| CheckError::InvalidTarget {
                spec: spec.to_string(),
                reason: e.to_string(),
            })?;
            let host = parsed
                .host_str()
                .ok_or_else(|| CheckError::InvalidTarget {
                    spec: spec.to_string(),
                    reason: "URL has no host".to_string(),
                })?
                .to_string();
            let port = parsed.port_or_known_default().unwrap_or(DEFAULT_PORT);
            return Ok(Target::new(host, port));
        }

        match spec.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port.parse::<u16>().map_err(|_| CheckError::InvalidTarget {
                    spec: spec.to_string(),
                    reason: format!("invalid port '{port}'"),
                })?;
                Ok(Target::new(host, port))
            }
            Some(_) => Err(CheckError::InvalidTarget {
                spec: spec.to_string(),
                reason: "expected host or host:port".to_string(),
            }),
            None => Ok(Target::new(spec, DEFAULT_PORT)),
        }
    }

    pub fn with_sni(mut self, sni: impl Into<String>) -> Self {
        self.sni = Some(sni.into());
        self
    }

    /// Name sent as SNI and used to pick the server certificate.
    pub fn server_name(&self) -> &str {
        self.sni.as_deref().unwrap_or(&self.host)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub country_or_region: String,
    pub state_or_province: String,
    pub locality: String,
    pub organization_unit: String,
    pub organization: String,
    pub common_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub country_or_region: String,
    pub organization: String,
    pub common_name: String,
}

/// Read-only snapshot of the leaf certificate served by a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: Subject,
    pub issuer: Issuer,
    pub valid_from: String,
    pub valid_to: String,
    /// `not_after` as unix seconds, the evaluator's input.
    pub not_after_unix: i64,
    pub serial_number: String,
    pub signature_algorithm: String,
    pub version: String,
    pub sans: Vec<String>,
    pub is_self_signed: bool,
}

/// Cipher suite and protocol version negotiated during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cipher {
    pub name: String,
    pub version: String,
}

/// Expiry classification for a checked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Status {
    Valid,
    Warning,
    Expired,
    Error,
}

/// What came out of checking one target. Either a certificate was obtained
/// and evaluated, or the check failed; the enum makes holding both
/// impossible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckOutcome {
    Certificate {
        certificate: CertificateInfo,
        cipher: Cipher,
        days_remaining: i64,
        status: Status,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target: Target,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn failed(target: &Target, err: &CheckError) -> Self {
        CheckResult {
            target: target.clone(),
            outcome: CheckOutcome::Error {
                message: err.to_string(),
            },
        }
    }

    pub fn status(&self) -> Status {
        match &self.outcome {
            CheckOutcome::Certificate { status, .. } => *status,
            CheckOutcome::Error { .. } => Status::Error,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status() == Status::Valid
    }

    pub fn days_remaining(&self) -> Option<i64> {
        match &self.outcome {
            CheckOutcome::Certificate { days_remaining, .. } => Some(*days_remaining),
            CheckOutcome::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            CheckOutcome::Certificate { .. } => None,
            CheckOutcome::Error { message } => Some(message),
        }
    }
}

/// Connects to a target and evaluates the served certificate. Failures are
/// folded into the result rather than returned, so a batch run never stops
/// at the first broken host.
pub fn check_target(target: &Target, timeout: Duration, threshold_days: i64) -> CheckResult {
    match handshake(target, timeout) {
        Ok((chain, cipher)) => match extract(&chain) {
            Ok(certificate) => {
                let (days_remaining, status) =
                    evaluate(certificate.not_after_unix, unix_now(), threshold_days);
                CheckResult {
                    target: target.clone(),
                    outcome: CheckOutcome::Certificate {
                        certificate,
                        cipher,
                        days_remaining,
                        status,
                    },
                }
            }
            Err(err) => CheckResult::failed(target, &err),
        },
        Err(err) => CheckResult::failed(target, &err),
    }
}

/// Opens a TLS session to the target and returns the peer certificate chain
/// (leaf first) plus the negotiated cipher. Verification is disabled on
/// purpose: an expired or untrusted chain must still be inspectable.
pub fn handshake(target: &Target, timeout: Duration) -> Result<(Vec<X509>, Cipher), CheckError> {
    let mut context = SslContext::builder(SslMethod::tls())?;
    context.set_verify(SslVerifyMode::empty());
    let context = context.build();

    let mut connector = Ssl::new(&context)?;
    connector.set_hostname(target.server_name())?;

    let address = target.address();
    let socket_addr = address
        .to_socket_addrs()
        .map_err(|e| CheckError::DnsResolution {
            hostname: target.host.clone(),
            source: e,
        })?
        .next()
        .ok_or_else(|| CheckError::DnsResolution {
            hostname: target.host.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "hostname resolved to no addresses",
            ),
        })?;

    let tcp_stream =
        TcpStream::connect_timeout(&socket_addr, timeout).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => CheckError::Timeout {
                operation: format!("connect to {address}"),
            },
            _ => CheckError::ConnectionFailed {
                address: address.clone(),
                source: e,
            },
        })?;
    tcp_stream.set_read_timeout(Some(timeout))?;
    tcp_stream.set_write_timeout(Some(timeout))?;

    let stream = connector.connect(tcp_stream)?;
    let ssl = stream.ssl();

    let mut chain: Vec<X509> = ssl
        .peer_cert_chain()
        .map(|stack| stack.iter().map(X509Ref::to_owned).collect())
        .unwrap_or_default();
    if chain.is_empty() {
        // Some servers hand back only the leaf.
        chain.extend(ssl.peer_certificate());
    }

    let cipher = Cipher {
        name: ssl
            .current_cipher()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        version: ssl.version_str().to_string(),
    };

    Ok((chain, cipher))
}

/// Extracts the leaf certificate's fields from a handshake chain.
pub fn extract(chain: &[X509]) -> Result<CertificateInfo, CheckError> {
    let leaf = chain.first().ok_or_else(|| CheckError::CertificateParse {
        reason: "peer returned an empty certificate chain".to_string(),
    })?;
    certificate_info(leaf)
}

fn certificate_info(cert: &X509Ref) -> Result<CertificateInfo, CheckError> {
    let mut sans = Vec::new();
    if let Some(general_names) = cert.subject_alt_names() {
        for general_name in general_names.iter() {
            if let Some(dns_name) = general_name.dnsname() {
                sans.push(dns_name.to_string());
            }
        }
    }

    let serial_number = cert
        .serial_number()
        .to_bn()
        .map_err(|e| CheckError::CertificateParse {
            reason: format!("unreadable serial number: {e}"),
        })?
        .to_string();

    Ok(CertificateInfo {
        subject: subject_of(cert),
        issuer: issuer_of(cert),
        valid_from: cert.not_before().to_string(),
        valid_to: cert.not_after().to_string(),
        not_after_unix: asn1_to_unix(cert.not_after())?,
        serial_number,
        signature_algorithm: cert.signature_algorithm().object().to_string(),
        version: cert.version().to_string(),
        sans,
        is_self_signed: cert.issued(cert) == X509VerifyResult::OK,
    })
}

fn subject_of(cert: &X509Ref) -> Subject {
    let subject = cert.subject_name();
    Subject {
        country_or_region: from_entries(subject.entries_by_nid(Nid::COUNTRYNAME)),
        state_or_province: from_entries(subject.entries_by_nid(Nid::STATEORPROVINCENAME)),
        locality: from_entries(subject.entries_by_nid(Nid::LOCALITYNAME)),
        organization_unit: from_entries(subject.entries_by_nid(Nid::ORGANIZATIONALUNITNAME)),
        organization: from_entries(subject.entries_by_nid(Nid::ORGANIZATIONNAME)),
        common_name: from_entries(subject.entries_by_nid(Nid::COMMONNAME)),
    }
}

fn issuer_of(cert: &X509Ref) -> Issuer {
    let issuer = cert.issuer_name();
    Issuer {
        country_or_region: from_entries(issuer.entries_by_nid(Nid::COUNTRYNAME)),
        organization: from_entries(issuer.entries_by_nid(Nid::ORGANIZATIONNAME)),
        common_name: from_entries(issuer.entries_by_nid(Nid::COMMONNAME)),
    }
}

fn from_entries(mut entries: X509NameEntries) -> String {
    match entries.next() {
        None => "None".to_string(),
        Some(entry) => entry
            .data()
            .as_utf8()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "None".to_string()),
    }
}

fn asn1_to_unix(time: &Asn1TimeRef) -> Result<i64, CheckError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    Ok(i64::from(diff.days) * SECS_PER_DAY + i64::from(diff.secs))
}

/// Classifies a certificate's remaining lifetime. Pure so it can be tested
/// against any clock: `days_remaining` is the floored whole-day difference,
/// Expired below zero, Warning up to and including the threshold.
pub fn evaluate(not_after_unix: i64, now_unix: i64, threshold_days: i64) -> (i64, Status) {
    let days_remaining = (not_after_unix - now_unix).div_euclid(SECS_PER_DAY);
    let status = if days_remaining < 0 {
        Status::Expired
    } else if days_remaining <= threshold_days {
        Status::Warning
    } else {
        Status::Valid
    };
    (days_remaining, status)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::extension::SubjectAlternativeName;
    use openssl::x509::{X509Builder, X509NameBuilder};

    fn build_self_signed(common_name: &str, days: u32, sans: &[&str]) -> X509 {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)
            .unwrap();
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Test Org")
            .unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        let serial = BigNum::from_u32(4242).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(days).unwrap())
            .unwrap();
        if !sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for entry in sans {
                san.dns(entry);
            }
            let extension = san.build(&builder.x509v3_context(None, None)).unwrap();
            builder.append_extension(extension).unwrap();
        }
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    #[test]
    fn parse_bare_host() {
        let target = Target::parse("example.com").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.sni, None);
        assert_eq!(target.server_name(), "example.com");
    }

    #[test]
    fn parse_host_with_port() {
        let target = Target::parse("example.com:8443").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8443);
        assert_eq!(target.address(), "example.com:8443");
    }

    #[test]
    fn parse_url_form() {
        let target = Target::parse("https://secure.example.com:9443/health").unwrap();
        assert_eq!(target.host, "secure.example.com");
        assert_eq!(target.port, 9443);

        let target = Target::parse("https://secure.example.com").unwrap();
        assert_eq!(target.port, 443);
    }

    #[test]
    fn parse_rejects_bad_specs() {
        assert!(matches!(
            Target::parse(""),
            Err(CheckError::InvalidTarget { .. })
        ));
        assert!(matches!(
            Target::parse("example.com:notaport"),
            Err(CheckError::InvalidTarget { .. })
        ));
        assert!(matches!(
            Target::parse(":443"),
            Err(CheckError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn sni_override_wins_over_host() {
        let target = Target::parse("192.0.2.10:443")
            .unwrap()
            .with_sni("internal.example.com");
        assert_eq!(target.server_name(), "internal.example.com");
        assert_eq!(target.host, "192.0.2.10");
    }

    #[test]
    fn evaluate_expired_certificate() {
        let now = 1_700_000_000;
        let (days, status) = evaluate(now - 1, now, 30);
        assert_eq!(status, Status::Expired);
        assert_eq!(days, -1);

        let (days, status) = evaluate(now - 90 * SECS_PER_DAY, now, 30);
        assert_eq!(status, Status::Expired);
        assert_eq!(days, -90);
    }

    #[test]
    fn evaluate_valid_certificate() {
        let now = 1_700_000_000;
        let (days, status) = evaluate(now + 31 * SECS_PER_DAY, now, 30);
        assert_eq!(status, Status::Valid);
        assert_eq!(days, 31);
    }

    #[test]
    fn evaluate_warning_boundary_is_inclusive() {
        let now = 1_700_000_000;
        let (days, status) = evaluate(now + 30 * SECS_PER_DAY, now, 30);
        assert_eq!(status, Status::Warning);
        assert_eq!(days, 30);

        let (days, status) = evaluate(now, now, 30);
        assert_eq!(status, Status::Warning);
        assert_eq!(days, 0);

        // One second short of a full day still floors to the threshold.
        let (days, status) = evaluate(now + 31 * SECS_PER_DAY - 1, now, 30);
        assert_eq!(status, Status::Warning);
        assert_eq!(days, 30);
    }

    #[test]
    fn extract_reads_leaf_fields() {
        let cert = build_self_signed(
            "test.example.com",
            90,
            &["test.example.com", "www.test.example.com"],
        );
        let info = extract(&[cert]).unwrap();

        assert_eq!(info.subject.common_name, "test.example.com");
        assert_eq!(info.subject.organization, "Test Org");
        assert_eq!(info.issuer.common_name, "test.example.com");
        assert_eq!(info.serial_number, "4242");
        assert_eq!(info.version, "2");
        assert_eq!(info.sans, vec!["test.example.com", "www.test.example.com"]);
        assert!(info.is_self_signed);

        let (days, status) = evaluate(info.not_after_unix, unix_now(), 30);
        assert_eq!(status, Status::Valid);
        assert!(days == 89 || days == 90);
    }

    #[test]
    fn extract_fails_on_empty_chain() {
        let err = extract(&[]).unwrap_err();
        assert!(matches!(err, CheckError::CertificateParse { .. }));
    }

    #[test]
    fn check_result_json_round_trip() {
        let cert = build_self_signed("rt.example.com", 10, &["rt.example.com"]);
        let certificate = certificate_info(&cert).unwrap();
        let (days_remaining, status) = evaluate(certificate.not_after_unix, unix_now(), 30);
        let result = CheckResult {
            target: Target::parse("rt.example.com:8443").unwrap(),
            outcome: CheckOutcome::Certificate {
                certificate,
                cipher: Cipher {
                    name: "TLS_AES_256_GCM_SHA384".to_string(),
                    version: "TLSv1.3".to_string(),
                },
                days_remaining,
                status,
            },
        };

        let json = serde_json::to_string(&result).unwrap();
        let parsed: CheckResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
        assert_eq!(parsed.status(), Status::Warning);

        let failed = CheckResult {
            target: Target::parse("down.example.com").unwrap(),
            outcome: CheckOutcome::Error {
                message: "connection refused".to_string(),
            },
        };
        let json = serde_json::to_string(&failed).unwrap();
        let parsed: CheckResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, failed);
        assert_eq!(parsed.status(), Status::Error);
        assert_eq!(parsed.days_remaining(), None);
    }

    #[test]
    #[ignore = "requires network access"]
    fn check_expired_badssl_host() {
        let target = Target::parse("expired.badssl.com").unwrap();
        let result = check_target(&target, Duration::from_secs(30), 30);
        assert_eq!(result.status(), Status::Expired);
        assert!(result.days_remaining().unwrap() < 0);
    }

    #[test]
    #[ignore = "requires network access"]
    fn check_unresolvable_host_reports_error() {
        let target = Target::parse("host.invalid").unwrap();
        let result = check_target(&target, Duration::from_secs(30), 30);
        assert_eq!(result.status(), Status::Error);
        assert!(result.error_message().is_some());
    }
}
