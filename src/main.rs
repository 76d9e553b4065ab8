use std::process::exit;
use std::time::Duration;

use clap::Parser;
use log::debug;

use certcheck::config::Config;
use certcheck::metrics::prom;
use certcheck::report::{self, OutputFormat};
use certcheck::runner::{run_checks, RunOptions};
use certcheck::Target;

/// Exit code for malformed arguments and unusable configuration, matching
/// clap's own code for bad command lines.
const USAGE_EXIT_CODE: i32 = 2;

/// Checks TLS certificates for one or more hosts and reports days until
/// expiry. Exits non-zero when any certificate is expiring, expired, or
/// could not be checked.
#[derive(Parser, Debug)]
#[command(name = "certcheck", version, about)]
struct Args {
    /// Targets to check: host, host:port, or a full URL
    #[arg(value_name = "HOST")]
    hosts: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum)]
    output: Option<OutputFormat>,

    /// Exit code to use when any target is not valid
    #[arg(long)]
    exit_code: Option<i32>,

    /// Days before expiry at which a certificate is flagged as a warning
    #[arg(short = 't', long)]
    threshold: Option<i64>,

    /// Per-target connection timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long)]
    global_timeout: Option<u64>,

    /// Number of targets checked concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Server name to send as SNI instead of each target's hostname
    #[arg(long)]
    sni: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Push metrics to a Prometheus push gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus push gateway address
    #[arg(long)]
    prometheus_address: Option<String>,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let env = env_logger::Env::default().filter_or("RUST_LOG", args.log_level.as_str());
    env_logger::init_from_env(env);

    if args.example_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let mut config = Config::default();
    if let Some(path) = &args.config {
        match Config::from_file(path) {
            Ok(file_config) => config = config.merge_with(file_config),
            Err(e) => {
                eprintln!("certcheck: {e}");
                exit(USAGE_EXIT_CODE);
            }
        }
    }

    let cli_hosts = if args.hosts.is_empty() {
        None
    } else {
        Some(args.hosts.clone())
    };
    config = config.merge_with(Config::from_cli_args(
        cli_hosts,
        args.output.map(|o| o.to_string()),
        args.exit_code,
        args.threshold,
        args.timeout,
        args.global_timeout,
        args.concurrency,
        args.prometheus.then_some(true),
        args.prometheus_address.clone(),
    ));

    let hosts = match config.hosts {
        Some(ref hosts) if !hosts.is_empty() => hosts.clone(),
        _ => {
            eprintln!(
                "certcheck: no targets given; pass at least one host or set `hosts` in the config file"
            );
            exit(USAGE_EXIT_CODE);
        }
    };

    let format = match config
        .output
        .as_deref()
        .unwrap_or("table")
        .parse::<OutputFormat>()
    {
        Ok(format) => format,
        Err(_) => {
            eprintln!(
                "certcheck: unknown output format '{}'; expected table or json",
                config.output.as_deref().unwrap_or("")
            );
            exit(USAGE_EXIT_CODE);
        }
    };

    let mut targets = Vec::with_capacity(hosts.len());
    for spec in &hosts {
        match Target::parse(spec) {
            Ok(target) => {
                let target = match &args.sni {
                    Some(sni) => target.with_sni(sni.clone()),
                    None => target,
                };
                targets.push(target);
            }
            Err(e) => {
                eprintln!("certcheck: {e}");
                exit(USAGE_EXIT_CODE);
            }
        }
    }

    let options = RunOptions {
        concurrency: config.concurrency.unwrap_or(4).max(1),
        timeout: Duration::from_secs(config.timeout.unwrap_or(30)),
        global_timeout: Duration::from_secs(config.global_timeout.unwrap_or(300)),
        threshold_days: config.threshold.unwrap_or(30),
    };
    debug!("checking {} targets: {:?}", targets.len(), options);

    let results = run_checks(&targets, &options);

    if let Some(prometheus) = &config.prometheus {
        if prometheus.enabled.unwrap_or(false) {
            let address = prometheus
                .address
                .as_deref()
                .unwrap_or("http://localhost:9091");
            prom::push_metrics(&results, address);
        }
    }

    if let Err(e) = report::print_report(&results, format) {
        eprintln!("certcheck: failed to render report: {e}");
        exit(config.exit_code.unwrap_or(1));
    }

    exit(report::exit_code(&results, config.exit_code.unwrap_or(1)));
}
