mod aggregate;
mod buckets;
mod config;
mod record;
mod report;
mod stats;

use clap::Parser;
use config::{AnalyzerConfig, Classifier, MalformedPolicy};
use std::path::PathBuf;

/// Summarize a structured query log: cache hit/miss counters and fetch
/// response latency (mean, p90, p99).
#[derive(Parser, Debug)]
#[command(name = "fetchlog", version, about)]
pub struct Cli {
    /// Log file to read (default: from config, else test.txt)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "fetchlog.toml")]
    config: PathBuf,

    /// Skip and count malformed records instead of aborting
    #[arg(long)]
    skip_malformed: bool,

    /// How to classify records (overrides config)
    #[arg(long, value_enum)]
    classify_by: Option<Classifier>,

    /// Stop after this many seconds of log time (overrides config)
    #[arg(long, value_name = "SECS")]
    max_span: Option<f64>,

    /// Print hit rate, byte ratio and sample ratio
    #[arg(long)]
    ratios: bool,

    /// Print fetch response totals
    #[arg(long)]
    responses: bool,

    /// Track fetch query ranges and print the bucket spread
    #[arg(long)]
    windows: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded config.
    fn apply_overrides(&self, cfg: &mut AnalyzerConfig) {
        if let Some(input) = &self.input {
            cfg.input.path = input.clone();
        }
        if self.skip_malformed {
            cfg.ingest.on_malformed = MalformedPolicy::Skip;
        }
        if let Some(classifier) = self.classify_by {
            cfg.ingest.classify_by = classifier;
        }
        if let Some(span) = self.max_span {
            cfg.ingest.max_span_secs = Some(span);
        }
        if self.ratios {
            cfg.report.ratios = true;
        }
        if self.responses {
            cfg.report.responses = true;
        }
        if self.windows {
            cfg.report.windows = true;
            cfg.ingest.track_windows = true;
        }
    }
}

#[derive(Debug)]
enum RunError {
    Config(config::ConfigError),
    Ingest(aggregate::IngestError),
    Stats(stats::StatsError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{e}"),
            RunError::Ingest(e) => write!(f, "{e}"),
            RunError::Stats(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Ingest(e) => Some(e),
            RunError::Stats(e) => Some(e),
        }
    }
}

fn run(cli: &Cli) -> Result<String, RunError> {
    let mut cfg = config::load_config(&cli.config).map_err(RunError::Config)?;
    cli.apply_overrides(&mut cfg);
    tracing::debug!(?cfg, "resolved config");

    let agg = aggregate::aggregate_file(&cfg.input.path, (&cfg.ingest).into())
        .map_err(RunError::Ingest)?;
    if agg.skipped > 0 {
        tracing::warn!(skipped = agg.skipped, "malformed records were skipped");
    }

    let summary = stats::finalize(&agg.times, &cfg.report.quantiles).map_err(RunError::Stats)?;
    Ok(report::render(&summary, &agg, (&cfg.report).into()))
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    match run(&cli) {
        Ok(text) => print!("{text}"),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn cli_for(dir: &TempDir, input: &str, extra: &[&str]) -> Cli {
        let mut args = vec![
            "fetchlog".to_string(),
            dir.path().join(input).display().to_string(),
            "--config".to_string(),
            dir.path().join("fetchlog.toml").display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::parse_from(args)
    }

    fn write_log(dir: &TempDir, lines: &[&str]) {
        let mut f = std::fs::File::create(dir.path().join("test.txt")).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    #[test]
    fn run_prints_mean_and_quantiles() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            &[
                "server starting",
                r#"{"x":"fetch response","elapsed":1.0}"#,
                r#"{"x":"fetch response","elapsed":3.0}"#,
            ],
        );
        let out = run(&cli_for(&dir, "test.txt", &[])).unwrap();
        let values: Vec<f64> = out
            .trim_end()
            .split(' ')
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], 2.0);
        assert!((values[1] - 2.8).abs() < 1e-9);
        assert!((values[2] - 2.98).abs() < 1e-9);
    }

    #[test]
    fn run_empty_log_fails() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, &[]);
        let err = run(&cli_for(&dir, "test.txt", &[])).unwrap_err();
        assert!(matches!(err, RunError::Stats(stats::StatsError::EmptySeries)));
    }

    #[test]
    fn run_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let err = run(&cli_for(&dir, "absent.txt", &[])).unwrap_err();
        assert!(matches!(err, RunError::Ingest(aggregate::IngestError::Io(_))));
    }

    #[test]
    fn run_malformed_aborts_unless_skipping() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            &["{oops", r#"{"x":"fetch response","elapsed":0.5}"#],
        );
        assert!(matches!(
            run(&cli_for(&dir, "test.txt", &[])),
            Err(RunError::Ingest(_))
        ));
        let out = run(&cli_for(&dir, "test.txt", &["--skip-malformed"])).unwrap();
        assert_eq!(out, "0.5 0.5 0.5\n");
    }

    #[test]
    fn run_uses_config_quantiles_and_ratios() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            &[
                r#"{"x":"cache hit","bytes":10}"#,
                r#"{"x":"fetch response","elapsed":4.0}"#,
            ],
        );
        std::fs::write(
            dir.path().join("fetchlog.toml"),
            "[report]\nquantiles = [0.5]\nratios = true\n",
        )
        .unwrap();
        let out = run(&cli_for(&dir, "test.txt", &[])).unwrap();
        assert!(out.starts_with("4 4\n"));
        assert!(out.contains("Hit Rate: 1\n"));
    }

    #[test]
    fn windows_flag_enables_tracking() {
        let mut cfg = AnalyzerConfig::default();
        let cli = Cli::parse_from(["fetchlog", "--windows", "--classify-by", "msg"]);
        cli.apply_overrides(&mut cfg);
        assert!(cfg.ingest.track_windows);
        assert!(cfg.report.windows);
        assert_eq!(cfg.ingest.classify_by, Classifier::Msg);
        assert_eq!(cfg.input.path, PathBuf::from("test.txt"));
    }
}
