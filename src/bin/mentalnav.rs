//! Mentalnav CLI - Command-line interface for Mentalnav Metrics
//!
//! Commands:
//! - participants: List participants that completed the session
//! - metrics: Compute the chart-ready report for one participant
//! - durations: Print the derived reaction and movement tables
//! - export: Write the raw tables of one participant as an xlsx workbook
//! - doctor: Diagnose configuration and data directory health

use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mentalnav_metrics::config::{self, DashboardConfig, ENV_DATA_DIR, ENV_JITTER_SEED};
use mentalnav_metrics::encoder::REPORT_VERSION;
use mentalnav_metrics::export::SHEET_NAMES;
use mentalnav_metrics::jitter::MAX_JITTER_AMPLITUDE_S;
use mentalnav_metrics::types::{CategoryFilter, SpeedBand};
use mentalnav_metrics::{
    AnalysisOptions, DataSource, JsonDirSource, MetricsProcessor, PipelineError, PRODUCER_NAME,
    VERSION,
};

/// Mentalnav - Timing metrics for the mental-navigation experiment
#[derive(Parser)]
#[command(name = "mentalnav")]
#[command(version = VERSION)]
#[command(about = "Analyze mental-navigation trial timing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of participant documents (overrides config and environment)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List participants that completed the session
    Participants {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the metrics report for one participant
    Metrics {
        /// Participant identifier
        #[arg(short, long)]
        participant: String,

        /// Trial category (all, mental, visual)
        #[arg(long)]
        category: Option<CategoryFilter>,

        /// Jitter seed for reproducible point positions
        #[arg(long)]
        seed: Option<u64>,

        /// Jitter half-width in seconds (0 disables jitter)
        #[arg(long)]
        jitter: Option<f64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Print the derived duration tables for one participant
    Durations {
        /// Participant identifier
        #[arg(short, long)]
        participant: String,
    },

    /// Export a participant's raw tables as an xlsx workbook
    Export {
        /// Participant identifier
        #[arg(short, long)]
        participant: String,

        /// Output workbook path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Diagnose configuration and data directory health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), MentalnavCliError> {
    let mut loaded = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        loaded.data_dir = dir;
    }
    let config = config::init(loaded)?;
    log::debug!("data directory: {}", config.data_dir.display());

    match cli.command {
        Commands::Participants { json } => cmd_participants(config, json),

        Commands::Metrics {
            participant,
            category,
            seed,
            jitter,
            output,
            pretty,
        } => {
            let mut options = AnalysisOptions::from(config);
            if let Some(category) = category {
                options.category = category;
            }
            if let Some(seed) = seed {
                options.jitter_seed = Some(seed);
            }
            if let Some(amplitude) = jitter {
                options.jitter_amplitude_s = amplitude;
            }
            cmd_metrics(config, &participant, &options, &output, pretty)
        }

        Commands::Durations { participant } => cmd_durations(config, &participant),

        Commands::Export {
            participant,
            output,
        } => cmd_export(config, &participant, &output),

        Commands::Doctor { json } => cmd_doctor(config, json),
    }
}

fn processor(config: &DashboardConfig) -> MetricsProcessor {
    MetricsProcessor::new(Box::new(JsonDirSource::new(&config.data_dir)))
}

fn cmd_participants(config: &DashboardConfig, json: bool) -> Result<(), MentalnavCliError> {
    let ids = processor(config).participants()?;

    if json {
        println!("{}", serde_json::to_string(&ids)?);
    } else {
        for id in &ids {
            println!("{id}");
        }
    }
    Ok(())
}

fn cmd_metrics(
    config: &DashboardConfig,
    participant: &str,
    options: &AnalysisOptions,
    output: &Path,
    pretty: bool,
) -> Result<(), MentalnavCliError> {
    if !(0.0..=MAX_JITTER_AMPLITUDE_S).contains(&options.jitter_amplitude_s) {
        return Err(MentalnavCliError::InvalidArgument(format!(
            "--jitter must be between 0 and {MAX_JITTER_AMPLITUDE_S}, got {}",
            options.jitter_amplitude_s
        )));
    }

    let json = processor(config).report_json(participant, options, pretty)?;
    write_output(output, json.as_bytes())
}

fn cmd_durations(config: &DashboardConfig, participant: &str) -> Result<(), MentalnavCliError> {
    let durations = processor(config).durations(participant)?;

    let table = DurationTables {
        participant_id: participant.to_string(),
        reaction: durations
            .reaction_table()
            .into_iter()
            .map(|row| (row.trial_number, row.duration_ms))
            .collect(),
        movement: durations
            .movement_table()
            .into_iter()
            .map(|row| (row.trial_number, row.duration_ms))
            .collect(),
        incomplete: durations
            .incomplete
            .iter()
            .map(|trial| trial.trial_number)
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn cmd_export(
    config: &DashboardConfig,
    participant: &str,
    output: &Path,
) -> Result<(), MentalnavCliError> {
    let blob = processor(config).export(participant)?;
    fs::write(output, blob.as_slice())?;
    log::info!("{participant}: wrote {} bytes to {}", blob.len(), output.display());
    Ok(())
}

fn cmd_doctor(config: &DashboardConfig, json: bool) -> Result<(), MentalnavCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{PRODUCER_NAME} {VERSION}, report schema {REPORT_VERSION}"),
    });

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "category {}, jitter {} s, seed {}, reaction ceiling {} s",
            config.category.as_str(),
            config.jitter.amplitude_s,
            config
                .jitter
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "random".to_string()),
            config.reaction_ceiling_s
        ),
    });

    for key in [ENV_DATA_DIR, ENV_JITTER_SEED] {
        if let Ok(value) = std::env::var(key) {
            checks.push(DoctorCheck {
                name: "environment".to_string(),
                status: CheckStatus::Ok,
                message: format!("{key}={value}"),
            });
        }
    }

    let source = JsonDirSource::new(&config.data_dir);
    if source.dir().is_dir() {
        match source.participant_ids() {
            Ok(ids) if ids.is_empty() => checks.push(DoctorCheck {
                name: "participants".to_string(),
                status: CheckStatus::Warning,
                message: format!("No completed participants in {}", source.dir().display()),
            }),
            Ok(ids) => checks.push(DoctorCheck {
                name: "participants".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} completed participants", ids.len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "participants".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot list participants: {e}"),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("Data directory {} does not exist", source.dir().display()),
        });
    }

    let bands: Vec<String> = [20, 15]
        .into_iter()
        .filter_map(|step| {
            SpeedBand::from_step_size(step).map(|band| format!("{} (step {step})", band.label()))
        })
        .collect();
    checks.push(DoctorCheck {
        name: "speed_bands".to_string(),
        status: CheckStatus::Ok,
        message: format!("Speed bands: {}", bands.join(", ")),
    });

    checks.push(DoctorCheck {
        name: "export".to_string(),
        status: CheckStatus::Ok,
        message: format!("Workbook sheets: {}", SHEET_NAMES.join(", ")),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Mentalnav Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MentalnavCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<(), MentalnavCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    } else {
        fs::write(output, bytes)?;
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum MentalnavCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<io::Error> for MentalnavCliError {
    fn from(e: io::Error) -> Self {
        MentalnavCliError::Io(e)
    }
}

impl From<PipelineError> for MentalnavCliError {
    fn from(e: PipelineError) -> Self {
        MentalnavCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for MentalnavCliError {
    fn from(e: serde_json::Error) -> Self {
        MentalnavCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MentalnavCliError> for CliError {
    fn from(e: MentalnavCliError) -> Self {
        match e {
            MentalnavCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MentalnavCliError::Pipeline(e) => {
                let (code, hint) = match &e {
                    PipelineError::SourceFetchFailure { .. } => (
                        "SOURCE_FETCH_FAILURE",
                        "Run 'mentalnav participants' to list available participants",
                    ),
                    PipelineError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Check the configuration file and environment")
                    }
                    PipelineError::ExportError(_) => {
                        ("EXPORT_ERROR", "Check the output path and table contents")
                    }
                    PipelineError::Io(_) => ("IO_ERROR", "Check the data directory"),
                    PipelineError::ParseError(_) | PipelineError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure the participant document is well formed")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            MentalnavCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            MentalnavCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Run with --help for usage".to_string()),
            },
            MentalnavCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DurationTables {
    participant_id: String,
    /// (trial number, milliseconds)
    reaction: Vec<(u32, f64)>,
    movement: Vec<(u32, f64)>,
    incomplete: Vec<u32>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
