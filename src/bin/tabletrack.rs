//! tabletrack CLI - Command-line interface for the coaster tracking core
//!
//! Commands:
//! - replay: Run a recorded contact stream and emit one frame per tick
//! - validate: Validate a recorded contact stream
//! - catalog: Print the token catalog and derived radii
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabletrack::projector::FrameSnapshot;
use tabletrack::schema::{ContactRecordAdapter, ReplayOptions, SCHEMA_VERSION};
use tabletrack::{Catalog, SurfaceProcessor, TrackerConfig, TrackingError};
use tabletrack::{PRODUCER_NAME, TABLETRACK_VERSION};

/// tabletrack - Identity tracking for physical tokens on a touch table
#[derive(Parser)]
#[command(name = "tabletrack")]
#[command(version = TABLETRACK_VERSION)]
#[command(about = "Track touch-table coasters from raw contact streams", long_about = None)]
struct Cli {
    /// Tracker configuration JSON (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Token catalog JSON (the built-in catalog is used when omitted)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Override the ghost grace window in milliseconds
    #[arg(long, global = true)]
    grace_ms: Option<i64>,

    /// Log filter, e.g. "debug" or "tabletrack=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded contact stream and emit frame snapshots
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Simulated frame period in milliseconds (defaults to the configured interval)
        #[arg(long)]
        frame_ms: Option<u64>,

        /// Keep ticking this long after the last record
        #[arg(long, default_value = "0")]
        tail_ms: u64,

        /// Include contacts and clusters in every frame
        #[arg(long)]
        debug: bool,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate a recorded contact stream
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the token catalog and the derived radii
    Catalog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

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

/// Logs go to stderr; stdout carries only frame output
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tabletrack=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    let config_path = cli.config.as_deref();
    let catalog_path = cli.catalog.as_deref();
    let grace_ms = cli.grace_ms;

    match cli.command {
        Commands::Replay {
            input,
            output,
            frame_ms,
            tail_ms,
            debug,
            output_format,
        } => {
            let (config, catalog) = load_setup(config_path, catalog_path, grace_ms)?;
            cmd_replay(
                &input,
                &output,
                config,
                catalog,
                frame_ms,
                tail_ms,
                debug,
                &output_format,
            )
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Catalog { json } => {
            let (config, catalog) = load_setup(config_path, catalog_path, grace_ms)?;
            cmd_catalog(&config, &catalog, json)
        }

        Commands::Doctor { json } => cmd_doctor(config_path, catalog_path, grace_ms, json),
    }
}

fn load_config(path: Option<&Path>, grace_ms: Option<i64>) -> Result<TrackerConfig, CliFailure> {
    let mut config = match path {
        Some(path) => TrackerConfig::from_json(&fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };
    if let Some(grace_ms) = grace_ms {
        config.ghost_grace_ms = grace_ms;
        config.validate()?;
    }
    Ok(config)
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog, CliFailure> {
    match path {
        Some(path) => Ok(Catalog::from_json(&fs::read_to_string(path)?)?),
        None => Ok(Catalog::default()),
    }
}

fn load_setup(
    config_path: Option<&Path>,
    catalog_path: Option<&Path>,
    grace_ms: Option<i64>,
) -> Result<(TrackerConfig, Catalog), CliFailure> {
    let config = load_config(config_path, grace_ms)?;
    let catalog = load_catalog(catalog_path)?;
    catalog.validate(config.min_cluster_size)?;
    Ok((config, catalog))
}

fn read_input(input: &Path) -> Result<String, CliFailure> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &Path,
    output: &Path,
    config: TrackerConfig,
    catalog: Catalog,
    frame_ms: Option<u64>,
    tail_ms: u64,
    debug: bool,
    output_format: &OutputFormat,
) -> Result<(), CliFailure> {
    let records = ContactRecordAdapter::parse(&read_input(input)?)?;
    if records.is_empty() {
        return Err(CliFailure::NoRecords);
    }

    let options = ReplayOptions {
        frame_interval: millis(frame_ms.unwrap_or(config.frame_interval_ms), "frame interval")?,
        tail: millis(tail_ms, "tail")?,
    };
    let mut processor = SurfaceProcessor::with_config(config, catalog)?;
    processor.set_debug(debug);

    let mut writer: Box<dyn Write> = if output.to_string_lossy() == "-" {
        Box::new(io::BufWriter::new(io::stdout().lock()))
    } else {
        Box::new(io::BufWriter::new(fs::File::create(output)?))
    };

    let frames = match output_format {
        OutputFormat::Ndjson => {
            // stream frames as they are produced
            let mut write_error: Option<CliFailure> = None;
            let count = ContactRecordAdapter::replay_with(&records, &mut processor, &options, |frame| {
                if write_error.is_none() {
                    if let Err(e) = write_ndjson_line(&mut writer, &frame) {
                        write_error = Some(e);
                    }
                }
            })?;
            if let Some(e) = write_error {
                return Err(e);
            }
            count
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let frames = ContactRecordAdapter::replay(&records, &mut processor, &options)?;
            let data = if matches!(output_format, OutputFormat::JsonPretty) {
                serde_json::to_string_pretty(&frames)?
            } else {
                serde_json::to_string(&frames)?
            };
            writeln!(writer, "{}", data)?;
            frames.len()
        }
    };
    writer.flush()?;

    info!(
        records = records.len(),
        frames,
        objects = processor.objects().len(),
        "replay complete"
    );
    Ok(())
}

fn millis(value: u64, what: &str) -> Result<chrono::Duration, CliFailure> {
    let ms = i64::try_from(value)
        .map_err(|_| TrackingError::InvalidConfig(format!("replay {what} of {value} ms is out of range")))?;
    Ok(chrono::Duration::milliseconds(ms))
}

fn write_ndjson_line(writer: &mut dyn Write, frame: &FrameSnapshot) -> Result<(), CliFailure> {
    serde_json::to_writer(&mut *writer, frame)?;
    writeln!(writer)?;
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), CliFailure> {
    let records = ContactRecordAdapter::parse(&read_input(input)?)?;
    let results = ContactRecordAdapter::validate_records(&records);

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Schema:          {}", report.schema_version);
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(CliFailure::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_catalog(config: &TrackerConfig, catalog: &Catalog, json: bool) -> Result<(), CliFailure> {
    let report = CatalogReport {
        token_radius_px: config.token_radius_px(),
        cluster_radius_px: config.cluster_radius_px(),
        match_radius_px: config.match_radius_px(),
        ghost_grace_ms: config.ghost_grace_ms,
        tokens: catalog.clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Token Catalog");
        println!("=============");
        for token in &report.tokens.tokens {
            println!(
                "  {:<10} {:>2} contacts  {:<16} effect: {}",
                token.type_id,
                token.contact_count,
                token.name,
                token.effect_key.as_deref().unwrap_or("-")
            );
        }
        println!();
        println!("Token radius:   {:.2} px", report.token_radius_px);
        println!("Cluster radius: {:.2} px", report.cluster_radius_px);
        println!("Match radius:   {:.2} px", report.match_radius_px);
        println!("Ghost grace:    {} ms", report.ghost_grace_ms);
    }
    Ok(())
}

fn cmd_doctor(
    config_path: Option<&Path>,
    catalog_path: Option<&Path>,
    grace_ms: Option<i64>,
    json: bool,
) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("tabletrack version {}", TABLETRACK_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Replay schema: {}", SCHEMA_VERSION),
    });

    let config = match load_config(config_path, grace_ms) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: match config_path {
                    Some(path) => format!("Configuration {} is valid", path.display()),
                    None => "Using default configuration".to_string(),
                },
            });
            checks.extend(config.warnings().into_iter().map(|message| DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message,
            }));
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    let min_cluster_size = config
        .as_ref()
        .map(|c| c.min_cluster_size)
        .unwrap_or_else(|| TrackerConfig::default().min_cluster_size);
    match load_catalog(catalog_path).and_then(|c| {
        c.validate(min_cluster_size)?;
        Ok(c)
    }) {
        Ok(catalog) => checks.push(DoctorCheck {
            name: "catalog".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} token types", catalog.len()),
        }),
        Err(e) => checks.push(DoctorCheck {
            name: "catalog".to_string(),
            status: CheckStatus::Error,
            message: CliError::from(e).message,
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TABLETRACK_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("tabletrack Doctor Report");
        println!("========================");
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
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Tracking(TrackingError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<TrackingError> for CliFailure {
    fn from(e: TrackingError) -> Self {
        CliFailure::Tracking(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Tracking(e) => {
                let (code, hint) = match &e {
                    TrackingError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'tabletrack doctor --config <file>'")
                    }
                    TrackingError::InvalidCatalog(_) => {
                        ("CATALOG_ERROR", "Run 'tabletrack doctor --catalog <file>'")
                    }
                    TrackingError::ParseError(_) | TrackingError::JsonError(_) => (
                        "PARSE_ERROR",
                        "Ensure input matches surface.contact_event.v1 schema",
                    ),
                    _ => ("TRACKING_ERROR", "Run 'tabletrack doctor' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CliFailure::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct CatalogReport {
    token_radius_px: f64,
    cluster_radius_px: f64,
    match_radius_px: f64,
    ghost_grace_ms: i64,
    #[serde(flatten)]
    tokens: Catalog,
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
