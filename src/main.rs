//! trice - ID registry and log decoder command line
//!
//! - `trice update` assigns IDs to new call sites and refreshes `til.json`
//! - `trice zero` resets all call-site IDs to `0`
//! - `trice log` decodes a binary trace stream into text lines
//! - `trice check` renders every table entry with synthetic parameters

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trice_rs::{
    config::TriceConfig,
    decoder::{check_table, derive_key, key_hex, Dataset, Decoder, Endianness, FrameFormat},
    emitter::{LineComposer, LineSink, TimestampFormat, WriterSink},
    id::{self, FormatTable, IdPolicy, SourceWalker},
    pipeline::DecodePipeline,
};

/// Read timeout on TCP input, bounds how long a stop request waits
const TCP_READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "trice")]
#[command(about = "ID registry and decoder for compact embedded trice logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file, overrides $TRICE_CONFIG and trice.toml lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write diagnostics to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More diagnostics (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign IDs to new call sites and update the ID tables
    Update(UpdateArgs),

    /// Reset every call-site ID in the source trees to 0
    Zero {
        /// Source tree (repeatable)
        #[arg(short, long = "src")]
        sources: Vec<PathBuf>,
        /// Only report what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Decode a binary trace stream
    Log(LogArgs),

    /// Render every table entry with synthetic parameters
    Check {
        /// Format table file
        #[arg(long)]
        til: Option<PathBuf>,
        /// Parameter set: position | negative
        #[arg(long, default_value = "position")]
        dataset: Dataset,
    },
}

#[derive(Args)]
struct UpdateArgs {
    /// Source tree (repeatable)
    #[arg(short, long = "src")]
    sources: Vec<PathBuf>,
    /// Format table file
    #[arg(long)]
    til: Option<PathBuf>,
    /// Location table file, `off` disables it
    #[arg(long)]
    li: Option<PathBuf>,
    /// Do not write sources or the format table
    #[arg(long)]
    dry_run: bool,
    /// Smallest allocatable ID
    #[arg(long)]
    min: Option<u32>,
    /// Largest allocatable ID
    #[arg(long)]
    max: Option<u32>,
    /// Allocation order: upward | downward
    #[arg(long)]
    policy: Option<IdPolicy>,
    /// Also write reused IDs into sharing call sites
    #[arg(long)]
    share_rewrite: bool,
}

#[derive(Args)]
struct LogArgs {
    /// Input file, `-` for stdin
    #[arg(short, long, default_value = "-", conflicts_with = "tcp")]
    input: String,
    /// Read from a TCP server instead (HOST:PORT)
    #[arg(long)]
    tcp: Option<String>,
    /// Format table file
    #[arg(long)]
    til: Option<PathBuf>,
    /// Decryption pass-phrase, `none` disables decryption
    #[arg(long)]
    password: Option<String>,
    /// Log the derived key
    #[arg(long)]
    show_key: bool,
    /// Frame encoding: type_derived | explicit_length
    #[arg(long)]
    encoding: Option<FrameFormat>,
    /// Device byte order: little | big
    #[arg(long)]
    endianness: Option<Endianness>,
    /// Host timestamp: LOCmicro | UTCmicro | off | zero | any text
    #[arg(long)]
    timestamp: Option<String>,
    #[arg(long)]
    prefix: Option<String>,
    #[arg(long)]
    suffix: Option<String>,
    /// Show the device timestamp column
    #[arg(long)]
    target_stamp: bool,
    /// Write lines to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("trice: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr layer and, with `--log-file`, a non-blocking file layer
fn init_logging(
    verbose: u8,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_filter = match verbose {
        0 => "info,trice_rs=info",
        1 => "info,trice_rs=debug",
        _ => "debug,trice_rs=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .with_context(|| format!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::NEVER)
                .filename_prefix(name.to_string_lossy())
                .build(dir.unwrap_or_else(|| Path::new(".")))
                .with_context(|| format!("opening log file {:?}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = TriceConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Update(args) => cmd_update(&mut config, args),
        Command::Zero { sources, dry_run } => cmd_zero(&mut config, sources, dry_run),
        Command::Log(args) => cmd_log(&mut config, args),
        Command::Check { til, dataset } => cmd_check(&config, til, dataset),
    }
}

// ==================== Commands ====================

fn cmd_update(config: &mut TriceConfig, args: UpdateArgs) -> anyhow::Result<()> {
    if !args.sources.is_empty() {
        config.id.sources = args.sources;
    }
    if let Some(til) = args.til {
        config.id.til = til;
    }
    if let Some(li) = args.li {
        config.id.li = li;
    }
    if let Some(min) = args.min {
        config.id.min = min;
    }
    if let Some(max) = args.max {
        config.id.max = max;
    }
    if let Some(policy) = args.policy {
        config.id.policy = policy;
    }
    config.id.dry_run |= args.dry_run;
    config.id.share_rewrite |= args.share_rewrite;
    config.validate()?;

    let walker = SourceWalker::new(config.id.sources.clone());
    let report = id::update(config.sync_options(), &walker)?;

    for (id, fmt) in &report.added {
        tracing::info!("New ID {}: {}", id, fmt);
    }
    if config.id.dry_run {
        for name in &report.changed {
            tracing::info!("Would change {}", name);
        }
    }
    if !report.collisions.is_empty() {
        tracing::warn!(
            "{} ID collisions left unresolved, see warnings above",
            report.collisions.len()
        );
    }
    Ok(())
}

fn cmd_zero(config: &mut TriceConfig, sources: Vec<PathBuf>, dry_run: bool) -> anyhow::Result<()> {
    if !sources.is_empty() {
        config.id.sources = sources;
    }
    let dry_run = dry_run || config.id.dry_run;
    let walker = SourceWalker::new(config.id.sources.clone());
    let report = id::zero_source_tree(&walker, dry_run);

    for e in &report.errors {
        tracing::warn!("{}", e);
    }
    tracing::info!(
        "{} {} IDs in {} files",
        if dry_run { "Would zero" } else { "Zeroed" },
        report.zeroed,
        report.changed.len()
    );
    Ok(())
}

fn cmd_log(config: &mut TriceConfig, args: LogArgs) -> anyhow::Result<()> {
    if let Some(til) = args.til {
        config.id.til = til;
    }
    if let Some(password) = args.password {
        config.log.password = password;
    }
    if let Some(encoding) = args.encoding {
        config.log.encoding = encoding;
    }
    if let Some(endianness) = args.endianness {
        config.log.endianness = endianness;
    }
    if let Some(timestamp) = args.timestamp {
        config.log.timestamp = timestamp;
    }
    if let Some(prefix) = args.prefix {
        config.log.prefix = prefix;
    }
    if let Some(suffix) = args.suffix {
        config.log.suffix = suffix;
    }
    config.log.target_stamp |= args.target_stamp;
    config.validate()?;

    if args.show_key {
        match derive_key(&config.log.password) {
            Some(key) => tracing::info!("Encryption key: {}", key_hex(&key)),
            None => tracing::info!("No encryption"),
        }
    }

    let table = FormatTable::load(&config.id.til)?;
    tracing::info!("{} formats loaded from {:?}", table.len(), config.id.til);
    let decoder = Decoder::new(table, config.framer_config());

    let sink: Box<dyn LineSink> = match &args.output {
        Some(path) => Box::new(WriterSink::create(path)?),
        None => Box::new(WriterSink::stdout()),
    };
    let composer = LineComposer::new(
        sink,
        config.timestamp_format(),
        &config.log.prefix,
        &config.log.suffix,
    );

    let source = open_source(&args.input, args.tcp.as_deref())?;
    let pipeline = DecodePipeline::new(config.pipeline_options());
    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("installing Ctrl-C handler")?;

    pipeline.run(source, decoder, composer)?;
    Ok(())
}

fn cmd_check(config: &TriceConfig, til: Option<PathBuf>, dataset: Dataset) -> anyhow::Result<()> {
    let til = til.unwrap_or_else(|| config.id.til.clone());
    let table = FormatTable::load(&til)?;

    let mut composer = LineComposer::new(WriterSink::stdout(), TimestampFormat::Off, "", "");
    let mut mismatches = 0usize;
    for (id, outcome) in check_table(&table, dataset) {
        if let Some(mismatch) = &outcome.mismatch {
            tracing::warn!("ID {}: {}", id, mismatch);
            mismatches += 1;
        }
        composer.write(&outcome.text)?;
    }
    composer.flush()?;

    tracing::info!("{} entries checked, {} mismatches", table.len(), mismatches);
    Ok(())
}

/// Open the byte source for `trice log`
fn open_source(input: &str, tcp: Option<&str>) -> anyhow::Result<Box<dyn Read + Send>> {
    if let Some(addr) = tcp {
        let stream =
            TcpStream::connect(addr).with_context(|| format!("connecting to {}", addr))?;
        stream
            .set_read_timeout(Some(TCP_READ_TIMEOUT))
            .context("setting TCP read timeout")?;
        tracing::info!("Reading from tcp://{}", addr);
        return Ok(Box::new(stream));
    }
    if input == "-" {
        tracing::info!("Reading from stdin");
        return Ok(Box::new(std::io::stdin()));
    }
    let file = std::fs::File::open(input).with_context(|| format!("opening {}", input))?;
    tracing::info!("Reading from {}", input);
    Ok(Box::new(file))
}
