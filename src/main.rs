//! an interactive process monitor.

use {
    anyhow::{Context, anyhow},
    clap::{Parser, ValueEnum},
    std::{fs::File, path::PathBuf, sync::Arc, time::Duration},
    tracing::info,
    tracing_subscriber::filter::LevelFilter,
    vantage::{Config, DashboardController, EventBus, ProcFs, Session, Window, procfs},
};

#[derive(Debug, Parser)]
#[command(name = "vantage", version, about = "an interactive process monitor")]
struct Args {
    /// milliseconds between samples and repaints.
    #[arg(
        short,
        long,
        env = "VANTAGE_INTERVAL_MS",
        default_value_t = 1500,
        value_parser = clap::value_parser!(u64).range(100..=60_000),
    )]
    interval_ms: u64,

    /// append logs to this file. the terminal is taken over, so nothing is logged without it.
    #[arg(long, env = "VANTAGE_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// where procfs is mounted.
    #[arg(long, hide = true, default_value = procfs::ROOT)]
    proc_root: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(&args)?;

    let config = Config::with_interval(Duration::from_millis(args.interval_ms));
    let source = ProcFs::at(&args.proc_root, config.refresh_interval);
    let host = source.host_info();
    info!(?config, os = %host.os, kernel = %host.kernel, "starting");

    let session = Session::enter().context("failed to take over the terminal")?;
    let bus = EventBus::start(&config).context("failed to start the event bus")?;
    let dashboard = DashboardController::new(config, Arc::new(source), Window::stdout(), host);
    let result = dashboard.run(bus);

    // restore the terminal before any error is printed.
    drop(session);
    result.context("the dashboard failed")
}

/// routes logs to the configured file, if any.
fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };

    let level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|error| anyhow!(error))?;

    info!(?level, "logging initialized");
    Ok(())
}
