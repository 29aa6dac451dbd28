use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use deploy_monitor::{
    Category,
    actors::Controller,
    collectors::CollectorSet,
    config::{Config, Settings, read_config_file},
    report::{MonitoringReport, SNAPSHOT_REPORT_PREFIX, report_from_state_dir, write_report},
    util::{get_config_path, get_state_dir},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Monitor build and deployment hosts")]
struct Args {
    /// JSON config file (falls back to DEPLOY_MONITOR_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// System sampling interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Minutes to run for, 0 runs until interrupted
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Log everything down to trace level
    #[arg(short, long)]
    verbose: bool,

    /// Directory for the final report
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Only build a report from existing snapshots
    #[arg(long)]
    report_only: bool,
}

fn init(settings: &Settings, verbose: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.state_dir).with_context(|| {
        format!(
            "failed to create state directory {}",
            settings.state_dir.display()
        )
    })?;
    let file = tracing_appender::rolling::daily(&settings.state_dir, "deployment-monitor");
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_target("deploy_monitor", level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(filter)
        .init();

    Ok(guard)
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let config = match args.config.clone().or_else(get_config_path) {
        Some(path) => read_config_file(&path)?,
        None => Config::default(),
    };

    let mut config = Config {
        state_dir: get_state_dir().unwrap_or(config.state_dir),
        output_dir: args.output_dir.clone().unwrap_or(config.output_dir),
        ..config
    };
    if let Some(interval) = args.interval {
        config.intervals.system = interval;
    }

    Ok(config.resolve()?)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = load_settings(&args)?;
    let run_for = run_duration(args.duration)?;
    let _guard = init(&settings, args.verbose)?;
    trace!("started with args: {args:?}");

    let grace = settings.join_timeout;
    block_on_bounded(run(args, settings, run_for), grace)?
}

/// Drive `future` on a multi-threaded runtime, then give blocking work that
/// is still running (a collector past its timeout) at most `grace` before
/// the runtime is torn down.
fn block_on_bounded<F: Future>(future: F, grace: Duration) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

/// `--duration` in minutes; `None` runs until interrupted.
fn run_duration(minutes: u64) -> anyhow::Result<Option<Duration>> {
    if minutes == 0 {
        return Ok(None);
    }
    let secs = minutes
        .checked_mul(60)
        .with_context(|| format!("--duration {minutes} is out of range"))?;
    Ok(Some(Duration::from_secs(secs)))
}

async fn run(args: Args, settings: Settings, run_for: Option<Duration>) -> anyhow::Result<()> {
    if args.report_only {
        let report = report_from_state_dir(&settings)
            .await
            .context("failed to build report from snapshots")?;
        let path = write_report(&report, &settings.output_dir, SNAPSHOT_REPORT_PREFIX).await?;
        print_summary(&report);
        println!("report written to {}", path.display());
        return Ok(());
    }

    let controller = Controller::new(settings)?;
    controller
        .start(CollectorSet::host(controller.settings()))
        .await
        .context("failed to start monitoring")?;

    wait_for_stop(run_for).await;

    if let Some(report) = controller.stop().await {
        print_summary(&report);
    }
    Ok(())
}

/// Resolve once the run duration is over or a termination signal arrived.
async fn wait_for_stop(run_for: Option<Duration>) {
    let elapsed = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = elapsed => info!("monitoring duration elapsed"),
        _ = shutdown_signal() => info!("received shutdown signal"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_summary(report: &MonitoringReport) {
    println!("deployment monitoring summary");
    if let Some(secs) = report.report_info.monitoring_duration_secs {
        println!("  duration: {:.1} minutes", secs as f64 / 60.0);
    }
    for category in Category::ALL {
        if let Some(summary) = report.category(category) {
            println!("  {category}: {} samples", summary.sample_count);
        }
    }
    println!(
        "  alerts: {} ({} critical, {} warning)",
        report.alerts.total, report.alerts.by_severity.critical, report.alerts.by_severity.warning
    );
    for recommendation in &report.recommendations {
        println!("  - {recommendation}");
    }
}
