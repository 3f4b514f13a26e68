use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tempo_core::{
    Priority, ScheduleAt, Scheduler, SchedulerConfig, SchedulerCounts, SchedulerHandle,
    TaskOptions, TaskSnapshot,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Run a demo workload through the task scheduler and print the outcome.
#[derive(Debug, Parser)]
#[command(name = "tempo", version, about)]
struct Args {
    /// TOML file with a `[task_scheduler]` table. Defaults apply without it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of plain blocking tasks to submit.
    #[arg(short = 'n', long, default_value_t = 5)]
    tasks: u32,

    /// Give up waiting for the workload after this many seconds.
    #[arg(long, default_value_t = 30.0)]
    timeout_secs: f64,

    /// Used when RUST_LOG is not set.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Serialize)]
struct Summary {
    counts: SchedulerCounts,
    completed: Vec<TaskSnapshot>,
    failed: Vec<TaskSnapshot>,
    abandoned: usize,
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;
    // logs go to stderr; stdout carries the JSON summary
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.context("failed to initialize logging")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format)?;

    let config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if !(args.timeout_secs.is_finite() && args.timeout_secs > 0.0) {
        bail!("--timeout-secs must be positive");
    }
    info!(?config, "starting task scheduler");

    let scheduler = Scheduler::builder().config(config).build()?;
    scheduler.start()?;

    submit_workload(&scheduler.handle(), args.tasks)?;

    let deadline = Instant::now() + Duration::from_secs_f64(args.timeout_secs);
    while Instant::now() < deadline {
        let counts = scheduler.counts();
        if counts.pending + counts.running == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let handle = scheduler.handle();
    let report = scheduler.shutdown();
    if !report.abandoned.is_empty() {
        warn!(abandoned = ?report.abandoned, "tasks were still running at shutdown");
    }

    let summary = Summary {
        counts: handle.counts(),
        completed: handle.list_completed(),
        failed: handle.list_failed(),
        abandoned: report.abandoned.len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn submit_workload(handle: &SchedulerHandle, tasks: u32) -> Result<()> {
    for i in 0..tasks {
        let priority = match i % 3 {
            0 => Priority::LOW,
            1 => Priority::MEDIUM,
            _ => Priority::HIGH,
        };
        handle.schedule(
            move || {
                std::thread::sleep(Duration::from_millis(100));
                Ok::<_, String>(i * i)
            },
            TaskOptions::new()
                .priority(priority)
                .description(format!("square {i}")),
        )?;
    }

    // fails twice, then succeeds on the third attempt
    let remaining_failures = Arc::new(AtomicU32::new(2));
    handle.schedule(
        move || {
            let left = remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(format!("intentional failure (left={left})"));
            }
            Ok("recovered")
        },
        TaskOptions::new()
            .description("flaky")
            .retry_delay(Duration::from_millis(500)),
    )?;

    handle.schedule(
        || Err::<(), _>("always broken"),
        TaskOptions::new()
            .description("hopeless")
            .max_retries(1)
            .retry_delay(Duration::from_millis(200)),
    )?;

    let greet = handle.async_task_fn("greet", TaskOptions::new(), |name: String| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, String>(format!("Hello, {name}!"))
    });
    greet("tempo".to_string())?;

    handle.schedule(
        || Ok::<_, String>("late"),
        TaskOptions::new()
            .description("delayed")
            .schedule(ScheduleAt::After(Duration::from_secs(1))),
    )?;

    let doomed = handle.schedule(
        || Ok::<_, String>("never"),
        TaskOptions::new()
            .description("cancelled before it runs")
            .schedule(ScheduleAt::After(Duration::from_secs(60))),
    )?;
    handle.cancel(doomed);

    Ok(())
}
