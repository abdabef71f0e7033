//! `curfew daemon`: run the lock daemon in the foreground.
//!
//! Three tasks share one engine handle: the IPC server, the timer driver
//! and the schedule ticker. All of them stop on SIGINT/SIGTERM, after which
//! the lock record is flushed and the socket and pid file are removed.

use crate::cli::DaemonArgs;
use crate::clock::SystemClock;
use crate::collaborators::{
    Collaborators, CommandNotifier, EnforcementGuard, LogNotifier, MarkerGuard, NoopGuard,
    Notifier, StripeVerifier,
};
use crate::config::{Config, EnforcementMode};
use crate::context::DaemonContext;
use crate::engine::{EngineHandle, EngineSettings, LockEngine};
use crate::events::EventLog;
use crate::protocol::Router;
use crate::record::StateStore;
use crate::schedule::{EvaluatorSettings, FileScheduleStore, ScheduleEvaluator};
use crate::server;
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Longest the timer driver sleeps, so wall-clock jumps are noticed.
const MAX_TIMER_SLEEP: Duration = Duration::from_secs(30);

pub fn cmd_daemon(args: DaemonArgs) -> anyhow::Result<()> {
    init_tracing(&args.log_level, args.log_file.as_deref())?;

    let ctx = DaemonContext::resolve(args.home.as_deref())?;
    std::fs::create_dir_all(&ctx.home)
        .with_context(|| format!("failed to create home directory {}", ctx.home.display()))?;
    let config = Config::load(ctx.config_path()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(ctx, config))
}

/// `RUST_LOG` wins over `--log-level`.
fn init_tracing(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn build_collaborators(ctx: &DaemonContext, config: &Config, events: Arc<EventLog>) -> Collaborators {
    let guard: Arc<dyn EnforcementGuard> = match config.enforcement {
        EnforcementMode::Marker => Arc::new(MarkerGuard::new(ctx.marker_path())),
        EnforcementMode::Off => Arc::new(NoopGuard),
    };

    let notifier: Arc<dyn Notifier> = match config
        .notify_command
        .as_deref()
        .and_then(CommandNotifier::parse)
    {
        Some(command) => Arc::new(command),
        None => {
            if config.notify_command.is_some() {
                warn!("notify_command could not be parsed; logging notifications instead");
            }
            Arc::new(LogNotifier)
        }
    };

    Collaborators {
        guard,
        stats: events,
        notifier,
    }
}

async fn run(ctx: DaemonContext, config: Config) -> anyhow::Result<()> {
    let endpoint = ctx.socket_path(&config);
    let listener = server::bind(&endpoint).await?;

    let events = Arc::new(EventLog::new(ctx.events_path()));
    let collaborators = build_collaborators(&ctx, &config, events.clone());
    let notifier = collaborators.notifier.clone();

    let mut engine = LockEngine::new(
        StateStore::new(ctx.state_path()),
        Arc::new(SystemClock),
        collaborators,
        EngineSettings::from(&config),
    );
    match engine.recover() {
        Ok(record) => info!(status = %record.status, "recovered lock state"),
        Err(e) => error!(error = %e, "startup recovery failed; continuing with in-memory state"),
    }

    let verifier = Arc::new(StripeVerifier::new(Duration::from_millis(
        config.payment_verify_timeout_ms,
    )));
    let engine = EngineHandle::new(engine, verifier);

    let schedules = Arc::new(FileScheduleStore::new(ctx.schedules_path()));
    let evaluator = Arc::new(Mutex::new(ScheduleEvaluator::new(
        schedules.clone(),
        notifier,
        EvaluatorSettings::from(&config),
    )));
    let tick_every = Duration::from_secs(config.schedule_tick_seconds);

    let router = Router::new(
        engine.clone(),
        schedules,
        evaluator.clone(),
        events,
        config,
        ctx.config_path(),
    );

    write_pid_file(&ctx.pid_path());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let timer_task = tokio::spawn(drive_timers(engine.clone(), shutdown_rx.clone()));
    let ticker_task = tokio::spawn(tick_schedules(
        engine.clone(),
        evaluator,
        tick_every,
        shutdown_rx.clone(),
    ));

    let server_endpoint = endpoint.clone();
    let mut server_task = tokio::spawn(async move {
        server::run(listener, router, shutdown_rx, &server_endpoint).await
    });

    let server_result = tokio::select! {
        () = shutdown_signal() => None,
        joined = &mut server_task => Some(joined),
    };

    let _ = shutdown_tx.send(true);
    let server_result = match server_result {
        Some(joined) => joined,
        None => server_task.await,
    };
    let _ = timer_task.await;
    let _ = ticker_task.await;

    if let Err(e) = engine.with(|engine| engine.flush()) {
        error!(error = %e, "failed to flush lock record on shutdown");
    }
    remove_endpoint(&endpoint);
    remove_pid_file(&ctx.pid_path());
    info!("daemon stopped");

    match server_result {
        Ok(result) => result.context("IPC server failed"),
        Err(e) => Err(anyhow::anyhow!("IPC server task panicked: {}", e)),
    }
}

/// Sleep until the next deadline, or until the engine re-arms, then fire.
async fn drive_timers(engine: EngineHandle, mut shutdown: watch::Receiver<bool>) {
    loop {
        let wait = timer_wait(engine.with(|engine| engine.next_deadline()), Utc::now());

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = engine.rearmed() => {
                debug!("timers re-armed");
                continue;
            }
            _ = shutdown.changed() => return,
        }

        match engine.with(|engine| engine.fire_timers()) {
            Ok(fired) if !fired.is_empty() => debug!(?fired, "timers fired"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "timer transition failed; retrying on next wake-up"),
        }
    }
}

/// How long the timer driver may sleep. An overdue deadline fires at once.
fn timer_wait(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    deadline.map_or(MAX_TIMER_SLEEP, |deadline| {
        (deadline - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_TIMER_SLEEP)
    })
}

/// Evaluate schedules immediately, then every `every`.
async fn tick_schedules(
    engine: EngineHandle,
    evaluator: Arc<Mutex<ScheduleEvaluator>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => return,
        }

        let result = {
            let mut evaluator = evaluator.lock().unwrap_or_else(|p| p.into_inner());
            evaluator.tick(&engine, &Local::now())
        };
        match result {
            Ok(0) => {}
            Ok(engaged) => info!(engaged, "schedule engaged a lock"),
            Err(e) => warn!(error = %e, "schedule evaluation failed"),
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            warn!("failed to register signal handlers; falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received ctrl-c");
    }
}

fn write_pid_file(path: &Path) {
    match crate::fs::atomic_write_file(path, &std::process::id().to_string()) {
        Ok(()) => debug!(path = %path.display(), "pid file written"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write pid file"),
    }
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove pid file");
    }
}

fn remove_endpoint(path: &Path) {
    if cfg!(unix)
        && let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove socket");
    }
}
