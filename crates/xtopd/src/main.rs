//! xtopd - Linux performance console diagnosis daemon.
//!
//! Drives `Orchestrator::tick()` on an interval, writes the rolling
//! `current.jsonl` summary and the incident event log under the daemon state
//! directory, and logs a one-line health summary per tick. No TUI, exporter,
//! or alert transport lives here (out of scope) — this binary only
//! exercises the diagnosis pipeline end to end.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system.
/// Uses jemalloc's arena purge to reduce RSS after memory-intensive operations.
fn release_memory_to_os() {
    // SAFETY: We're calling jemalloc's mallctl with valid arguments.
    unsafe {
        tikv_jemalloc_sys::mallctl(
            c"arena.0.purge".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        );
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use xtop_core::alert::Health;
use xtop_core::analysis::AnalysisResult;
use xtop_core::collector::{Collector, CollectorRegistry, MockCollector};
use xtop_core::config::{
    Config, Profile, current_summary_path, daemon_state_dir, events_log_path, incident_path,
    pid_file_path,
};
use xtop_core::errors::CollectError;
use xtop_core::events::JsonlEventLog;
use xtop_core::model::Snapshot;
use xtop_core::orchestrator::Orchestrator;

/// Linux performance console diagnosis daemon.
#[derive(Parser)]
#[command(name = "xtopd", about = "Root-cause diagnosis daemon for Linux performance", version)]
struct Args {
    /// Collection interval in seconds.
    #[arg(short, long, default_value = "2")]
    interval: u64,

    /// Number of snapshots retained in the in-memory ring history.
    #[arg(long, default_value = "900")]
    history_size: usize,

    /// State directory (daemon.pid, events.jsonl, incidents/, current.jsonl).
    /// Defaults to `$XDG_CONFIG_HOME/xtop` or `~/.xtop`.
    #[arg(long)]
    state_dir: Option<String>,

    /// Force a built-in threshold profile (database, network, mixed, compute, gateway)
    /// instead of running with unmodified default thresholds.
    #[arg(long)]
    profile: Option<String>,

    /// Mask IP addresses inside evidence messages and narrative text.
    #[arg(long)]
    mask_ip: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Run a fixed number of ticks then exit (0 = run forever).
    #[arg(long, default_value = "0")]
    max_ticks: u64,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("xtopd={}", level).parse().unwrap())
        .add_directive(format!("xtop_core={}", level).parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// One-line description of a snapshot's shape for logging.
fn describe_snapshot(snapshot: &Snapshot) -> String {
    format!(
        "{} cpus, {} processes, {} disks, {} mounts, {} interfaces, {} errors",
        snapshot.cpus.len(),
        snapshot.processes.len(),
        snapshot.disks.len(),
        snapshot.mounts.len(),
        snapshot.interfaces.len(),
        snapshot.errors.len(),
    )
}

fn describe_result(result: &AnalysisResult) -> String {
    match &result.primary_bottleneck {
        Some(b) => format!(
            "health={:?} primary={} score={:.1} culprit={}",
            result.health,
            b,
            result.primary_score,
            result.culprit.as_deref().unwrap_or("-"),
        ),
        None => format!("health={:?}", result.health),
    }
}

/// Registers the collectors this daemon runs each tick. Real procfs/sysfs/
/// eBPF readers are out of scope for `xtop-core`; this registers a
/// single no-op placeholder collector so the orchestrator has at least one
/// registered source, the same shape a real deployment would wire concrete
/// collectors into.
fn build_collector_registry() -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.register(Box::new(MockCollector::new("placeholder", |_: &mut Snapshot| {
        Ok::<(), CollectError>(())
    })));
    registry
}

/// Appends one compact line to the rolling `current.jsonl` summary, rotating
/// to `current.jsonl.old` at the 10 MiB threshold.
fn write_current_summary(path: &std::path::Path, result: &AnalysisResult) {
    const ROTATE_BYTES: u64 = 10 * 1024 * 1024;

    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > ROTATE_BYTES {
            let rotated = path.with_extension("jsonl.old");
            if let Err(e) = fs::rename(path, &rotated) {
                warn!(error = %e, "failed to rotate current.jsonl");
            }
        }
    }

    let line = match serde_json::to_string(result) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "failed to serialize current summary");
            return;
        }
    };
    let file = OpenOptions::new().create(true).append(true).open(path);
    match file {
        Ok(mut f) => {
            if let Err(e) = writeln!(f, "{line}") {
                warn!(error = %e, "failed to append current summary");
            }
        }
        Err(e) => warn!(error = %e, "failed to open current.jsonl"),
    }
}

/// Writes a full incident snapshot for a closed event, named by its end time.
fn write_incident_snapshot(state_dir: &std::path::Path, event: &xtop_core::events::Event) {
    let iso = chrono::DateTime::from_timestamp(event.end_time.unwrap_or(event.start_time), 0)
        .map(|dt| dt.format("%Y-%m-%dT%H-%M-%SZ").to_string())
        .unwrap_or_else(|| event.start_time.to_string());
    let path = incident_path(state_dir, &iso);
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(error = %e, "failed to create incidents directory");
            return;
        }
    }
    match serde_json::to_vec_pretty(event) {
        Ok(bytes) => {
            if let Err(e) = fs::write(&path, bytes) {
                warn!(error = %e, path = %path.display(), "failed to write incident snapshot");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize incident snapshot"),
    }
}

fn write_pid_file(path: &std::path::Path) {
    match File::create(path) {
        Ok(mut f) => {
            if let Err(e) = writeln!(f, "{}", std::process::id()) {
                warn!(error = %e, "failed to write pid file");
            }
        }
        Err(e) => warn!(error = %e, "failed to create pid file"),
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let state_dir = args
        .state_dir
        .map(std::path::PathBuf::from)
        .unwrap_or_else(daemon_state_dir);
    if let Err(e) = fs::create_dir_all(&state_dir) {
        error!(error = %e, dir = %state_dir.display(), "failed to create state directory");
        std::process::exit(1);
    }

    let mut cfg = Config { interval_sec: args.interval.max(1), history_size: args.history_size, ..Config::default() };
    cfg.mask_ip = args.mask_ip;
    if let Some(name) = &args.profile {
        match Profile::parse(name) {
            Some(profile) => {
                cfg.apply_profile(profile);
                info!("applied threshold profile: {name}");
            }
            None => {
                error!("unknown threshold profile: {name}");
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = cfg.validate() {
        error!(error = %e, "configuration error, refusing to start");
        std::process::exit(1);
    }

    info!("xtopd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, history_size={}, state_dir={}",
        cfg.interval_sec,
        cfg.history_size,
        state_dir.display()
    );

    write_pid_file(&pid_file_path(&state_dir));

    let event_log = Box::new(JsonlEventLog::new(events_log_path(&state_dir), 10 * 1024 * 1024));
    let registry = build_collector_registry();
    let orchestrator = Orchestrator::new(registry, cfg, event_log, std::process::id());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to set Ctrl-C handler");
    }

    let interval = Duration::from_secs(args.interval.max(1));
    let current_path = current_summary_path(&state_dir);

    info!("starting diagnosis loop");
    let mut tick_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let now = chrono::Utc::now().timestamp();
        let (outcome, soft_errors) = orchestrator.tick(now);

        for e in &soft_errors {
            debug!(error = %e, "soft collector failure");
        }
        debug!("snapshot: {}", describe_snapshot(&outcome.snapshot));

        if let Some(result) = &outcome.result {
            info!("{}", describe_result(result));
            if result.health >= Health::Degraded {
                warn!("{}", result.narrative.as_deref().unwrap_or("no narrative available"));
            }
            write_current_summary(&current_path, result);
        } else {
            debug!("first tick: no rates/result yet");
        }

        if let Some(event) = &outcome.closed_event {
            info!(
                "event closed: {} lasted {}s, peak score {:.1}",
                event.bottleneck,
                event.duration_secs.unwrap_or(0),
                event.peak_score
            );
            write_incident_snapshot(&state_dir, event);
        }

        tick_count += 1;
        if tick_count.is_multiple_of(60) {
            release_memory_to_os();
            debug!("memory released after 60 ticks");
        }
        if args.max_ticks > 0 && tick_count >= args.max_ticks {
            info!("reached max_ticks={}, stopping", args.max_ticks);
            break;
        }

        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    if let Err(e) = fs::remove_file(pid_file_path(&state_dir)) {
        debug!(error = %e, "pid file already removed");
    }
    info!("shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_snapshot_counts_each_collection() {
        let snap = Snapshot::default();
        let desc = describe_snapshot(&snap);
        assert!(desc.contains("0 cpus"));
        assert!(desc.contains("0 processes"));
    }

    #[test]
    fn build_collector_registry_registers_at_least_one_collector() {
        let registry = build_collector_registry();
        assert!(!registry.names().is_empty());
    }
}
