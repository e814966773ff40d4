use std::path::PathBuf;

use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};
use tracing_tree::HierarchicalLayer;

// Log targets, one per pipeline stage
pub const SYNC_INDEX: &str = "sync_index";
pub const SYNC_LOCATE: &str = "sync_locate";
pub const SYNC_REPAIR: &str = "sync_repair";
pub const SYNC_SCORE: &str = "sync_score";
pub const SYNC_GEOMETRY: &str = "sync_geometry";
pub const SYNC_RECONCILE: &str = "sync_reconcile";

const DEBUG_TARGETS: &[&str] = &[
    SYNC_INDEX,
    SYNC_LOCATE,
    SYNC_REPAIR,
    SYNC_SCORE,
    SYNC_GEOMETRY,
    SYNC_RECONCILE,
];

fn stage_filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    let directives = DEBUG_TARGETS
        .iter()
        .map(|t| format!("{}={}", t, level))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

/// Log to stderr through a non-blocking writer, leaving stdout for results.
/// With `debug`, pipeline stages log at debug level and spans are also
/// rendered as a tree.
/// Keep the guard alive for as long as logs should be flushed.
pub fn init_logging(debug: bool) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(writer)
        .with_filter(stage_filter(debug));

    let tree_layer = debug.then(|| {
        HierarchicalLayer::new(2)
            .with_targets(true)
            .with_writer(std::io::stderr)
            .with_filter(stage_filter(true))
    });

    // A host may already have installed a subscriber; keep theirs.
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tree_layer)
        .try_init();

    guard
}

/// Like `init_logging`, but writes to `sync-debug.log` in `log_dir` with
/// span open/close events.
pub fn init_logging_with_dir(debug: bool, log_dir: PathBuf) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, "sync-debug.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(writer)
        .with_filter(stage_filter(debug));

    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    Ok(guard)
}
