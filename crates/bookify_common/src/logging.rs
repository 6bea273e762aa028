// --- File: crates/bookify_common/src/logging.rs ---
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

fn resolve_log_dir(app_name: &str) -> PathBuf {
    if let Ok(dir) = env::var("BOOKIFY_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let system_path = PathBuf::from(format!("/var/log/{}", app_name));
    if system_path.is_dir()
        && fs::metadata(&system_path)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    {
        return system_path;
    }
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".into())).join(format!(".{}", app_name))
}

/// Initialize logging with the default filter (`info` unless `RUST_LOG` says
/// otherwise): console layer plus a daily-rolling file in the resolved log
/// directory.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    init_named("bookify")
}

pub fn init_named(app_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = resolve_log_dir(app_name);
    fs::create_dir_all(&log_dir)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = rolling::daily(&log_dir, format!("{}.log", app_name));
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true);

    let console_layer = fmt::layer().with_ansi(true).with_target(true);

    let subscriber = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(Box::<dyn std::error::Error>::from)
}
