use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Environment variable selecting the log level (defaults to INFO).
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Initialize the logger with timestamp, level, and message formatting.
///
/// Format: `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`
pub fn init_logger() {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .init();
}
