//! Logging utilities

pub use log::{debug, error, info, trace, warn};

use log::LevelFilter;

/// Initialize logging with a default level
///
/// `level` is one of `off`, `error`, `warn`, `info`, `debug` or `trace` (case-insensitive);
/// unknown values fall back to `info`. Directives in `RUST_LOG` still take precedence.
pub fn init_with_level(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(level));
    if let Ok(directives) = std::env::var("RUST_LOG") {
        builder.parse_filters(&directives);
    }
    // A second init (tests, embedding) is not an error worth surfacing
    let _ = builder.try_init();
}

/// Parse a textual log level
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
