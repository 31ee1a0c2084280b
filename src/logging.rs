//! Stderr logging for the driver and the logger binary.

use std::sync::Once;

use env_logger::{Builder, Env};
use log::LevelFilter;

static RUST_LOG_ONCE: Once = Once::new();

/// Crate-specific level variable; takes precedence over `RUST_LOG`.
pub const LOG_ENV: &str = "LDC_EVM_LOG";

fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.trim().parse::<LevelFilter>().ok())
}

/// Pick a fixed level from the CLI value, then `LDC_EVM_LOG`.
///
/// `None` means neither is usable and `RUST_LOG` directives apply.
fn resolve_level(explicit: Option<&str>, crate_env: Option<&str>) -> Option<LevelFilter> {
    parse_level(explicit).or_else(|| parse_level(crate_env))
}

/// Initialize stderr logging.
///
/// Precedence: an explicit `level` (e.g. from the CLI), then `LDC_EVM_LOG`,
/// then `RUST_LOG` filter directives, then `info`.
/// Safe to call multiple times; only the first call installs the logger.
pub fn init_logging(level: Option<&str>) {
    RUST_LOG_ONCE.call_once(|| {
        let crate_env = std::env::var(LOG_ENV).ok();
        let mut builder = match resolve_level(level, crate_env.as_deref()) {
            Some(level) => {
                let mut builder = Builder::new();
                builder.filter_level(level);
                builder
            }
            None => Builder::from_env(Env::default().default_filter_or("info")),
        };
        builder
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(true)
            .init();
    });
}
