//! Logger installation is process-global, so each precedence case runs in
//! its own test binary.

use log::LevelFilter;

#[test]
fn cli_level_overrides_rust_log() {
    std::env::remove_var(ldc_evm::logging::LOG_ENV);
    std::env::set_var("RUST_LOG", "warn");

    ldc_evm::logging::init_logging(Some("debug"));

    assert_eq!(log::max_level(), LevelFilter::Debug);
}
