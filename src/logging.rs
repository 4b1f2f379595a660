//! Env-driven logging initialization, matching the established
//! `main.rs`/`bin/*.rs` pattern of `drop(env_logger::init())` ahead of
//! anything else.

/// Initializes the `log` facade from `RUST_LOG`, defaulting to `info`
/// when unset. Safe to call once per process; a second call is a no-op
/// warning rather than a panic.
pub fn init() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Info);
    } else {
        builder.parse_env("RUST_LOG");
    }
    if builder.try_init().is_err() {
        log::warn!("logging already initialized");
    }
}
