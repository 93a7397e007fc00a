//! Log setup for the gateway binary.
//!
//! Lines go to stderr as `[timestamp LEVEL module] message`, so stdout stays
//! free for `replay` output.

use std::io::Write;

/// Log to stderr at `level`. `RUST_LOG`, when set, refines it.
pub fn setup_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_seconds(),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
