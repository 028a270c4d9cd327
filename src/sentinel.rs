//! The container health-check sentinel file. Grounded in `utils.py`'s `gerar_arquivo_erro`:
//! on any fatal startup failure, a marker file is written at a fixed path so the orchestrator's
//! health probe can see the process is unhealthy before it exits.

use slog::Logger;
use std::fs;

pub const SENTINEL_PATH: &str = "/tmp/error_8EDo2OWK9Sd7A4aN0uni.err";

/// Writes the sentinel file with the supplied message. Errors writing it are logged but not
/// propagated -- the process is already on its way to a non-zero exit regardless.
pub fn write_sentinel(log: &Logger, message: &str) {
    match fs::write(SENTINEL_PATH, message) {
        Ok(()) => error!(log, "Wrote sentinel file"; "path" => SENTINEL_PATH, "message" => message),
        Err(e) => error!(log, "Failed to write sentinel file"; "path" => SENTINEL_PATH, "error" => e.to_string()),
    }
}

/// Fatal startup helper: logs the error, writes the sentinel, and exits the process with 1.
/// Mirrors the source's pattern of calling `gerar_arquivo_erro` then `sys.exit(1)` from any of
/// its required-configuration checks. Reserved for the Gateway's own startup path -- the sentinel
/// is the container health probe's signal that the Gateway specifically is unhealthy.
pub fn fatal(log: &Logger, message: &str) -> ! {
    error!(log, "{}", message);
    write_sentinel(log, message);
    ::std::process::exit(1);
}

/// Fatal helper for failures that aren't the Gateway's own startup: logs and exits 1 without
/// touching the sentinel file, so an Executor or `migrate` failure doesn't flip the Gateway
/// container's health check.
pub fn fatal_silent(log: &Logger, message: &str) -> ! {
    error!(log, "{}", message);
    ::std::process::exit(1);
}
