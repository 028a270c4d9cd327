use errors::*;

use slog::Logger;

/// Prints an error to stderr (and the log), walking the full chain.
pub fn print_error(log: &Logger, error: &Error) {
    let strings = error_strings(error);
    error!(log, "Error: {}", strings[0]);
    for s in strings.iter().skip(1) {
        error!(log, "Chained error: {}", s);
    }

    // The backtrace is not always generated. Programs must be run with `RUST_BACKTRACE=1`.
    if let Some(backtrace) = error.backtrace() {
        error!(log, "{:?}", backtrace);
    }
}
