// Output formatting helpers for CLI commands

use std::io::Write;

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// Rewrite the countdown line in place
pub fn countdown(remaining: &str) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r\x1b[2m  Next submission in: {}\x1b[0m", remaining);
    let _ = stderr.flush();
}

/// Finish a countdown line
pub fn end_countdown() {
    eprintln!();
}
