//! ## Features
//!
//! - Level-prefixed console logging (info, warn, error, verbose, debug, success)
//! - Multi-line message support with consistent formatting
//! - Process-wide verbosity switch so chatty levels stay quiet by default
//! - JSONL trace storage for retrieval events (`trace-log` feature)
//!
//! All console output goes to stderr so stdout stays clean for command results.

use colored::*;
use std::sync::atomic::{AtomicU8, Ordering};

#[cfg(feature = "trace-log")]
pub mod trace_log;

/// How much console output to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Verbosity {
  /// Only warnings and errors
  Quiet = 0,
  /// Normal operator output
  Normal = 1,
  /// Everything, including verbose and debug lines
  Verbose = 2,
}

static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);

/// Set the process-wide console verbosity
pub fn set_verbosity(level: Verbosity) {
  VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Current process-wide console verbosity
pub fn verbosity() -> Verbosity {
  match VERBOSITY.load(Ordering::Relaxed) {
    0 => Verbosity::Quiet,
    1 => Verbosity::Normal,
    _ => Verbosity::Verbose,
  }
}

fn enabled(required: Verbosity) -> bool {
  verbosity() >= required
}

/// Core logging function that handles the actual output
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

/// Format a colored prefix for log messages
fn format_prefix(color: Color, prefix: &str) -> String {
  format!("[{}]{:<width$}", prefix.color(color).bold(), "", width = 7 - prefix.len() - 2)
}

fn log_prefixed(color: Color, prefix: &str, message: &str) {
  let prefix = format_prefix(color, prefix);
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// Verbose logging - only shown with `Verbosity::Verbose`
pub fn verbose(message: &str) {
  if enabled(Verbosity::Verbose) {
    log_prefixed(Color::Cyan, "verb", message);
  }
}

/// Info level logging - general information
pub fn info(message: &str) {
  if enabled(Verbosity::Normal) {
    log_prefixed(Color::Blue, "info", message);
  }
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  log_prefixed(Color::Yellow, "warn", message);
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  log_prefixed(Color::Red, "error", message);
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  if enabled(Verbosity::Verbose) {
    log_prefixed(Color::Magenta, "debug", message);
  }
}

/// Success level logging - something completed successfully
pub fn success(message: &str) {
  if enabled(Verbosity::Normal) {
    log_prefixed(Color::Green, "sccs", message);
  }
}

/// Macros for coverage-excluded logging - these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg); // LCOV_EXCL_LINE
  };
}
