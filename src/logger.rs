//! Diagnostic output capability. Components receive a sink instead of
//! touching process-global state, so library users stay in control of
//! where (or whether) diagnostics go.

pub trait LogSink {
    fn log(&self, message: &str);
}

/// Discards everything. The default for library callers.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _message: &str) {}
}

/// Writes each line to stderr. Used by the CLI when `--verbose` is set.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn log(&self, message: &str) {
        eprintln!("{message}");
    }
}
