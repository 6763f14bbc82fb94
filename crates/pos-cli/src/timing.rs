//! Elapsed-time reporting for `--profile`.

use std::io::Write;
use std::time::{Duration, Instant};

/// Measures one command run.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Write `> Time <label>: <secs>s` to `out`.
    pub fn report_to(self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "> Time {}: {:.3}s", self.label, self.elapsed().as_secs_f64())
    }

    /// Stop the timer and print the elapsed time to stderr.
    pub fn stop(self) {
        let _ = self.report_to(&mut std::io::stderr());
    }
}
