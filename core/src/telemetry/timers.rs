//! telemetry/timers.rs
//! Session wall-clock timer.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SessionTimer {
    started: Option<Instant>,
    finished: Option<Duration>,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTimer {
    pub fn new() -> Self {
        Self { started: None, finished: None }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.finished = None;
    }

    pub fn stop(&mut self) {
        if let Some(s) = self.started {
            self.finished = Some(s.elapsed());
        }
    }

    /// Elapsed time; frozen once stopped, zero if never started.
    pub fn elapsed(&self) -> Duration {
        match (self.finished, self.started) {
            (Some(d), _) => d,
            (None, Some(s)) => s.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}
