//! Test scorer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::error::ScoringError;
use super::scorer::DivergenceScorer;
use super::types::ScorerMode;

/// Scorer returning a fixed value, optionally slow or failing, that counts calls.
#[derive(Debug)]
pub struct MockScorer {
    value: f64,
    delay: Duration,
    fail_first: usize,
    calls: AtomicUsize,
}

impl MockScorer {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            delay: Duration::ZERO,
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `n` calls, then succeeds.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Fails every call.
    pub fn always_failing() -> Self {
        Self::new(0.0).failing_first(usize::MAX)
    }

    /// Number of times `score` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DivergenceScorer for MockScorer {
    fn score(&self, _inputs: &str) -> Result<f64, ScoringError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if call < self.fail_first {
            return Err(ScoringError::ComputationFailed {
                reason: format!("mock failure on call {}", call + 1),
            });
        }
        Ok(self.value)
    }

    fn mode(&self) -> ScorerMode {
        ScorerMode::Mock
    }
}
