//! Exponentially-weighted moving average for throughput smoothing.

use std::time::Duration;

/// Default smoothing factor. Follows a trend change within about five samples.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// EWMA smoother for noisy rate samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimator {
    alpha: f64,
    estimate: Option<f64>,
}

impl RateEstimator {
    /// Create an estimator with smoothing factor `alpha`, clamped to `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            DEFAULT_ALPHA
        };
        Self {
            alpha,
            estimate: None,
        }
    }

    /// Smoothing factor in use.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current estimate, `None` before the first sample.
    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    /// Feed one sample and return the new estimate.
    ///
    /// The first sample seeds the estimate directly. Non-finite samples are
    /// ignored.
    pub fn update(&mut self, sample: f64) -> f64 {
        if !sample.is_finite() {
            return self.estimate.unwrap_or(0.0);
        }
        let next = match self.estimate {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.estimate = Some(next);
        next
    }

    /// Feed `amount` units observed over `elapsed` as a per-second rate.
    ///
    /// A zero-length interval leaves the estimate unchanged.
    pub fn update_rate(&mut self, amount: f64, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return self.estimate;
        }
        Some(self.update(amount / secs))
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}
