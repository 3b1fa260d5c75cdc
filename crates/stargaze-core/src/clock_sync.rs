// Per-connection clock offset estimator.
//
// Each agent has its own clock. Every successful poll gives one sample:
// the agent's `serverTimestamp` is assumed to sit at the midpoint of the
// round trip, and the difference to our receive time is the raw offset.

use tracing::warn;

/// Weight of a new sample in the exponential moving average.
const SMOOTHING: f64 = 0.2;

/// Above this the offset is real skew, not network noise.
pub const SKEW_WARN_THRESHOLD_MS: f64 = 30_000.0;

#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    offset_ms: Option<f64>,
    samples: u64,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one round trip. All arguments are epoch milliseconds; the first
    /// two on our clock, `remote_ts` on the agent's.
    ///
    /// Returns the smoothed offset after this sample.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn update(&mut self, local_send: i64, local_recv: i64, remote_ts: i64) -> f64 {
        let rtt = (local_recv - local_send) as f64;
        let estimated_remote_now = remote_ts as f64 + rtt / 2.0;
        let raw = local_recv as f64 - estimated_remote_now;

        let smoothed = match self.offset_ms {
            None => raw,
            Some(prev) => SMOOTHING * raw + (1.0 - SMOOTHING) * prev,
        };
        self.offset_ms = Some(smoothed);
        self.samples += 1;

        if smoothed.abs() > SKEW_WARN_THRESHOLD_MS {
            warn!(
                offset_ms = smoothed.round(),
                rtt_ms = rtt,
                "large clock offset to agent, check NTP on both hosts"
            );
        }
        smoothed
    }

    /// Translate an agent timestamp onto our clock.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn adjust_timestamp(&self, remote_ts: i64) -> i64 {
        remote_ts + self.offset_ms.unwrap_or(0.0).round() as i64
    }

    /// Smoothed offset in ms, `None` before the first sample.
    pub fn offset_ms(&self) -> Option<f64> {
        self.offset_ms
    }

    pub fn is_skewed(&self) -> bool {
        self.offset_ms.is_some_and(|o| o.abs() > SKEW_WARN_THRESHOLD_MS)
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Forget everything; the next sample seeds the estimate directly.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
