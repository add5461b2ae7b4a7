use std::time::Duration;

/// Exponential delay policy for reconnect loops.
///
/// The delay for attempt `n` is `base * 2^n`, capped at `max`, plus a random
/// jitter of up to `jitter_percent` of that value so a fleet of workers does
/// not reconnect in lockstep after a broker restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter_percent: u32,
}

impl Backoff {
    /// 100ms doubling up to 30s, 10% jitter.
    pub const RECONNECT: Backoff = Backoff {
        base: Duration::from_millis(100),
        max: Duration::from_secs(30),
        jitter_percent: 10,
    };

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_range = capped * self.jitter_percent / 100;
        if jitter_range.is_zero() {
            return capped;
        }

        let jitter_ms = fastrand::u64(0..=jitter_range.as_millis() as u64);
        capped.saturating_add(Duration::from_millis(jitter_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::RECONNECT
    }
}
