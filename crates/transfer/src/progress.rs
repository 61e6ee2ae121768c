use std::time::Duration;

use tokio::time::Instant;

/// Estimates time remaining from the average time per completed part.
///
/// Returns `None` until at least one part has completed.
pub fn estimate_remaining(elapsed: Duration, uploaded: u32, total: u32) -> Option<Duration> {
    if uploaded == 0 {
        return None;
    }
    let remaining = total.saturating_sub(uploaded);
    let per_part = elapsed.as_secs_f64() / f64::from(uploaded);
    Some(Duration::from_secs_f64(per_part * f64::from(remaining)))
}

/// Wall clock for one upload's parts.
///
/// Parts complete strictly in order, so the number uploaded is always the
/// last part's id plus one and no counter needs to be kept here.
#[derive(Debug, Clone, Copy)]
pub struct EtaEstimator {
    started: Instant,
    total_parts: u32,
}

impl EtaEstimator {
    /// Starts the clock for an upload of `total_parts` parts.
    pub fn start(total_parts: u32) -> Self {
        Self {
            started: Instant::now(),
            total_parts,
        }
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Estimated time until the last part completes, once `uploaded` parts
    /// are done.
    pub fn remaining_after(&self, uploaded: u32) -> Option<Duration> {
        estimate_remaining(self.elapsed(), uploaded, self.total_parts)
    }
}
