use std::time::Duration;

use rand::distributions::Distribution;
use rand::Rng;

/// Delay between a record ACK and the next report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSchedule {
    Periodic(Duration),
    // uniform in [base - spread, base + spread], floored at zero
    Jittered { base: Duration, spread: Duration },
}

impl ReportSchedule {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        if jitter.is_zero() {
            ReportSchedule::Periodic(interval)
        } else {
            ReportSchedule::Jittered {
                base: interval,
                spread: jitter,
            }
        }
    }

    pub fn mean(&self) -> Duration {
        match self {
            ReportSchedule::Periodic(interval) => *interval,
            ReportSchedule::Jittered { base, .. } => *base,
        }
    }
}

impl Distribution<Duration> for ReportSchedule {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match self {
            ReportSchedule::Periodic(interval) => *interval,
            ReportSchedule::Jittered { base, spread } => {
                let low = base.saturating_sub(*spread);
                let high = base.saturating_add(*spread);
                rng.gen_range(low..=high)
            }
        }
    }
}
