use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::StdRng, Rng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: u64,
}

impl LocationFix {
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms: now_millis(),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Produces fixes scattered uniformly within `jitter` degrees of a base
/// coordinate. Samples are independent; positions do not accumulate.
#[derive(Debug)]
pub struct LocationSampler<R = StdRng> {
    base_latitude: f64,
    base_longitude: f64,
    jitter: f64,
    rng: R,
}

impl<R: Rng> LocationSampler<R> {
    pub fn new(base_latitude: f64, base_longitude: f64, jitter: f64, rng: R) -> Self {
        Self {
            base_latitude,
            base_longitude,
            jitter: jitter.abs(),
            rng,
        }
    }

    fn offset(&mut self) -> f64 {
        if self.jitter == 0.0 {
            0.0
        } else {
            self.rng.gen_range(-self.jitter..self.jitter)
        }
    }

    pub fn next_fix(&mut self) -> LocationFix {
        let latitude = self.base_latitude + self.offset();
        let longitude = self.base_longitude + self.offset();
        LocationFix::now(latitude, longitude)
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}
