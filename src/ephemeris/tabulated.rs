//! Tabulated ephemeris with cubic Hermite interpolation

use crate::bodies::BodyId;
use crate::propagation::OrbitalState;
use crate::time::Epoch;

/// Time-ordered state samples of a body relative to `center`
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedEphemeris {
    samples: Vec<OrbitalState>,
    pub center: BodyId,
}

impl TabulatedEphemeris {
    /// Build from unordered samples; needs at least two distinct finite epochs
    pub fn new(mut samples: Vec<OrbitalState>, center: BodyId) -> Result<Self, String> {
        if samples.iter().any(|s| !s.is_finite() || !s.epoch.is_finite()) {
            return Err("tabulated samples must be finite".to_string());
        }
        samples.sort_by(|a, b| {
            a.epoch
                .partial_cmp(&b.epoch)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        samples.dedup_by(|a, b| a.epoch == b.epoch);
        if samples.len() < 2 {
            return Err(format!(
                "tabulated ephemeris needs at least 2 samples, got {}",
                samples.len()
            ));
        }
        Ok(Self { samples, center })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First and last sample epochs
    pub fn span(&self) -> (Epoch, Epoch) {
        let first = self.samples.first().map(|s| s.epoch).unwrap_or_default();
        let last = self.samples.last().map(|s| s.epoch).unwrap_or_default();
        (first, last)
    }

    pub fn covers(&self, epoch: Epoch) -> bool {
        let (start, end) = self.span();
        epoch >= start && epoch <= end
    }

    /// Interpolated state, `None` outside the tabulated span
    pub fn interpolate(&self, epoch: Epoch) -> Option<OrbitalState> {
        if !self.covers(epoch) {
            return None;
        }

        let idx = self.samples.partition_point(|s| s.epoch <= epoch);
        let hi = idx.clamp(1, self.samples.len() - 1);
        let a = &self.samples[hi - 1];
        let b = &self.samples[hi];

        let h = b.epoch - a.epoch;
        let s = (epoch - a.epoch) / h;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        let position = a.position * h00 + a.velocity * (h10 * h) + b.position * h01 + b.velocity * (h11 * h);

        let d00 = 6.0 * s2 - 6.0 * s;
        let d10 = 3.0 * s2 - 4.0 * s + 1.0;
        let d01 = -6.0 * s2 + 6.0 * s;
        let d11 = 3.0 * s2 - 2.0 * s;

        let velocity =
            (a.position * d00 + b.position * d01) / h + a.velocity * d10 + b.velocity * d11;

        Some(OrbitalState::new(position, velocity, epoch))
    }
}
