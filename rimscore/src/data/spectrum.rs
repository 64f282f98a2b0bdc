use std::fmt;
use std::fmt::Formatter;

use serde::{Deserialize, Serialize};

use crate::data::calibration::MassCalibration;

/// A dense time-of-flight histogram over the instrument-defined channel
/// range.
///
/// `counts[i]` holds the counts of channel `bin_start + i`. Counts are
/// `f64` because dead-time corrected counts are fractional. When a mass
/// calibration has been applied, `mass` carries a parallel x-axis with one
/// entry per channel; the counts themselves are representation-independent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TofSpectrum {
    pub counts: Vec<f64>,
    pub bin_start: u32,
    pub bin_width_ps: u64,
    pub mass: Option<Vec<f64>>,
}

impl TofSpectrum {
    /// Creates a new `TofSpectrum` instance.
    ///
    /// # Arguments
    ///
    /// * `counts` - Counts per channel, starting at `bin_start`.
    /// * `bin_start` - First channel of the histogram.
    /// * `bin_width_ps` - Channel width in picoseconds.
    pub fn new(counts: Vec<f64>, bin_start: u32, bin_width_ps: u64) -> Self {
        TofSpectrum {
            counts,
            bin_start,
            bin_width_ps,
            mass: None,
        }
    }

    /// Builds a histogram from ion arrival channels.
    ///
    /// The histogram always spans the full `[bin_start, bin_end]` range,
    /// so empty input produces a full-length zero spectrum. The same
    /// function serves the whole-file spectrum and per-package spectra.
    ///
    /// Arrivals outside the channel range were rejected at data
    /// construction time and cannot occur here.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::data::spectrum::TofSpectrum;
    ///
    /// let spectrum = TofSpectrum::from_arrivals(&[2, 2, 3], 0, 4, 100);
    /// assert_eq!(spectrum.counts, vec![0.0, 0.0, 2.0, 1.0, 0.0]);
    /// ```
    pub fn from_arrivals(
        arrivals: &[u32],
        bin_start: u32,
        bin_end: u32,
        bin_width_ps: u64,
    ) -> Self {
        let nof_channels = (bin_end - bin_start) as usize + 1;
        let mut counts = vec![0.0; nof_channels];
        for &channel in arrivals {
            counts[(channel - bin_start) as usize] += 1.0;
        }
        TofSpectrum::new(counts, bin_start, bin_width_ps)
    }

    /// Number of channels in the spectrum.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total_counts(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Time-of-flight bin centers in nanoseconds.
    pub fn tof_ns(&self) -> Vec<f64> {
        let width_ns = self.bin_width_ps as f64 / 1000.0;
        (0..self.counts.len())
            .map(|i| (self.bin_start as f64 + i as f64 + 0.5) * width_ns)
            .collect()
    }

    /// Labels every channel with a mass from the given calibration.
    ///
    /// Counts are unchanged; only the x-axis labeling differs between the
    /// time-of-flight and the mass representation.
    pub fn apply_mass_calibration(&mut self, cal: &MassCalibration) {
        self.mass = Some(cal.mass_axis(&self.tof_ns()));
    }

    /// Drops the mass axis, reverting to the pure ToF representation.
    pub fn clear_mass_axis(&mut self) {
        self.mass = None;
    }

    /// The x-axis integrals are evaluated on: mass when calibrated,
    /// time-of-flight in nanoseconds otherwise.
    pub fn active_axis(&self) -> Vec<f64> {
        match &self.mass {
            Some(mass) => mass.clone(),
            None => self.tof_ns(),
        }
    }
}

/// Sums the counts of two spectra sharing the same acquisition geometry,
/// e.g. when merging package spectra. The mass axis survives only if both
/// sides carry the identical one.
impl std::ops::Add for TofSpectrum {
    type Output = Self;

    fn add(self, other: Self) -> TofSpectrum {
        debug_assert_eq!(self.counts.len(), other.counts.len());
        debug_assert_eq!(self.bin_start, other.bin_start);

        let counts = self
            .counts
            .iter()
            .zip(other.counts.iter())
            .map(|(a, b)| a + b)
            .collect();
        let mass = match (&self.mass, &other.mass) {
            (Some(a), Some(b)) if a == b => Some(a.clone()),
            _ => None,
        };
        TofSpectrum {
            counts,
            bin_start: self.bin_start,
            bin_width_ps: self.bin_width_ps,
            mass,
        }
    }
}

impl fmt::Display for TofSpectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TofSpectrum(channels: {}, total counts: {})",
            self.counts.len(),
            self.total_counts()
        )
    }
}
