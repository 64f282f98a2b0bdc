use std::fmt;
use std::fmt::Formatter;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Raw list-mode ion arrival data for one acquisition.
///
/// Arrival channels are stored shot-major in a single flat vector;
/// `ions_per_shot[i]` gives the number of entries belonging to shot `i`.
/// The channel range `[bin_start, bin_end]` is the instrument-defined full
/// range, not the observed one, so an empty acquisition still maps onto a
/// full-length spectrum. The struct is created once when a file is read and
/// never mutated afterwards; filtering produces a new [`FilteredIonData`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawIonData {
    pub nof_shots: usize,
    pub ions_per_shot: Vec<u32>,
    pub arrival_bins: Vec<u32>,
    pub bin_start: u32,
    pub bin_end: u32,
    pub bin_width_ps: u64,
    shot_offsets: Vec<usize>,
}

impl RawIonData {
    /// Creates a new `RawIonData` instance.
    ///
    /// # Arguments
    ///
    /// * `ions_per_shot` - Number of ions registered in each shot.
    /// * `arrival_bins` - All arrival channels, shot-major.
    /// * `bin_start` - First channel of the instrument-defined range.
    /// * `bin_end` - Last channel of the instrument-defined range (inclusive).
    /// * `bin_width_ps` - Channel width in picoseconds.
    ///
    /// Fails if the per-shot counts do not sum to the number of arrival
    /// entries, if the channel range is empty, or if any arrival falls
    /// outside the channel range.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::data::ions::RawIonData;
    ///
    /// let raw = RawIonData::new(vec![2, 0, 1], vec![10, 12, 11], 0, 99, 100).unwrap();
    /// assert_eq!(raw.nof_shots, 3);
    /// assert_eq!(raw.shot(0), &[10, 12]);
    /// ```
    pub fn new(
        ions_per_shot: Vec<u32>,
        arrival_bins: Vec<u32>,
        bin_start: u32,
        bin_end: u32,
        bin_width_ps: u64,
    ) -> Result<Self, EvalError> {
        if bin_end < bin_start {
            return Err(EvalError::InvalidRange(format!(
                "channel range [{bin_start}, {bin_end}] is empty"
            )));
        }
        if bin_width_ps == 0 {
            return Err(EvalError::Configuration(
                "channel width must be positive".to_string(),
            ));
        }
        let total: usize = ions_per_shot.iter().map(|&n| n as usize).sum();
        if total != arrival_bins.len() {
            return Err(EvalError::Calculation(format!(
                "ion count mismatch: shots announce {} ions, data holds {}",
                total,
                arrival_bins.len()
            )));
        }
        if let Some(&bad) = arrival_bins
            .iter()
            .find(|&&b| b < bin_start || b > bin_end)
        {
            return Err(EvalError::InvalidRange(format!(
                "arrival channel {bad} outside instrument range [{bin_start}, {bin_end}]"
            )));
        }

        let shot_offsets = offsets_from_counts(&ions_per_shot);
        Ok(RawIonData {
            nof_shots: ions_per_shot.len(),
            ions_per_shot,
            arrival_bins,
            bin_start,
            bin_end,
            bin_width_ps,
            shot_offsets,
        })
    }

    /// Arrival channels of a single shot. A shot with zero ions yields an
    /// empty slice.
    pub fn shot(&self, index: usize) -> &[u32] {
        &self.arrival_bins[self.shot_offsets[index]..self.shot_offsets[index + 1]]
    }

    /// Total number of ions across all shots.
    pub fn nof_ions(&self) -> usize {
        self.arrival_bins.len()
    }

    /// Number of channels in the instrument-defined range.
    pub fn nof_channels(&self) -> usize {
        (self.bin_end - self.bin_start) as usize + 1
    }
}

impl fmt::Display for RawIonData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawIonData(shots: {}, ions: {}, channels: [{}, {}])",
            self.nof_shots,
            self.nof_ions(),
            self.bin_start,
            self.bin_end
        )
    }
}

/// Ion arrival data after the filter pipeline ran over a [`RawIonData`].
///
/// The shape mirrors the raw data. An excluded shot keeps its slot with
/// zero ions and `shot_excluded[i] == true`, so downstream shot counting
/// and package boundaries stay consistent with the acquisition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilteredIonData {
    pub nof_shots: usize,
    pub ions_per_shot: Vec<u32>,
    pub arrival_bins: Vec<u32>,
    pub shot_excluded: Vec<bool>,
    pub bin_start: u32,
    pub bin_end: u32,
    pub bin_width_ps: u64,
    shot_offsets: Vec<usize>,
}

impl FilteredIonData {
    /// Starts a filter pass with every shot of the raw data retained.
    pub fn from_raw(raw: &RawIonData) -> Self {
        FilteredIonData {
            nof_shots: raw.nof_shots,
            ions_per_shot: raw.ions_per_shot.clone(),
            arrival_bins: raw.arrival_bins.clone(),
            shot_excluded: vec![false; raw.nof_shots],
            bin_start: raw.bin_start,
            bin_end: raw.bin_end,
            bin_width_ps: raw.bin_width_ps,
            shot_offsets: raw.shot_offsets.clone(),
        }
    }

    /// Rebuilds the data with a new exclusion decision per shot.
    ///
    /// `keep` is queried once per currently retained shot; shots that were
    /// already excluded stay excluded. Returns the new data plus the number
    /// of shots and ions dropped by this pass.
    pub fn retain_shots<F>(&self, mut keep: F) -> (Self, usize, usize)
    where
        F: FnMut(usize, &[u32]) -> bool,
    {
        let mut ions_per_shot = Vec::with_capacity(self.nof_shots);
        let mut arrival_bins = Vec::with_capacity(self.arrival_bins.len());
        let mut shot_excluded = Vec::with_capacity(self.nof_shots);
        let mut dropped_shots = 0usize;
        let mut dropped_ions = 0usize;

        for index in 0..self.nof_shots {
            let ions = self.shot(index);
            if self.shot_excluded[index] {
                ions_per_shot.push(0);
                shot_excluded.push(true);
                continue;
            }
            if keep(index, ions) {
                ions_per_shot.push(ions.len() as u32);
                arrival_bins.extend_from_slice(ions);
                shot_excluded.push(false);
            } else {
                dropped_shots += 1;
                dropped_ions += ions.len();
                ions_per_shot.push(0);
                shot_excluded.push(true);
            }
        }

        let shot_offsets = offsets_from_counts(&ions_per_shot);
        let filtered = FilteredIonData {
            nof_shots: self.nof_shots,
            ions_per_shot,
            arrival_bins,
            shot_excluded,
            bin_start: self.bin_start,
            bin_end: self.bin_end,
            bin_width_ps: self.bin_width_ps,
            shot_offsets,
        };
        (filtered, dropped_shots, dropped_ions)
    }

    /// Arrival channels of a single shot slot. Excluded shots yield an
    /// empty slice.
    pub fn shot(&self, index: usize) -> &[u32] {
        &self.arrival_bins[self.shot_offsets[index]..self.shot_offsets[index + 1]]
    }

    /// Total number of retained ions.
    pub fn nof_ions(&self) -> usize {
        self.arrival_bins.len()
    }

    /// Number of shots that survived all filters.
    pub fn retained_shots(&self) -> usize {
        self.shot_excluded.iter().filter(|&&e| !e).count()
    }

    /// Number of channels in the instrument-defined range.
    pub fn nof_channels(&self) -> usize {
        (self.bin_end - self.bin_start) as usize + 1
    }
}

impl fmt::Display for FilteredIonData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FilteredIonData(shots: {} of {}, ions: {})",
            self.retained_shots(),
            self.nof_shots,
            self.nof_ions()
        )
    }
}

fn offsets_from_counts(ions_per_shot: &[u32]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(ions_per_shot.len() + 1);
    let mut acc = 0usize;
    offsets.push(0);
    for &n in ions_per_shot {
        acc += n as usize;
        offsets.push(acc);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ion_data_rejects_count_mismatch() {
        let err = RawIonData::new(vec![2, 1], vec![10, 12], 0, 99, 100).unwrap_err();
        assert!(matches!(err, EvalError::Calculation(_)));
    }

    #[test]
    fn test_raw_ion_data_rejects_out_of_range_arrival() {
        let err = RawIonData::new(vec![1], vec![120], 0, 99, 100).unwrap_err();
        assert!(matches!(err, EvalError::InvalidRange(_)));
    }

    #[test]
    fn test_zero_ion_shot_is_valid() {
        let raw = RawIonData::new(vec![0, 0, 1], vec![42], 0, 99, 100).unwrap();
        assert_eq!(raw.shot(0), &[] as &[u32]);
        assert_eq!(raw.shot(2), &[42]);
    }

    #[test]
    fn test_retain_shots_keeps_slots() {
        let raw = RawIonData::new(vec![2, 3, 1], vec![5, 6, 7, 8, 9, 10], 0, 99, 100).unwrap();
        let data = FilteredIonData::from_raw(&raw);
        let (filtered, shots, ions) = data.retain_shots(|_, ions| ions.len() < 3);

        assert_eq!(shots, 1);
        assert_eq!(ions, 3);
        assert_eq!(filtered.nof_shots, 3);
        assert_eq!(filtered.ions_per_shot, vec![2, 0, 1]);
        assert_eq!(filtered.shot_excluded, vec![false, true, false]);
        assert_eq!(filtered.shot(1), &[] as &[u32]);
        assert_eq!(filtered.shot(2), &[10]);
        assert_eq!(filtered.retained_shots(), 2);
    }

    #[test]
    fn test_retain_shots_skips_already_excluded() {
        let raw = RawIonData::new(vec![4, 1], vec![1, 2, 3, 4, 9], 0, 99, 100).unwrap();
        let data = FilteredIonData::from_raw(&raw);
        let (first, _, _) = data.retain_shots(|_, ions| ions.len() <= 2);
        // Second pass would drop everything, but shot 0 is already gone and
        // must not be tallied again.
        let (second, shots, ions) = first.retain_shots(|_, _| false);

        assert_eq!(shots, 1);
        assert_eq!(ions, 1);
        assert_eq!(second.retained_shots(), 0);
    }
}
