use std::fmt;
use std::fmt::Formatter;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::ions::FilteredIonData;
use crate::data::spectrum::TofSpectrum;
use crate::error::EvalError;
use crate::filters::spec::FilterSpecification;

/// A contiguous group of shot slots treated as an independent
/// sub-acquisition.
///
/// `index` is the contiguous output index after cap-dropping; the original
/// shot range stays queryable through `shot_start`/`shot_end` (0-indexed,
/// inclusive). Excluded shots inside the range count towards the slot span
/// but contribute no ions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub index: usize,
    pub shot_start: usize,
    pub shot_end: usize,
    pub nof_shots: usize,
    pub ions_per_shot: Vec<u32>,
    pub arrival_bins: Vec<u32>,
    pub bin_start: u32,
    pub bin_end: u32,
    pub bin_width_ps: u64,
}

impl Package {
    /// Total number of ions in this package.
    pub fn nof_ions(&self) -> usize {
        self.arrival_bins.len()
    }

    /// Builds this package's own spectrum, with the identical binning
    /// logic used for the whole-file spectrum.
    pub fn spectrum(&self) -> TofSpectrum {
        TofSpectrum::from_arrivals(
            &self.arrival_bins,
            self.bin_start,
            self.bin_end,
            self.bin_width_ps,
        )
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Package(index: {}, shots: [{}, {}], ions: {})",
            self.index,
            self.shot_start,
            self.shot_end,
            self.nof_ions()
        )
    }
}

/// Partitions filtered shots into fixed-size packages.
///
/// Packaging runs over shot *slots*: shots excluded by the filter pipeline
/// keep their position, so package boundaries do not depend on which
/// filters ran. The last package may be shorter (the remainder package)
/// and is retained like any other. With `max_ions_per_pkg` enabled,
/// packages over the ion cap are removed from the result (not zeroed) and
/// the survivors are renumbered contiguously; the second return value
/// counts the dropped packages.
///
/// Returns an empty list when packaging is disabled.
pub fn package(
    data: &FilteredIonData,
    spec: &FilterSpecification,
) -> Result<(Vec<Package>, usize), EvalError> {
    spec.validate(data.nof_shots)?;
    if !spec.packages.enabled {
        return Ok((Vec::new(), 0));
    }

    let size = spec.packages.shots_per_package as usize;
    let cap = spec
        .max_ions_per_pkg
        .enabled
        .then_some(spec.max_ions_per_pkg.max_ions as usize);

    let mut packages = Vec::new();
    let mut dropped = 0usize;

    let mut shot_start = 0usize;
    while shot_start < data.nof_shots {
        let shot_end = (shot_start + size - 1).min(data.nof_shots - 1);

        let mut ions_per_shot = Vec::with_capacity(shot_end - shot_start + 1);
        let mut arrival_bins = Vec::new();
        for shot in shot_start..=shot_end {
            ions_per_shot.push(data.ions_per_shot[shot]);
            arrival_bins.extend_from_slice(data.shot(shot));
        }

        if cap.is_some_and(|cap| arrival_bins.len() > cap) {
            debug!(
                "dropping package over shots [{shot_start}, {shot_end}]: {} ions over cap",
                arrival_bins.len()
            );
            dropped += 1;
        } else {
            packages.push(Package {
                index: packages.len(),
                shot_start,
                shot_end,
                nof_shots: shot_end - shot_start + 1,
                ions_per_shot,
                arrival_bins,
                bin_start: data.bin_start,
                bin_end: data.bin_end,
                bin_width_ps: data.bin_width_ps,
            });
        }

        shot_start = shot_end + 1;
    }

    Ok((packages, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ions::RawIonData;

    fn filtered(ions_per_shot: Vec<u32>, arrival_bins: Vec<u32>) -> FilteredIonData {
        let raw = RawIonData::new(ions_per_shot, arrival_bins, 0, 999, 100).unwrap();
        FilteredIonData::from_raw(&raw)
    }

    fn spec_with_packages(shots_per_package: u32) -> FilterSpecification {
        let mut spec = FilterSpecification::default();
        spec.packages.enabled = true;
        spec.packages.shots_per_package = shots_per_package;
        spec
    }

    #[test]
    fn test_disabled_packaging_returns_empty() {
        let data = filtered(vec![1, 1], vec![10, 20]);
        let (packages, dropped) = package(&data, &FilterSpecification::default()).unwrap();
        assert!(packages.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_ten_shots_in_packages_of_four() {
        let data = filtered(vec![1; 10], (0..10).map(|i| i * 10).collect());
        let (packages, dropped) = package(&data, &spec_with_packages(4)).unwrap();

        assert_eq!(dropped, 0);
        let sizes: Vec<usize> = packages.iter().map(|p| p.nof_shots).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_packages_partition_shots_exactly() {
        let data = filtered(vec![2; 10], (0..20).collect());
        let (packages, _) = package(&data, &spec_with_packages(3)).unwrap();

        // No gaps, no overlaps, no duplication across the shot slots.
        let mut covered = Vec::new();
        for pkg in &packages {
            for shot in pkg.shot_start..=pkg.shot_end {
                covered.push(shot);
            }
        }
        assert_eq!(covered, (0..10).collect::<Vec<_>>());

        let total_ions: usize = packages.iter().map(|p| p.nof_ions()).sum();
        assert_eq!(total_ions, data.nof_ions());
    }

    #[test]
    fn test_excluded_shots_keep_package_boundaries() {
        let raw = RawIonData::new(vec![1, 8, 1, 1], vec![10, 1, 2, 3, 4, 5, 6, 7, 8, 20, 30], 0, 999, 100)
            .unwrap();
        let data = FilteredIonData::from_raw(&raw);
        let (data, _, _) = data.retain_shots(|_, arrivals| arrivals.len() <= 4);

        let (packages, _) = package(&data, &spec_with_packages(2)).unwrap();
        assert_eq!(packages.len(), 2);
        // The excluded shot still occupies its slot in the first package.
        assert_eq!(packages[0].nof_shots, 2);
        assert_eq!(packages[0].ions_per_shot, vec![1, 0]);
        assert_eq!(packages[0].nof_ions(), 1);
        assert_eq!(packages[1].arrival_bins, vec![20, 30]);
    }

    #[test]
    fn test_ion_cap_drops_and_renumbers() {
        // Three packages of two shots; the middle one is over the cap.
        let data = filtered(
            vec![1, 1, 5, 5, 1, 1],
            vec![10, 20, 1, 2, 3, 4, 5, 6, 7, 8, 9, 11, 30, 40],
        );
        let mut spec = spec_with_packages(2);
        spec.max_ions_per_pkg.enabled = true;
        spec.max_ions_per_pkg.max_ions = 5;

        let (packages, dropped) = package(&data, &spec).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(packages.len(), 2);
        // Contiguous renumbering, original shot ranges preserved.
        assert_eq!(packages[0].index, 0);
        assert_eq!(packages[1].index, 1);
        assert_eq!(packages[0].shot_start, 0);
        assert_eq!(packages[1].shot_start, 4);
        assert_eq!(packages[1].shot_end, 5);
    }

    #[test]
    fn test_remainder_package_subject_to_cap() {
        let data = filtered(vec![1, 1, 6], vec![10, 20, 1, 2, 3, 4, 5, 6]);
        let mut spec = spec_with_packages(2);
        spec.max_ions_per_pkg.enabled = true;
        spec.max_ions_per_pkg.max_ions = 5;

        let (packages, dropped) = package(&data, &spec).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].shot_end, 1);
    }

    #[test]
    fn test_package_spectrum_uses_full_channel_range() {
        let data = filtered(vec![1], vec![500]);
        let (packages, _) = package(&data, &spec_with_packages(1)).unwrap();
        let spectrum = packages[0].spectrum();
        assert_eq!(spectrum.len(), 1000);
        assert_eq!(spectrum.counts[500], 1.0);
    }
}
