use std::fmt;
use std::fmt::Formatter;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::ions::{FilteredIonData, RawIonData};
use crate::error::EvalError;
use crate::filters::spec::FilterSpecification;

/// Shots and ions dropped by one filter stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTally {
    pub excluded_shots: usize,
    pub excluded_ions: usize,
}

/// Per-stage exclusion bookkeeping for one pipeline run.
///
/// Attribution follows the normative filter order: a shot violating two
/// filters is tallied by the first one that sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub spectrum_part: StageTally,
    pub max_ions_per_shot: StageTally,
    pub max_ions_per_time: StageTally,
    pub max_ions_per_tof_window: StageTally,
}

impl ExclusionReport {
    pub fn total(&self) -> StageTally {
        let stages = [
            self.spectrum_part,
            self.max_ions_per_shot,
            self.max_ions_per_time,
            self.max_ions_per_tof_window,
        ];
        StageTally {
            excluded_shots: stages.iter().map(|s| s.excluded_shots).sum(),
            excluded_ions: stages.iter().map(|s| s.excluded_ions).sum(),
        }
    }
}

impl fmt::Display for ExclusionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let total = self.total();
        write!(
            f,
            "ExclusionReport(shots: {}, ions: {})",
            total.excluded_shots, total.excluded_ions
        )
    }
}

/// Runs the ion filter pipeline over raw acquisition data.
///
/// The four ion-level filters are applied strictly in this order, each one
/// consuming the previous one's output:
///
/// 1. shot-range exclusion (`spectrum_part`)
/// 2. maximum ions per shot
/// 3. maximum ions per sliding time window
/// 4. maximum ions per fixed ToF window
///
/// Disabled filters are identity passes. The run is deterministic: the
/// same specification over the same raw data always yields the identical
/// filtered output and report.
pub fn apply(
    raw: &RawIonData,
    spec: &FilterSpecification,
) -> Result<(FilteredIonData, ExclusionReport), EvalError> {
    spec.validate(raw.nof_shots)?;

    let mut data = FilteredIonData::from_raw(raw);
    let mut report = ExclusionReport::default();

    if spec.spectrum_part.enabled {
        data = exclude_shot_ranges(&data, &spec.spectrum_part.ranges, &mut report.spectrum_part);
    }
    if spec.max_ions_per_shot.enabled {
        data = exclude_shots_over_ion_count(
            &data,
            spec.max_ions_per_shot.max_ions,
            &mut report.max_ions_per_shot,
        );
    }
    if spec.max_ions_per_time.enabled {
        data = exclude_shots_over_sliding_window(
            &data,
            spec.max_ions_per_time.max_ions,
            spec.max_ions_per_time.window_bins,
            &mut report.max_ions_per_time,
        );
    }
    if spec.max_ions_per_tof_window.enabled {
        data = exclude_shots_over_tof_window(
            &data,
            spec.max_ions_per_tof_window.max_ions,
            spec.max_ions_per_tof_window.window,
            &mut report.max_ions_per_tof_window,
        );
    }

    let total = report.total();
    debug!(
        "filter pipeline: {} of {} shots excluded ({} ions)",
        total.excluded_shots, raw.nof_shots, total.excluded_ions
    );
    Ok((data, report))
}

/// Excludes all shots inside the given 1-indexed inclusive ranges.
pub fn exclude_shot_ranges(
    data: &FilteredIonData,
    ranges: &[(u32, u32)],
    tally: &mut StageTally,
) -> FilteredIonData {
    let (filtered, shots, ions) = data.retain_shots(|index, _| {
        let shot_number = index as u32 + 1;
        !ranges
            .iter()
            .any(|&(start, end)| shot_number >= start && shot_number <= end)
    });
    tally.excluded_shots += shots;
    tally.excluded_ions += ions;
    filtered
}

/// Excludes shots with more than `max_ions` ions. Violating shots are
/// dropped entirely, never truncated.
pub fn exclude_shots_over_ion_count(
    data: &FilteredIonData,
    max_ions: u32,
    tally: &mut StageTally,
) -> FilteredIonData {
    let (filtered, shots, ions) = data.retain_shots(|_, arrivals| arrivals.len() as u32 <= max_ions);
    tally.excluded_shots += shots;
    tally.excluded_ions += ions;
    filtered
}

/// Excludes shots where any sliding window of `window_bins` channels
/// contains more than `max_ions` ions.
///
/// The window is anchored at each ion arrival `t_i` and covers
/// `t_i <= t_j <= t_i + window_bins` (both ends inclusive). A shot is
/// excluded as soon as one window position violates the cap.
pub fn exclude_shots_over_sliding_window(
    data: &FilteredIonData,
    max_ions: u32,
    window_bins: u32,
    tally: &mut StageTally,
) -> FilteredIonData {
    let (filtered, shots, ions) = data.retain_shots(|_, arrivals| {
        !sliding_window_violated(arrivals, max_ions, window_bins)
    });
    tally.excluded_shots += shots;
    tally.excluded_ions += ions;
    filtered
}

/// Excludes shots with more than `max_ions` ions inside the fixed channel
/// window `[window.0, window.1]` (inclusive).
pub fn exclude_shots_over_tof_window(
    data: &FilteredIonData,
    max_ions: u32,
    window: (u32, u32),
    tally: &mut StageTally,
) -> FilteredIonData {
    let (lower, upper) = window;
    let (filtered, shots, ions) = data.retain_shots(|_, arrivals| {
        let in_window = arrivals
            .iter()
            .filter(|&&b| b >= lower && b <= upper)
            .count();
        in_window as u32 <= max_ions
    });
    tally.excluded_shots += shots;
    tally.excluded_ions += ions;
    filtered
}

fn sliding_window_violated(arrivals: &[u32], max_ions: u32, window_bins: u32) -> bool {
    if arrivals.len() as u32 <= max_ions {
        return false;
    }
    let mut sorted = arrivals.to_vec();
    sorted.sort_unstable();

    // Two pointers over the sorted arrivals: for each anchor i, advance j
    // to the last ion still inside [t_i, t_i + window_bins].
    let mut j = 0usize;
    for i in 0..sorted.len() {
        if j < i {
            j = i;
        }
        let limit = sorted[i].saturating_add(window_bins);
        while j + 1 < sorted.len() && sorted[j + 1] <= limit {
            j += 1;
        }
        if (j - i + 1) as u32 > max_ions {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ions_per_shot: Vec<u32>, arrival_bins: Vec<u32>) -> RawIonData {
        RawIonData::new(ions_per_shot, arrival_bins, 0, 999, 100).unwrap()
    }

    #[test]
    fn test_disabled_filters_are_identity() {
        let raw = raw(vec![2, 0, 3], vec![1, 2, 10, 11, 12]);
        let spec = FilterSpecification::default();
        let (filtered, report) = apply(&raw, &spec).unwrap();

        assert_eq!(filtered.ions_per_shot, raw.ions_per_shot);
        assert_eq!(filtered.arrival_bins, raw.arrival_bins);
        assert_eq!(report, ExclusionReport::default());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let raw = raw(
            vec![3, 0, 5, 1, 2],
            vec![1, 2, 3, 10, 11, 12, 13, 14, 40, 50, 51],
        );
        let mut spec = FilterSpecification::default();
        spec.max_ions_per_shot.enabled = true;
        spec.max_ions_per_shot.max_ions = 3;
        spec.spectrum_part.enabled = true;
        spec.spectrum_part.ranges = vec![(4, 4)];

        let first = apply(&raw, &spec).unwrap();
        let second = apply(&raw, &spec).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_ions_per_shot_scenario() {
        // 10 shots, all empty except shot 5 (12 ions) and shot 9 (1 ion).
        let mut ions_per_shot = vec![0u32; 10];
        ions_per_shot[4] = 12;
        ions_per_shot[8] = 1;
        let mut arrivals: Vec<u32> = (100..112).collect();
        arrivals.push(500);
        let raw = raw(ions_per_shot, arrivals);

        let mut spec = FilterSpecification::default();
        spec.max_ions_per_shot.enabled = true;
        spec.max_ions_per_shot.max_ions = 5;

        let (filtered, report) = apply(&raw, &spec).unwrap();
        assert_eq!(report.max_ions_per_shot.excluded_shots, 1);
        assert_eq!(report.max_ions_per_shot.excluded_ions, 12);
        assert!(filtered.shot_excluded[4]);
        assert!(!filtered.shot_excluded[8]);
        assert_eq!(filtered.shot(8), &[500]);
        assert_eq!(filtered.retained_shots(), 9);
    }

    #[test]
    fn test_shot_range_exclusion_is_one_indexed_inclusive() {
        let raw = raw(vec![1, 1, 1, 1], vec![10, 20, 30, 40]);
        let mut spec = FilterSpecification::default();
        spec.spectrum_part.enabled = true;
        spec.spectrum_part.ranges = vec![(2, 3)];

        let (filtered, report) = apply(&raw, &spec).unwrap();
        assert_eq!(filtered.shot_excluded, vec![false, true, true, false]);
        assert_eq!(report.spectrum_part.excluded_shots, 2);
        assert_eq!(report.spectrum_part.excluded_ions, 2);
    }

    #[test]
    fn test_sliding_window_excludes_dense_shot() {
        // Shot 0: three ions within 5 channels. Shot 1: three ions spread out.
        let raw = raw(vec![3, 3], vec![100, 102, 104, 200, 300, 400]);
        let mut spec = FilterSpecification::default();
        spec.max_ions_per_time.enabled = true;
        spec.max_ions_per_time.max_ions = 2;
        spec.max_ions_per_time.window_bins = 5;

        let (filtered, report) = apply(&raw, &spec).unwrap();
        assert_eq!(filtered.shot_excluded, vec![true, false]);
        assert_eq!(report.max_ions_per_time.excluded_shots, 1);
        assert_eq!(report.max_ions_per_time.excluded_ions, 3);
    }

    #[test]
    fn test_sliding_window_bounds_are_inclusive() {
        // Ions at 100 and 105 with a window of 5: both fall inside the
        // anchored window [100, 105].
        assert!(sliding_window_violated(&[100, 105], 1, 5));
        assert!(!sliding_window_violated(&[100, 106], 1, 5));
    }

    #[test]
    fn test_tof_window_filter() {
        // Shot 0 has 3 ions inside [100, 110], shot 1 only 1.
        let raw = raw(vec![4, 2], vec![100, 105, 110, 500, 108, 600]);
        let mut spec = FilterSpecification::default();
        spec.max_ions_per_tof_window.enabled = true;
        spec.max_ions_per_tof_window.max_ions = 2;
        spec.max_ions_per_tof_window.window = (100, 110);

        let (filtered, report) = apply(&raw, &spec).unwrap();
        assert_eq!(filtered.shot_excluded, vec![true, false]);
        assert_eq!(report.max_ions_per_tof_window.excluded_ions, 4);
    }

    #[test]
    fn test_stage_order_determines_attribution() {
        // One shot violating both the ion-count cap and the ToF window cap.
        // The normative order credits the exclusion to the ion-count stage;
        // running the stages swapped credits the ToF window stage instead,
        // so the pipeline result is order-dependent.
        let raw = raw(vec![6], vec![100, 101, 102, 103, 104, 105]);

        let data = FilteredIonData::from_raw(&raw);
        let mut report_normative = ExclusionReport::default();
        let step = exclude_shots_over_ion_count(&data, 5, &mut report_normative.max_ions_per_shot);
        let _ = exclude_shots_over_tof_window(
            &step,
            2,
            (100, 110),
            &mut report_normative.max_ions_per_tof_window,
        );

        let mut report_swapped = ExclusionReport::default();
        let step = exclude_shots_over_tof_window(
            &data,
            2,
            (100, 110),
            &mut report_swapped.max_ions_per_tof_window,
        );
        let _ = exclude_shots_over_ion_count(&step, 5, &mut report_swapped.max_ions_per_shot);

        assert_eq!(report_normative.max_ions_per_shot.excluded_shots, 1);
        assert_eq!(report_normative.max_ions_per_tof_window.excluded_shots, 0);
        assert_eq!(report_swapped.max_ions_per_shot.excluded_shots, 0);
        assert_eq!(report_swapped.max_ions_per_tof_window.excluded_shots, 1);
        assert_ne!(report_normative, report_swapped);
    }

    #[test]
    fn test_invalid_spec_blocks_pipeline() {
        let raw = raw(vec![1], vec![10]);
        let mut spec = FilterSpecification::default();
        spec.max_ions_per_pkg.enabled = true;
        assert!(matches!(
            apply(&raw, &spec).unwrap_err(),
            EvalError::Configuration(_)
        ));
    }
}
