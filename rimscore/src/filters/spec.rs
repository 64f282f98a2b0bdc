use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Excludes user-chosen shot ranges from the spectrum.
///
/// Ranges are 1-indexed and inclusive on both ends, matching how shot
/// numbers are displayed and entered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotRangeFilter {
    pub enabled: bool,
    pub ranges: Vec<(u32, u32)>,
}

/// Excludes shots that registered more than `max_ions` ions.
///
/// Violating shots are excluded entirely, never truncated: a partial shot
/// would bias time-differential statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxIonsPerShotFilter {
    pub enabled: bool,
    pub max_ions: u32,
}

/// Excludes shots where more than `max_ions` ions arrive within any
/// sliding window of `window_bins` channels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxIonsPerTimeFilter {
    pub enabled: bool,
    pub max_ions: u32,
    pub window_bins: u32,
}

/// Excludes shots with more than `max_ions` ions inside the fixed
/// arrival-channel window `[window.0, window.1]` (inclusive).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxIonsPerTofWindowFilter {
    pub enabled: bool,
    pub max_ions: u32,
    pub window: (u32, u32),
}

/// Partition directive for the packaging stage: group consecutive shots
/// into packages of `shots_per_package`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageFilter {
    pub enabled: bool,
    pub shots_per_package: u32,
}

impl Default for PackageFilter {
    fn default() -> Self {
        PackageFilter {
            enabled: false,
            shots_per_package: 1000,
        }
    }
}

/// Drops whole packages whose total ion count exceeds `max_ions`.
/// Requires packaging to be enabled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxIonsPerPackageFilter {
    pub enabled: bool,
    pub max_ions: u32,
}

/// Non-paralyzable dead-time correction of the final histogram.
/// `dead_bins == 0` is the identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadTimeFilter {
    pub enabled: bool,
    pub dead_bins: u32,
}

/// The full set of filter toggles and parameters for one evaluation.
///
/// This is a pure configuration value object; parameters survive toggling
/// a filter off, mirroring the controls they are set from. The pipeline
/// applies the ion filters in the field order below, which is normative.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpecification {
    pub spectrum_part: ShotRangeFilter,
    pub max_ions_per_shot: MaxIonsPerShotFilter,
    pub max_ions_per_time: MaxIonsPerTimeFilter,
    pub max_ions_per_tof_window: MaxIonsPerTofWindowFilter,
    pub packages: PackageFilter,
    pub max_ions_per_pkg: MaxIonsPerPackageFilter,
    pub dead_time_corr: DeadTimeFilter,
}

impl FilterSpecification {
    /// Checks internal consistency against an acquisition of `nof_shots`
    /// shots. Called by the pipeline before any filter runs; has no side
    /// effects.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::filters::spec::FilterSpecification;
    ///
    /// let spec = FilterSpecification::default();
    /// assert!(spec.validate(1000).is_ok());
    /// ```
    pub fn validate(&self, nof_shots: usize) -> Result<(), EvalError> {
        if self.max_ions_per_pkg.enabled && !self.packages.enabled {
            return Err(EvalError::Configuration(
                "max ions per package requires packages to be enabled".to_string(),
            ));
        }
        if self.packages.enabled && self.packages.shots_per_package == 0 {
            return Err(EvalError::Configuration(
                "shots per package must be positive".to_string(),
            ));
        }
        if self.max_ions_per_time.enabled && self.max_ions_per_time.window_bins == 0 {
            return Err(EvalError::Configuration(
                "max ions per time window width must be positive".to_string(),
            ));
        }
        if self.max_ions_per_tof_window.enabled {
            let (lower, upper) = self.max_ions_per_tof_window.window;
            if lower > upper {
                return Err(EvalError::InvalidRange(format!(
                    "ToF window [{lower}, {upper}] is inverted"
                )));
            }
        }
        if self.spectrum_part.enabled {
            validate_shot_ranges(&self.spectrum_part.ranges, nof_shots)?;
        }
        Ok(())
    }
}

/// Checks that the 1-indexed, inclusive shot ranges are well-formed,
/// within `[1, nof_shots]`, and pairwise non-overlapping.
fn validate_shot_ranges(ranges: &[(u32, u32)], nof_shots: usize) -> Result<(), EvalError> {
    for &(start, end) in ranges {
        if start == 0 || start > end {
            return Err(EvalError::InvalidRange(format!(
                "shot range [{start}, {end}] is malformed (1-indexed, start <= end)"
            )));
        }
        if end as usize > nof_shots {
            return Err(EvalError::InvalidRange(format!(
                "shot range [{start}, {end}] exceeds acquisition of {nof_shots} shots"
            )));
        }
    }

    let mut sorted: Vec<(u32, u32)> = ranges.to_vec();
    sorted.sort_unstable();
    for pair in sorted.windows(2) {
        let (_, prev_end) = pair[0];
        let (next_start, next_end) = pair[1];
        if next_start <= prev_end {
            return Err(EvalError::InvalidRange(format!(
                "shot ranges overlap at [{next_start}, {next_end}]"
            )));
        }
    }
    Ok(())
}
