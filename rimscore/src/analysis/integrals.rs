use std::fmt;
use std::fmt::Formatter;

use itertools::izip;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::spectrum::TofSpectrum;
use crate::error::EvalError;

/// A named peak window on the active x-axis (mass when calibrated, ToF
/// otherwise). Bounds are inclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakDefinition {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// A background window attached to a peak by name.
///
/// Several backgrounds may reference the same peak; their windows are
/// pooled when correcting that peak. Background windows may overlap each
/// other and peaks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundDefinition {
    pub peak_name: String,
    pub lower: f64,
    pub upper: f64,
}

/// The peak and background windows of one evaluation.
///
/// The collection upholds its invariants on every edit: peak names are
/// unique, peak windows never overlap, and every background references an
/// existing peak. Integral output order follows the peak order stored
/// here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegralDefinitions {
    peaks: Vec<PeakDefinition>,
    backgrounds: Vec<BackgroundDefinition>,
}

impl IntegralDefinitions {
    pub fn new() -> Self {
        IntegralDefinitions::default()
    }

    /// Adds a peak window.
    ///
    /// Fails with `InvalidRange` on a malformed window, `Configuration`
    /// on a duplicate name, and `PeakOverlap` when the window intersects
    /// an existing peak.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::analysis::integrals::{IntegralDefinitions, PeakDefinition};
    ///
    /// let mut defs = IntegralDefinitions::new();
    /// defs.add_peak(PeakDefinition { name: "54Fe".to_string(), lower: 53.7, upper: 54.2 }).unwrap();
    /// assert_eq!(defs.peaks().len(), 1);
    /// ```
    pub fn add_peak(&mut self, peak: PeakDefinition) -> Result<(), EvalError> {
        if peak.lower >= peak.upper {
            return Err(EvalError::InvalidRange(format!(
                "peak '{}' window [{}, {}] is malformed",
                peak.name, peak.lower, peak.upper
            )));
        }
        if self.peaks.iter().any(|p| p.name == peak.name) {
            return Err(EvalError::Configuration(format!(
                "peak '{}' is already defined",
                peak.name
            )));
        }
        if let Some(other) = self
            .peaks
            .iter()
            .find(|p| peak.lower <= p.upper && p.lower <= peak.upper)
        {
            return Err(EvalError::PeakOverlap {
                first: other.name.clone(),
                second: peak.name,
            });
        }
        self.peaks.push(peak);
        Ok(())
    }

    /// Adds a background window. Fails with `UndefinedReference` when the
    /// referenced peak does not exist.
    pub fn add_background(&mut self, background: BackgroundDefinition) -> Result<(), EvalError> {
        if background.lower >= background.upper {
            return Err(EvalError::InvalidRange(format!(
                "background for '{}' window [{}, {}] is malformed",
                background.peak_name, background.lower, background.upper
            )));
        }
        if !self.peaks.iter().any(|p| p.name == background.peak_name) {
            return Err(EvalError::UndefinedReference {
                peak: background.peak_name,
            });
        }
        self.backgrounds.push(background);
        Ok(())
    }

    /// Removes a peak and every background referencing it.
    pub fn remove_peak(&mut self, name: &str) {
        self.peaks.retain(|p| p.name != name);
        self.backgrounds.retain(|b| b.peak_name != name);
    }

    /// Sorts the peaks by lower bound ascending. This is the ordering the
    /// auto-sort feature exposes and the ordering every consumer sees.
    pub fn sort_peaks(&mut self) {
        self.peaks.sort_by_key(|p| OrderedFloat(p.lower));
    }

    pub fn peaks(&self) -> &[PeakDefinition] {
        &self.peaks
    }

    pub fn backgrounds(&self) -> &[BackgroundDefinition] {
        &self.backgrounds
    }

    pub fn backgrounds_of(&self, peak_name: &str) -> Vec<&BackgroundDefinition> {
        self.backgrounds
            .iter()
            .filter(|b| b.peak_name == peak_name)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// Summed counts of one peak window with its Poisson uncertainty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Integral {
    pub name: String,
    pub counts: f64,
    pub uncertainty: f64,
    /// A background was subtracted from `counts`.
    pub bg_corrected: bool,
    /// Correction was requested but no usable background exists for this
    /// peak; `counts` is the uncorrected sum.
    pub bg_missing: bool,
}

impl fmt::Display for Integral {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Integral({}: {:.2} +/- {:.2})",
            self.name, self.counts, self.uncertainty
        )
    }
}

/// Sums spectrum counts within each defined peak window.
///
/// A bin belongs to a window when its center on the active x-axis lies in
/// `[lower, upper]` (inclusive). Uncertainty is `sqrt(counts)` (Poisson).
/// With `bg_correct`, the pooled background windows of a peak estimate a
/// background rate that is scaled to the peak width and subtracted;
/// uncertainties combine in quadrature with the same scale factor. A peak
/// without a usable background is returned uncorrected and flagged.
///
/// Output order matches the peak definition order.
pub fn integrate(
    spectrum: &TofSpectrum,
    defs: &IntegralDefinitions,
    bg_correct: bool,
) -> Result<Vec<Integral>, EvalError> {
    let axis = spectrum.active_axis();

    defs.peaks()
        .iter()
        .map(|peak| {
            let (raw, peak_bins) = window_sum(&axis, &spectrum.counts, peak.lower, peak.upper);
            if peak_bins == 0 {
                return Err(EvalError::InvalidRange(format!(
                    "peak '{}' window [{}, {}] covers no spectrum bins",
                    peak.name, peak.lower, peak.upper
                )));
            }

            if !bg_correct {
                return Ok(Integral {
                    name: peak.name.clone(),
                    counts: raw,
                    uncertainty: raw.sqrt(),
                    bg_corrected: false,
                    bg_missing: false,
                });
            }

            let mut bg_counts = 0.0f64;
            let mut bg_bins = 0usize;
            for background in defs.backgrounds_of(&peak.name) {
                let (sum, bins) =
                    window_sum(&axis, &spectrum.counts, background.lower, background.upper);
                bg_counts += sum;
                bg_bins += bins;
            }

            if bg_bins == 0 {
                // Requested but not available: uncorrected, flagged, no
                // hard failure.
                return Ok(Integral {
                    name: peak.name.clone(),
                    counts: raw,
                    uncertainty: raw.sqrt(),
                    bg_corrected: false,
                    bg_missing: true,
                });
            }

            let scale = peak_bins as f64 / bg_bins as f64;
            let counts = raw - bg_counts * scale;
            let uncertainty = (raw + bg_counts * scale * scale).sqrt();
            Ok(Integral {
                name: peak.name.clone(),
                counts,
                uncertainty,
                bg_corrected: true,
                bg_missing: false,
            })
        })
        .collect()
}

/// Per-package variant of [`integrate`]: the identical algorithm applied
/// independently to each package spectrum. Results form a
/// package-index x peak matrix.
pub fn integrate_packages(
    spectra: &[TofSpectrum],
    defs: &IntegralDefinitions,
    bg_correct: bool,
) -> Result<Vec<Vec<Integral>>, EvalError> {
    spectra
        .par_iter()
        .map(|spectrum| integrate(spectrum, defs, bg_correct))
        .collect()
}

fn window_sum(axis: &[f64], counts: &[f64], lower: f64, upper: f64) -> (f64, usize) {
    let mut sum = 0.0;
    let mut bins = 0usize;
    for (center, count) in izip!(axis.iter(), counts.iter()) {
        if *center >= lower && *center <= upper {
            sum += count;
            bins += 1;
        }
    }
    (sum, bins)
}
