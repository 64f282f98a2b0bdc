use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use rimscore::analysis::deltas::NormIsotopes;
use rimscore::analysis::integrals::{BackgroundDefinition, IntegralDefinitions, PeakDefinition};
use rimscore::data::calibration::{CalAnchor, MassCalibration};
use rimscore::filters::spec::FilterSpecification;

use crate::error::CrdError;
use crate::processor::CrdFileProcessor;

/// Serialized calibration: everything a user dialed in for one file.
///
/// Peaks, backgrounds and mass-calibration anchors are stored as plain
/// lists and re-validated through the regular constructors when loaded,
/// so a hand-edited file cannot smuggle in inconsistent definitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub filters: FilterSpecification,
    pub mass_cal: Option<Vec<CalAnchor>>,
    pub peaks: Vec<PeakDefinition>,
    pub backgrounds: Vec<BackgroundDefinition>,
    pub bg_correct: bool,
    pub norm_isotopes: NormIsotopes,
}

impl CalibrationFile {
    /// Snapshots a processor's current settings.
    pub fn from_processor(processor: &CrdFileProcessor) -> Self {
        CalibrationFile {
            filters: processor.filters().clone(),
            mass_cal: processor
                .mass_calibration()
                .map(|cal| cal.anchors().to_vec()),
            peaks: processor.integral_definitions().peaks().to_vec(),
            backgrounds: processor.integral_definitions().backgrounds().to_vec(),
            bg_correct: processor.bg_correct(),
            norm_isotopes: processor.norm_isotopes().clone(),
        }
    }

    /// Applies these settings to a processor, re-validating everything
    /// against that file. The processor ends up `Outdated` (or `Fresh`);
    /// recalculation stays explicit.
    pub fn apply_to(&self, processor: &mut CrdFileProcessor) -> Result<(), CrdError> {
        processor.set_filters(self.filters.clone())?;

        let mut defs = IntegralDefinitions::new();
        for peak in &self.peaks {
            defs.add_peak(peak.clone())?;
        }
        for background in &self.backgrounds {
            defs.add_background(background.clone())?;
        }
        processor.set_integral_definitions(defs);

        let mass_cal = match &self.mass_cal {
            Some(anchors) => Some(MassCalibration::new(anchors.clone())?),
            None => None,
        };
        processor.set_mass_calibration(mass_cal);
        processor.set_norm_isotopes(self.norm_isotopes.clone());
        processor.set_bg_correct(self.bg_correct);
        Ok(())
    }
}

/// The calibration file that belongs to a CRD file:
/// `spectrum.crd` -> `spectrum.cal.json`.
pub fn default_cal_path(crd_path: &Path) -> PathBuf {
    crd_path.with_extension("cal.json")
}

/// Saves a processor's settings. With `path == None` the default
/// per-file location next to the CRD is used; the chosen path is
/// returned.
pub fn save(processor: &CrdFileProcessor, path: Option<&Path>) -> Result<PathBuf, CrdError> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => default_cal_path(processor.path()),
    };

    let calibration = CalibrationFile::from_processor(processor);
    let file = File::create(&target)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &calibration)
        .map_err(|e| CrdError::CalFile(e.to_string()))?;
    debug!("saved calibration to {}", target.display());
    Ok(target)
}

/// Loads a calibration file into a processor. With `path == None` the
/// default per-file location is used.
pub fn load(processor: &mut CrdFileProcessor, path: Option<&Path>) -> Result<(), CrdError> {
    let source = match path {
        Some(p) => p.to_path_buf(),
        None => default_cal_path(processor.path()),
    };

    let file = File::open(&source)?;
    let calibration: CalibrationFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CrdError::CalFile(format!("{}: {e}", source.display())))?;
    calibration.apply_to(processor)
}
