use std::path::Path;

use csv::Writer;
use log::debug;

use crate::error::CrdError;
use crate::processor::CrdFileProcessor;

/// Writes the current integrals (and their isotope ratios, if any) as
/// csv, one row per peak in definition order.
pub fn export_integrals(processor: &CrdFileProcessor, path: &Path) -> Result<(), CrdError> {
    let integrals = processor
        .integrals()
        .ok_or_else(|| CrdError::Stale("integrals have not been calculated".to_string()))?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["peak", "counts", "uncertainty", "bg_corrected"])?;
    for integral in integrals {
        writer.write_record([
            integral.name.clone(),
            integral.counts.to_string(),
            integral.uncertainty.to_string(),
            integral.bg_corrected.to_string(),
        ])?;
    }
    writer.flush()?;
    debug!("exported {} integrals to {}", integrals.len(), path.display());
    Ok(())
}

/// Writes the isotope-ratio deltas as csv.
pub fn export_deltas(processor: &CrdFileProcessor, path: &Path) -> Result<(), CrdError> {
    let deltas = processor
        .deltas()
        .ok_or_else(|| CrdError::Stale("deltas have not been calculated".to_string()))?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["isotope", "reference", "ratio", "uncertainty"])?;
    for delta in deltas {
        writer.write_record([
            delta.name.clone(),
            delta.reference.clone(),
            delta.ratio.to_string(),
            delta.uncertainty.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the per-package integrals as csv: one row per package and
/// peak, with the package's original shot range (1-indexed, inclusive)
/// alongside.
pub fn export_package_integrals(
    processor: &CrdFileProcessor,
    path: &Path,
) -> Result<(), CrdError> {
    let packages = processor
        .packages()
        .ok_or_else(|| CrdError::Stale("packages have not been calculated".to_string()))?;
    let package_integrals = processor
        .package_integrals()
        .ok_or_else(|| CrdError::Stale("package integrals have not been calculated".to_string()))?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "package",
        "shot_first",
        "shot_last",
        "peak",
        "counts",
        "uncertainty",
    ])?;
    for (package, integrals) in packages.iter().zip(package_integrals.iter()) {
        for integral in integrals {
            writer.write_record([
                package.index.to_string(),
                (package.shot_start + 1).to_string(),
                (package.shot_end + 1).to_string(),
                integral.name.clone(),
                integral.counts.to_string(),
                integral.uncertainty.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Writes the current spectrum as csv. The first column is the
/// time-of-flight in nanoseconds; a mass column follows when a mass
/// calibration was applied.
pub fn export_spectrum(processor: &CrdFileProcessor, path: &Path) -> Result<(), CrdError> {
    let spectrum = processor
        .spectrum()
        .ok_or_else(|| CrdError::Stale("spectrum has not been calculated".to_string()))?;

    let mut writer = Writer::from_path(path)?;
    let tof = spectrum.tof_ns();
    match &spectrum.mass {
        Some(mass) => {
            writer.write_record(["tof_ns", "mass", "counts"])?;
            for ((t, m), count) in tof.iter().zip(mass.iter()).zip(spectrum.counts.iter()) {
                writer.write_record([t.to_string(), m.to_string(), count.to_string()])?;
            }
        }
        None => {
            writer.write_record(["tof_ns", "counts"])?;
            for (t, count) in tof.iter().zip(spectrum.counts.iter()) {
                writer.write_record([t.to_string(), count.to_string()])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
