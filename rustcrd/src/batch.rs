use std::path::PathBuf;

use log::{info, warn};
use rayon::prelude::*;

use rimscore::analysis::deltas::NormIsotopes;
use rimscore::analysis::integrals::IntegralDefinitions;
use rimscore::filters::spec::FilterSpecification;

use crate::error::CrdError;
use crate::processor::CrdFileProcessor;

/// The settings a batch run applies to every file.
///
/// Taken as one immutable snapshot before the run starts, so edits made
/// while a batch is in flight can never leak into it. Mass calibration
/// is deliberately not part of the snapshot: a calibration belongs to
/// one file and stays per-processor.
#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub filters: FilterSpecification,
    pub integral_defs: IntegralDefinitions,
    pub norm_isotopes: NormIsotopes,
    pub bg_correct: bool,
}

impl BatchSettings {
    /// Snapshots the settings of one processor, typically the file the
    /// user dialed everything in on.
    pub fn from_processor(processor: &CrdFileProcessor) -> Self {
        BatchSettings {
            filters: processor.filters().clone(),
            integral_defs: processor.integral_definitions().clone(),
            norm_isotopes: processor.norm_isotopes().clone(),
            bg_correct: processor.bg_correct(),
        }
    }
}

/// Result of one file inside a batch run.
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<(), CrdError>,
}

/// Applies one settings snapshot to every processor and recalculates
/// them, in parallel across files.
///
/// Files are independent: each processor owns its data and derived
/// state, while the snapshot is shared read-only. A failing file is
/// reported in its outcome and left in its previous status; the batch
/// always runs to the end.
pub fn process_batch(
    processors: &mut [CrdFileProcessor],
    settings: &BatchSettings,
) -> Vec<BatchOutcome> {
    let outcomes: Vec<BatchOutcome> = processors
        .par_iter_mut()
        .map(|processor| {
            let path = processor.path().to_path_buf();
            let result = evaluate_one(processor, settings);
            if let Err(err) = &result {
                warn!("batch: {} failed: {err}", path.display());
            }
            BatchOutcome { path, result }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "batch: {} of {} files evaluated",
        outcomes.len() - failed,
        outcomes.len()
    );
    outcomes
}

fn evaluate_one(
    processor: &mut CrdFileProcessor,
    settings: &BatchSettings,
) -> Result<(), CrdError> {
    // Filter validation runs against this file's shot count, so a
    // specification fine for one file can legitimately fail another.
    processor.set_filters(settings.filters.clone())?;
    processor.set_integral_definitions(settings.integral_defs.clone());
    processor.set_norm_isotopes(settings.norm_isotopes.clone());
    processor.set_bg_correct(settings.bg_correct);
    processor.calculate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::crd::CrdHeader;
    use crate::processor::EvalStatus;
    use rimscore::data::ions::RawIonData;

    fn processor(ions_per_shot: Vec<u32>, arrivals: Vec<u32>) -> CrdFileProcessor {
        let raw = RawIonData::new(ions_per_shot, arrivals, 0, 99, 1000).unwrap();
        let header = CrdHeader::for_data(&raw, 1.0e-4);
        CrdFileProcessor::from_parts(header, raw)
    }

    #[test]
    fn test_batch_applies_snapshot_to_all_files() {
        let mut files = vec![
            processor(vec![1, 1], vec![10, 20]),
            processor(vec![3], vec![10, 11, 12]),
        ];

        let mut template = FilterSpecification::default();
        template.max_ions_per_shot.enabled = true;
        template.max_ions_per_shot.max_ions = 2;
        let settings = BatchSettings {
            filters: template.clone(),
            integral_defs: IntegralDefinitions::new(),
            norm_isotopes: NormIsotopes::new(),
            bg_correct: false,
        };

        let outcomes = process_batch(&mut files, &settings);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        for file in &files {
            assert_eq!(file.status(), EvalStatus::Current);
            assert_eq!(file.filters(), &template);
        }
        // The second file's only shot is over the cap.
        assert_eq!(files[1].spectrum().unwrap().total_counts(), 0.0);
    }

    #[test]
    fn test_failing_file_does_not_abort_the_batch() {
        // File 0 is fine. File 1 saturates the dead-time model: more
        // counts in one channel than it has shots.
        let mut files = vec![
            processor(vec![1, 1, 1, 1], vec![10, 20, 30, 40]),
            processor(vec![5], vec![10, 10, 10, 10, 10]),
        ];
        files[1].calculate().unwrap();
        assert_eq!(files[1].status(), EvalStatus::Current);

        let mut filters = FilterSpecification::default();
        filters.dead_time_corr.enabled = true;
        filters.dead_time_corr.dead_bins = 2;
        let settings = BatchSettings {
            filters,
            integral_defs: IntegralDefinitions::new(),
            norm_isotopes: NormIsotopes::new(),
            bg_correct: false,
        };

        let outcomes = process_batch(&mut files, &settings);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());

        assert_eq!(files[0].status(), EvalStatus::Current);
        // The failed file fell back to its prior outdated state; its
        // previous results are still there.
        assert_eq!(files[1].status(), EvalStatus::Outdated);
        assert!(files[1].spectrum().is_some());
    }
}
