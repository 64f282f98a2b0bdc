use std::fmt;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use rimscore::analysis::deltas::{integral_deltas, IntegralDelta, NormIsotopes};
use rimscore::analysis::integrals::{integrate, integrate_packages, Integral, IntegralDefinitions};
use rimscore::analysis::dead_time;
use rimscore::data::calibration::MassCalibration;
use rimscore::data::ions::{FilteredIonData, RawIonData};
use rimscore::data::spectrum::TofSpectrum;
use rimscore::error::EvalError;
use rimscore::filters::packages::{package, Package};
use rimscore::filters::pipeline::{apply, ExclusionReport};
use rimscore::filters::spec::FilterSpecification;

use crate::calfile;
use crate::data::crd::{read_crd, CrdHeader};
use crate::error::CrdError;
use crate::macros::{PipelineState, ProcessorMacro};

/// Where a file's derived data stands relative to its inputs.
///
/// `Fresh` means nothing has been calculated yet; `Outdated` means a
/// calculation exists but an upstream input changed since. Derived data
/// is never silently served as current: every accessor pairs with
/// [`CrdFileProcessor::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalStatus {
    Fresh,
    Current,
    Outdated,
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvalStatus::Fresh => write!(f, "not calculated"),
            EvalStatus::Current => write!(f, "current"),
            EvalStatus::Outdated => write!(f, "outdated"),
        }
    }
}

/// Notified whenever a processor's [`EvalStatus`] changes, e.g. to drive
/// a status indicator or refresh a view.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, status: EvalStatus);
}

/// Everything one calculation derives from the raw data. Replaced
/// wholesale on a successful run, untouched by a failed one.
struct Derived {
    filtered: FilteredIonData,
    report: ExclusionReport,
    spectrum: TofSpectrum,
    packages: Vec<Package>,
    dropped_packages: usize,
    package_spectra: Vec<TofSpectrum>,
    integrals: Vec<Integral>,
    deltas: Vec<IntegralDelta>,
    package_integrals: Vec<Vec<Integral>>,
}

/// One opened CRD file with its evaluation state.
///
/// Owns the immutable raw data, the mutable user-driven inputs (filters,
/// integral definitions, mass calibration, normalizing isotopes) and the
/// derived results of the last calculation. All mutation goes through
/// setters that flip the status to `Outdated`; recomputation is explicit
/// through [`CrdFileProcessor::calculate`].
pub struct CrdFileProcessor {
    path: PathBuf,
    header: CrdHeader,
    raw: RawIonData,

    filters: FilterSpecification,
    integral_defs: IntegralDefinitions,
    mass_cal: Option<MassCalibration>,
    norm_isotopes: NormIsotopes,
    bg_correct: bool,
    macro_hook: Option<Box<dyn ProcessorMacro>>,

    status: EvalStatus,
    derived: Option<Derived>,
    observers: Vec<Box<dyn StatusObserver>>,
}

impl CrdFileProcessor {
    /// Opens a CRD file. A calibration file sitting next to it
    /// (`<name>.cal.json`) is loaded automatically.
    pub fn open(path: &Path) -> Result<Self, CrdError> {
        let (header, raw) = read_crd(path)?;
        let mut processor = CrdFileProcessor::from_parts(header, raw);
        processor.path = path.to_path_buf();

        let cal_path = calfile::default_cal_path(path);
        if cal_path.exists() {
            calfile::load(&mut processor, Some(&cal_path))?;
            info!("loaded calibration {}", cal_path.display());
        }
        Ok(processor)
    }

    /// Builds a processor from already-read parts, e.g. synthetic data.
    pub fn from_parts(header: CrdHeader, raw: RawIonData) -> Self {
        CrdFileProcessor {
            path: PathBuf::new(),
            header,
            raw,
            filters: FilterSpecification::default(),
            integral_defs: IntegralDefinitions::new(),
            mass_cal: None,
            norm_isotopes: NormIsotopes::new(),
            bg_correct: false,
            macro_hook: None,
            status: EvalStatus::Fresh,
            derived: None,
            observers: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &CrdHeader {
        &self.header
    }

    pub fn raw(&self) -> &RawIonData {
        &self.raw
    }

    pub fn status(&self) -> EvalStatus {
        self.status
    }

    pub fn filters(&self) -> &FilterSpecification {
        &self.filters
    }

    pub fn integral_definitions(&self) -> &IntegralDefinitions {
        &self.integral_defs
    }

    pub fn mass_calibration(&self) -> Option<&MassCalibration> {
        self.mass_cal.as_ref()
    }

    pub fn norm_isotopes(&self) -> &NormIsotopes {
        &self.norm_isotopes
    }

    pub fn bg_correct(&self) -> bool {
        self.bg_correct
    }

    /// Registers an observer for status changes.
    pub fn subscribe(&mut self, observer: Box<dyn StatusObserver>) {
        self.observers.push(observer);
    }

    // Setters: every upstream mutation invalidates the derived data
    // without recomputing or touching it.

    /// Replaces the filter specification. Validation runs against this
    /// file's shot count and blocks inconsistent specifications.
    pub fn set_filters(&mut self, filters: FilterSpecification) -> Result<(), EvalError> {
        filters.validate(self.raw.nof_shots)?;
        self.filters = filters;
        self.mark_outdated();
        Ok(())
    }

    pub fn set_integral_definitions(&mut self, defs: IntegralDefinitions) {
        self.integral_defs = defs;
        self.mark_outdated();
    }

    pub fn set_mass_calibration(&mut self, cal: Option<MassCalibration>) {
        self.mass_cal = cal;
        self.mark_outdated();
    }

    pub fn set_norm_isotopes(&mut self, norm: NormIsotopes) {
        self.norm_isotopes = norm;
        self.mark_outdated();
    }

    pub fn set_bg_correct(&mut self, bg_correct: bool) {
        self.bg_correct = bg_correct;
        self.mark_outdated();
    }

    pub fn set_macro(&mut self, macro_hook: Option<Box<dyn ProcessorMacro>>) {
        self.macro_hook = macro_hook;
        self.mark_outdated();
    }

    // Derived data accessors. `None` until the first successful
    // calculation; check `status()` to know whether values are current.

    pub fn spectrum(&self) -> Option<&TofSpectrum> {
        self.derived.as_ref().map(|d| &d.spectrum)
    }

    pub fn filtered(&self) -> Option<&FilteredIonData> {
        self.derived.as_ref().map(|d| &d.filtered)
    }

    pub fn exclusion_report(&self) -> Option<&ExclusionReport> {
        self.derived.as_ref().map(|d| &d.report)
    }

    pub fn packages(&self) -> Option<&[Package]> {
        self.derived.as_ref().map(|d| d.packages.as_slice())
    }

    pub fn dropped_packages(&self) -> Option<usize> {
        self.derived.as_ref().map(|d| d.dropped_packages)
    }

    pub fn package_spectra(&self) -> Option<&[TofSpectrum]> {
        self.derived.as_ref().map(|d| d.package_spectra.as_slice())
    }

    pub fn integrals(&self) -> Option<&[Integral]> {
        self.derived.as_ref().map(|d| d.integrals.as_slice())
    }

    /// Lazy view over the integrals, in peak-definition order.
    pub fn integrals_iter(&self) -> impl Iterator<Item = &Integral> {
        self.derived.as_ref().into_iter().flat_map(|d| d.integrals.iter())
    }

    pub fn deltas(&self) -> Option<&[IntegralDelta]> {
        self.derived.as_ref().map(|d| d.deltas.as_slice())
    }

    pub fn package_integrals(&self) -> Option<&[Vec<Integral>]> {
        self.derived.as_ref().map(|d| d.package_integrals.as_slice())
    }

    /// Runs the full evaluation pipeline over this file.
    ///
    /// Blocking and synchronous; either completes and commits a whole new
    /// set of derived data, or fails and leaves the previous derived data
    /// and status untouched (no torn state). On success the status
    /// becomes `Current`.
    pub fn calculate(&mut self) -> Result<(), CrdError> {
        let (filtered, report) = apply(&self.raw, &self.filters)?;
        let (packages, dropped_packages) = package(&filtered, &self.filters)?;

        let spectrum = TofSpectrum::from_arrivals(
            &filtered.arrival_bins,
            filtered.bin_start,
            filtered.bin_end,
            filtered.bin_width_ps,
        );
        let package_spectra: Vec<TofSpectrum> = packages.iter().map(|p| p.spectrum()).collect();

        let mut state = PipelineState {
            filtered,
            report,
            packages,
            dropped_packages,
            spectrum,
            package_spectra,
        };

        if let Some(hook) = &self.macro_hook {
            debug!("running user macro '{}'", hook.name());
            hook.run(&mut state).map_err(|e| {
                EvalError::Calculation(format!("user macro '{}' failed: {e}", hook.name()))
            })?;
        }

        if self.filters.dead_time_corr.enabled {
            let dead_bins = self.filters.dead_time_corr.dead_bins;
            state.spectrum = dead_time::correct(&state.spectrum, self.raw.nof_shots, dead_bins)?;
            let mut corrected = Vec::with_capacity(state.package_spectra.len());
            for (pkg, pkg_spectrum) in state.packages.iter().zip(state.package_spectra.iter()) {
                corrected.push(dead_time::correct(pkg_spectrum, pkg.nof_shots, dead_bins)?);
            }
            state.package_spectra = corrected;
        }

        if let Some(cal) = &self.mass_cal {
            state.spectrum.apply_mass_calibration(cal);
            for pkg_spectrum in &mut state.package_spectra {
                pkg_spectrum.apply_mass_calibration(cal);
            }
        }

        let (integrals, deltas, package_integrals) = if self.integral_defs.is_empty() {
            (Vec::new(), Vec::new(), Vec::new())
        } else {
            let integrals = integrate(&state.spectrum, &self.integral_defs, self.bg_correct)?;
            let deltas = integral_deltas(&integrals, &self.norm_isotopes);
            let package_integrals =
                integrate_packages(&state.package_spectra, &self.integral_defs, self.bg_correct)?;
            (integrals, deltas, package_integrals)
        };

        self.derived = Some(Derived {
            filtered: state.filtered,
            report: state.report,
            spectrum: state.spectrum,
            packages: state.packages,
            dropped_packages: state.dropped_packages,
            package_spectra: state.package_spectra,
            integrals,
            deltas,
            package_integrals,
        });
        self.set_status(EvalStatus::Current);
        Ok(())
    }

    fn mark_outdated(&mut self) {
        if self.status == EvalStatus::Current {
            self.set_status(EvalStatus::Outdated);
        }
    }

    fn set_status(&mut self, status: EvalStatus) {
        if self.status != status {
            self.status = status;
            for observer in &self.observers {
                observer.status_changed(status);
            }
        }
    }
}

impl fmt::Display for CrdFileProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CrdFileProcessor({}, {}, status: {})",
            self.path.display(),
            self.raw,
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rimscore::analysis::integrals::PeakDefinition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn synthetic_processor() -> CrdFileProcessor {
        // 10 shots; shot 5 carries a burst of 12 ions, shot 9 one ion.
        let mut ions_per_shot = vec![0u32; 10];
        ions_per_shot[4] = 12;
        ions_per_shot[8] = 1;
        let mut arrivals: Vec<u32> = (100..112).collect();
        arrivals.push(105);
        let raw = RawIonData::new(ions_per_shot, arrivals, 0, 999, 1000).unwrap();
        let header = CrdHeader::for_data(&raw, 1.0e-4);
        CrdFileProcessor::from_parts(header, raw)
    }

    fn peak(name: &str, lower: f64, upper: f64) -> PeakDefinition {
        PeakDefinition {
            name: name.to_string(),
            lower,
            upper,
        }
    }

    #[test]
    fn test_calculate_produces_current_state() {
        let mut processor = synthetic_processor();
        assert_eq!(processor.status(), EvalStatus::Fresh);

        processor.calculate().unwrap();
        assert_eq!(processor.status(), EvalStatus::Current);

        let spectrum = processor.spectrum().unwrap();
        assert_eq!(spectrum.len(), 1000);
        assert_eq!(spectrum.total_counts(), 13.0);
    }

    #[test]
    fn test_mutation_marks_outdated_without_touching_results() {
        let mut processor = synthetic_processor();
        let mut defs = IntegralDefinitions::new();
        // 1000 ps channels, centers at 100.5 ns etc.
        defs.add_peak(peak("burst", 100.0, 112.0)).unwrap();
        processor.set_integral_definitions(defs.clone());
        processor.calculate().unwrap();

        let before = processor.integrals().unwrap().to_vec();
        assert_eq!(processor.status(), EvalStatus::Current);

        defs.add_peak(peak("tail", 200.0, 210.0)).unwrap();
        processor.set_integral_definitions(defs);

        assert_eq!(processor.status(), EvalStatus::Outdated);
        assert_eq!(processor.integrals().unwrap(), before.as_slice());

        processor.calculate().unwrap();
        assert_eq!(processor.status(), EvalStatus::Current);
        assert_eq!(processor.integrals().unwrap().len(), 2);
    }

    #[test]
    fn test_filters_flow_into_results() {
        let mut processor = synthetic_processor();
        let mut filters = FilterSpecification::default();
        filters.max_ions_per_shot.enabled = true;
        filters.max_ions_per_shot.max_ions = 5;
        processor.set_filters(filters).unwrap();
        processor.calculate().unwrap();

        let report = processor.exclusion_report().unwrap();
        assert_eq!(report.max_ions_per_shot.excluded_shots, 1);
        assert_eq!(report.max_ions_per_shot.excluded_ions, 12);
        assert_eq!(processor.spectrum().unwrap().total_counts(), 1.0);
    }

    #[test]
    fn test_invalid_filters_are_blocked_at_the_setter() {
        let mut processor = synthetic_processor();
        let mut filters = FilterSpecification::default();
        filters.max_ions_per_pkg.enabled = true;

        assert!(processor.set_filters(filters).is_err());
        // The processor keeps its previous, consistent specification.
        assert_eq!(processor.filters(), &FilterSpecification::default());
    }

    #[test]
    fn test_failed_calculation_leaves_previous_results() {
        let mut processor = synthetic_processor();
        processor.calculate().unwrap();
        let before = processor.spectrum().unwrap().clone();

        // 12 ions in shot 5 over 10 shots: the burst channels saturate
        // the dead-time model once enough preceding counts accumulate.
        let mut filters = FilterSpecification::default();
        filters.dead_time_corr.enabled = true;
        filters.dead_time_corr.dead_bins = 20;
        processor.set_filters(filters).unwrap();
        assert_eq!(processor.status(), EvalStatus::Outdated);

        assert!(processor.calculate().is_err());
        assert_eq!(processor.status(), EvalStatus::Outdated);
        assert_eq!(processor.spectrum().unwrap(), &before);
    }

    #[test]
    fn test_packages_and_per_package_integrals() {
        let mut processor = synthetic_processor();
        let mut filters = FilterSpecification::default();
        filters.packages.enabled = true;
        filters.packages.shots_per_package = 4;
        processor.set_filters(filters).unwrap();

        let mut defs = IntegralDefinitions::new();
        defs.add_peak(peak("burst", 100.0, 112.0)).unwrap();
        processor.set_integral_definitions(defs);
        processor.calculate().unwrap();

        let packages = processor.packages().unwrap();
        let sizes: Vec<usize> = packages.iter().map(|p| p.nof_shots).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let per_pkg = processor.package_integrals().unwrap();
        assert_eq!(per_pkg.len(), 3);
        // The burst sits in shot 5, i.e. package 1.
        assert_eq!(per_pkg[0][0].counts, 0.0);
        assert_eq!(per_pkg[1][0].counts, 12.0);
        assert_eq!(per_pkg[2][0].counts, 1.0);
    }

    #[test]
    fn test_macro_runs_between_packaging_and_dead_time() {
        struct DoubleCounts;
        impl ProcessorMacro for DoubleCounts {
            fn name(&self) -> &str {
                "double counts"
            }
            fn run(&self, state: &mut PipelineState) -> Result<(), EvalError> {
                for count in &mut state.spectrum.counts {
                    *count *= 2.0;
                }
                Ok(())
            }
        }

        let mut processor = synthetic_processor();
        processor.set_macro(Some(Box::new(DoubleCounts)));
        processor.calculate().unwrap();
        assert_eq!(processor.spectrum().unwrap().total_counts(), 26.0);
    }

    #[test]
    fn test_failing_macro_surfaces_as_calculation_error() {
        struct Broken;
        impl ProcessorMacro for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn run(&self, _: &mut PipelineState) -> Result<(), EvalError> {
                Err(EvalError::Calculation("deliberate".to_string()))
            }
        }

        let mut processor = synthetic_processor();
        processor.set_macro(Some(Box::new(Broken)));
        let err = processor.calculate().unwrap_err();
        assert!(matches!(err, CrdError::Eval(EvalError::Calculation(_))));
        assert_eq!(processor.status(), EvalStatus::Fresh);
    }

    #[test]
    fn test_observer_sees_status_changes() {
        struct Counter(Arc<AtomicUsize>);
        impl StatusObserver for Counter {
            fn status_changed(&self, _: EvalStatus) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let changes = Arc::new(AtomicUsize::new(0));
        let mut processor = synthetic_processor();
        processor.subscribe(Box::new(Counter(changes.clone())));

        processor.calculate().unwrap();
        processor.set_bg_correct(true);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }
}
