use rimscore::data::ions::FilteredIonData;
use rimscore::data::spectrum::TofSpectrum;
use rimscore::error::EvalError;
use rimscore::filters::packages::Package;
use rimscore::filters::pipeline::ExclusionReport;

/// The mutable mid-pipeline state a user macro operates on.
///
/// A macro runs after the ion filters and the packaging stage, before
/// dead-time correction and integral computation, so everything it
/// changes here flows into the derived results of the current
/// calculation.
#[derive(Clone, Debug)]
pub struct PipelineState {
    pub filtered: FilteredIonData,
    pub report: ExclusionReport,
    pub packages: Vec<Package>,
    pub dropped_packages: usize,
    pub spectrum: TofSpectrum,
    pub package_spectra: Vec<TofSpectrum>,
}

/// A user-supplied transformation hooked into the calculation.
///
/// Macros are trusted local code running with full access to the
/// processor's pipeline state; there is no sandboxing. Anything a macro
/// returns as an error aborts the current calculation and surfaces as a
/// `Calculation` error on the owning file, leaving the previously
/// computed results untouched.
pub trait ProcessorMacro: Send + Sync {
    /// Name shown in logs and error messages.
    fn name(&self) -> &str;

    fn run(&self, state: &mut PipelineState) -> Result<(), EvalError>;
}
