// data module
pub mod data {
    pub mod ions;
    pub mod spectrum;
    pub mod calibration;
}

// filter module
pub mod filters {
    pub mod spec;
    pub mod pipeline;
    pub mod packages;
}

// analysis module
pub mod analysis {
    pub mod dead_time;
    pub mod integrals;
    pub mod deltas;
}

// chemistry module
pub mod chemistry {
    pub mod isotopes;
}

pub mod error;

pub use crate::data::ions::{FilteredIonData, RawIonData};
pub use crate::data::spectrum::TofSpectrum;
pub use crate::data::calibration::MassCalibration;
pub use crate::filters::spec::FilterSpecification;
pub use crate::filters::pipeline::{apply, ExclusionReport};
pub use crate::filters::packages::{package, Package};
pub use crate::analysis::integrals::{Integral, IntegralDefinitions, PeakDefinition};
pub use crate::analysis::deltas::{IntegralDelta, NormIsotopes};
pub use crate::error::EvalError;
