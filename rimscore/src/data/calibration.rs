use std::fmt;
use std::fmt::Formatter;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// One user-picked calibration point: a time-of-flight and the mass it
/// corresponds to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalAnchor {
    pub tof_ns: f64,
    pub mass: f64,
}

/// A monotonic mapping from time-of-flight to mass.
///
/// Uses the standard ToF relation `t = a * sqrt(m) + t0`. The two
/// coefficients are obtained by a linear least-squares fit in `sqrt(m)`
/// over the anchor points, so any number of anchors >= 2 is accepted.
/// The fitted coefficients are an invariant of the anchor set; the struct
/// can only be built through [`MassCalibration::new`], which keeps them
/// consistent.
#[derive(Clone, Debug, PartialEq)]
pub struct MassCalibration {
    anchors: Vec<CalAnchor>,
    coeff_a: f64,
    coeff_t0: f64,
}

impl MassCalibration {
    /// Fits a calibration to the given anchor points.
    ///
    /// # Arguments
    ///
    /// * `anchors` - At least two `(tof_ns, mass)` pairs with positive
    ///   masses and at least two distinct mass values.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::data::calibration::{CalAnchor, MassCalibration};
    ///
    /// let cal = MassCalibration::new(vec![
    ///     CalAnchor { tof_ns: 1000.0, mass: 1.0 },
    ///     CalAnchor { tof_ns: 2000.0, mass: 4.0 },
    /// ]).unwrap();
    /// assert!((cal.mass(2000.0) - 4.0).abs() < 1e-9);
    /// ```
    pub fn new(anchors: Vec<CalAnchor>) -> Result<Self, EvalError> {
        if anchors.len() < 2 {
            return Err(EvalError::Configuration(
                "mass calibration requires at least two anchors".to_string(),
            ));
        }
        if anchors.iter().any(|a| a.mass <= 0.0) {
            return Err(EvalError::Configuration(
                "mass calibration anchors must have positive masses".to_string(),
            ));
        }
        let distinct = anchors
            .iter()
            .any(|a| (a.mass - anchors[0].mass).abs() > f64::EPSILON);
        if !distinct {
            return Err(EvalError::Calculation(
                "mass calibration anchors are degenerate: all masses equal".to_string(),
            ));
        }

        let n = anchors.len();
        let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { anchors[i].mass.sqrt() } else { 1.0 });
        let rhs = DVector::from_fn(n, |i, _| anchors[i].tof_ns);

        let svd = design.svd(true, true);
        let coeffs = svd
            .solve(&rhs, 1.0e-12)
            .map_err(|e| EvalError::Calculation(format!("mass calibration fit failed: {e}")))?;

        let coeff_a = coeffs[(0, 0)];
        let coeff_t0 = coeffs[(1, 0)];
        if coeff_a <= 0.0 {
            return Err(EvalError::Calculation(format!(
                "mass calibration is not monotonic (a = {coeff_a})"
            )));
        }

        Ok(MassCalibration {
            anchors,
            coeff_a,
            coeff_t0,
        })
    }

    /// The anchor points this calibration was fitted to.
    pub fn anchors(&self) -> &[CalAnchor] {
        &self.anchors
    }

    /// Maps one time-of-flight to a mass. Times before the fitted `t0`
    /// map to mass zero.
    pub fn mass(&self, tof_ns: f64) -> f64 {
        let s = (tof_ns - self.coeff_t0) / self.coeff_a;
        if s <= 0.0 {
            0.0
        } else {
            s * s
        }
    }

    /// Maps a whole ToF axis to masses.
    pub fn mass_axis(&self, tof_ns: &[f64]) -> Vec<f64> {
        tof_ns.iter().map(|&t| self.mass(t)).collect()
    }
}

impl fmt::Display for MassCalibration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MassCalibration(anchors: {}, t = {:.4} * sqrt(m) + {:.4})",
            self.anchors.len(),
            self.coeff_a,
            self.coeff_t0
        )
    }
}
