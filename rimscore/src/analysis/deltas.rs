use std::collections::HashMap;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::integrals::Integral;
use crate::chemistry::isotopes;
use crate::error::EvalError;

/// Which isotope every other isotope of an element is ratioed against.
///
/// Defaults to the most abundant isotope of each element; individual
/// elements can be overridden. This is an explicit value object handed to
/// the delta engine, not ambient state, so a batch run works on a frozen
/// snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormIsotopes {
    overrides: HashMap<String, u32>,
}

impl NormIsotopes {
    pub fn new() -> Self {
        NormIsotopes::default()
    }

    /// Overrides the normalizing isotope for one element. The isotope
    /// must exist in the isotope table.
    ///
    /// # Examples
    ///
    /// ```
    /// use rimscore::analysis::deltas::NormIsotopes;
    ///
    /// let mut norm = NormIsotopes::new();
    /// norm.set("Sr", 86).unwrap();
    /// assert_eq!(norm.normalizing("Sr"), Some(86));
    /// assert_eq!(norm.normalizing("Fe"), Some(56));
    /// ```
    pub fn set(&mut self, element: &str, mass_number: u32) -> Result<(), EvalError> {
        let known = isotopes::isotopes_of(element)
            .is_some_and(|list| list.iter().any(|&(m, _)| m == mass_number));
        if !known {
            return Err(EvalError::Configuration(format!(
                "{mass_number}{element} is not a known isotope"
            )));
        }
        self.overrides.insert(element.to_string(), mass_number);
        Ok(())
    }

    /// The normalizing isotope of an element: the override if set, the
    /// most abundant isotope otherwise.
    pub fn normalizing(&self, element: &str) -> Option<u32> {
        self.overrides
            .get(element)
            .copied()
            .or_else(|| isotopes::most_abundant_isotope(element))
    }
}

/// Ratio of one isotope peak against its element's normalizing isotope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegralDelta {
    pub name: String,
    pub reference: String,
    pub ratio: f64,
    pub uncertainty: f64,
}

/// Computes isotope ratios from a list of integrals.
///
/// Peak names of the form `46Ti` (mass number followed by element symbol)
/// are grouped by element; every element with at least two isotope peaks,
/// one of them the normalizing isotope, contributes one delta per
/// non-normalizing isotope. Uncertainties propagate in quadrature from
/// the two Poisson terms. Peaks whose names are not isotopes are skipped.
///
/// Output order follows the input integral order.
pub fn integral_deltas(integrals: &[Integral], norm: &NormIsotopes) -> Vec<IntegralDelta> {
    let pattern = Regex::new(r"^(\d{1,3})([A-Z][a-z]?)$").expect("isotope pattern is valid");

    // element -> [(mass number, index into integrals)]
    let mut by_element: HashMap<&str, Vec<(u32, usize)>> = HashMap::new();
    for (index, integral) in integrals.iter().enumerate() {
        if let Some((mass_number, element)) = parse_isotope(&pattern, &integral.name) {
            by_element.entry(element).or_default().push((mass_number, index));
        }
    }

    let mut deltas = Vec::new();
    for integral in integrals {
        let Some((mass_number, element)) = parse_isotope(&pattern, &integral.name) else {
            continue;
        };

        let isotopes_seen = &by_element[element];
        if isotopes_seen.len() < 2 {
            continue;
        }
        let Some(norm_mass) = norm.normalizing(element) else {
            warn!("no normalizing isotope known for {element}, skipping deltas");
            continue;
        };
        if mass_number == norm_mass {
            continue;
        }
        let Some(&(_, reference_index)) = isotopes_seen.iter().find(|&&(m, _)| m == norm_mass)
        else {
            warn!(
                "normalizing isotope {norm_mass}{element} has no peak, skipping {}",
                integral.name
            );
            continue;
        };

        let reference = &integrals[reference_index];
        if reference.counts <= 0.0 {
            warn!(
                "normalizing peak {} has no counts, skipping {}",
                reference.name, integral.name
            );
            continue;
        }

        let ratio = integral.counts / reference.counts;
        let uncertainty = if integral.counts > 0.0 {
            ratio
                * ((integral.uncertainty / integral.counts).powi(2)
                    + (reference.uncertainty / reference.counts).powi(2))
                .sqrt()
        } else {
            integral.uncertainty / reference.counts
        };

        deltas.push(IntegralDelta {
            name: integral.name.clone(),
            reference: reference.name.clone(),
            ratio,
            uncertainty,
        });
    }
    deltas
}

/// Splits an isotope peak name like `46Ti` into mass number and element
/// symbol; `None` for anything else.
fn parse_isotope<'a>(pattern: &Regex, name: &'a str) -> Option<(u32, &'a str)> {
    let caps = pattern.captures(name)?;
    let mass_number = caps[1].parse().ok()?;
    let element = caps.get(2)?.as_str();
    Some((mass_number, element))
}
