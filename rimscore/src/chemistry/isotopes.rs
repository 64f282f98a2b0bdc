use std::collections::HashMap;

/// Stable (and long-lived primordial) isotopes per element: `(mass number,
/// relative abundance in percent)`, ordered by mass number.
///
/// Covers the elements commonly measured by resonance ionization; extend
/// the table when a new element is brought to the instrument.
pub fn isotopic_abundance() -> HashMap<&'static str, Vec<(u32, f64)>> {
    let mut map = HashMap::new();
    map.insert("H", vec![(1, 99.9885), (2, 0.0115)]);
    map.insert("He", vec![(3, 0.000134), (4, 99.999866)]);
    map.insert("Li", vec![(6, 7.59), (7, 92.41)]);
    map.insert("Be", vec![(9, 100.0)]);
    map.insert("B", vec![(10, 19.9), (11, 80.1)]);
    map.insert("C", vec![(12, 98.93), (13, 1.07)]);
    map.insert("N", vec![(14, 99.636), (15, 0.364)]);
    map.insert("O", vec![(16, 99.757), (17, 0.038), (18, 0.205)]);
    map.insert("F", vec![(19, 100.0)]);
    map.insert("Na", vec![(23, 100.0)]);
    map.insert("Mg", vec![(24, 78.99), (25, 10.00), (26, 11.01)]);
    map.insert("Al", vec![(27, 100.0)]);
    map.insert("Si", vec![(28, 92.223), (29, 4.685), (30, 3.092)]);
    map.insert("P", vec![(31, 100.0)]);
    map.insert("S", vec![(32, 94.99), (33, 0.75), (34, 4.25), (36, 0.01)]);
    map.insert("Cl", vec![(35, 75.76), (37, 24.24)]);
    map.insert("K", vec![(39, 93.2581), (40, 0.0117), (41, 6.7302)]);
    map.insert(
        "Ca",
        vec![
            (40, 96.941),
            (42, 0.647),
            (43, 0.135),
            (44, 2.086),
            (46, 0.004),
            (48, 0.187),
        ],
    );
    map.insert("Sc", vec![(45, 100.0)]);
    map.insert(
        "Ti",
        vec![(46, 8.25), (47, 7.44), (48, 73.72), (49, 5.41), (50, 5.18)],
    );
    map.insert("V", vec![(50, 0.250), (51, 99.750)]);
    map.insert("Cr", vec![(50, 4.345), (52, 83.789), (53, 9.501), (54, 2.365)]);
    map.insert("Mn", vec![(55, 100.0)]);
    map.insert("Fe", vec![(54, 5.845), (56, 91.754), (57, 2.119), (58, 0.282)]);
    map.insert("Co", vec![(59, 100.0)]);
    map.insert(
        "Ni",
        vec![(58, 68.077), (60, 26.223), (61, 1.140), (62, 3.635), (64, 0.926)],
    );
    map.insert("Cu", vec![(63, 69.15), (65, 30.85)]);
    map.insert(
        "Zn",
        vec![(64, 48.63), (66, 27.90), (67, 4.10), (68, 18.75), (70, 0.62)],
    );
    map.insert("Ga", vec![(69, 60.108), (71, 39.892)]);
    map.insert("Rb", vec![(85, 72.17), (87, 27.83)]);
    map.insert("Sr", vec![(84, 0.56), (86, 9.86), (87, 7.00), (88, 82.58)]);
    map.insert("Y", vec![(89, 100.0)]);
    map.insert(
        "Zr",
        vec![(90, 51.45), (91, 11.22), (92, 17.15), (94, 17.38), (96, 2.80)],
    );
    map.insert("Nb", vec![(93, 100.0)]);
    map.insert(
        "Mo",
        vec![
            (92, 14.53),
            (94, 9.15),
            (95, 15.84),
            (96, 16.67),
            (97, 9.60),
            (98, 24.39),
            (100, 9.82),
        ],
    );
    map.insert(
        "Ru",
        vec![
            (96, 5.54),
            (98, 1.87),
            (99, 12.76),
            (100, 12.60),
            (101, 17.06),
            (102, 31.55),
            (104, 18.62),
        ],
    );
    map.insert(
        "Pd",
        vec![
            (102, 1.02),
            (104, 11.14),
            (105, 22.33),
            (106, 27.33),
            (108, 26.46),
            (110, 11.72),
        ],
    );
    map.insert("Ag", vec![(107, 51.839), (109, 48.161)]);
    map.insert(
        "Cd",
        vec![
            (106, 1.25),
            (108, 0.89),
            (110, 12.49),
            (111, 12.80),
            (112, 24.13),
            (113, 12.22),
            (114, 28.73),
            (116, 7.49),
        ],
    );
    map.insert(
        "Sn",
        vec![
            (112, 0.97),
            (114, 0.66),
            (115, 0.34),
            (116, 14.54),
            (117, 7.68),
            (118, 24.22),
            (119, 8.59),
            (120, 32.58),
            (122, 4.63),
            (124, 5.79),
        ],
    );
    map.insert(
        "Ba",
        vec![
            (130, 0.106),
            (132, 0.101),
            (134, 2.417),
            (135, 6.592),
            (136, 7.854),
            (137, 11.232),
            (138, 71.698),
        ],
    );
    map.insert(
        "Nd",
        vec![
            (142, 27.2),
            (143, 12.2),
            (144, 23.8),
            (145, 8.3),
            (146, 17.2),
            (148, 5.7),
            (150, 5.6),
        ],
    );
    map.insert(
        "Sm",
        vec![
            (144, 3.07),
            (147, 14.99),
            (148, 11.24),
            (149, 13.82),
            (150, 7.38),
            (152, 26.75),
            (154, 22.75),
        ],
    );
    map.insert(
        "Gd",
        vec![
            (152, 0.20),
            (154, 2.18),
            (155, 14.80),
            (156, 20.47),
            (157, 15.65),
            (158, 24.84),
            (160, 21.86),
        ],
    );
    map.insert(
        "W",
        vec![(180, 0.12), (182, 26.50), (183, 14.31), (184, 30.64), (186, 28.43)],
    );
    map.insert(
        "Os",
        vec![
            (184, 0.02),
            (186, 1.59),
            (187, 1.96),
            (188, 13.24),
            (189, 16.15),
            (190, 26.26),
            (192, 40.78),
        ],
    );
    map.insert(
        "Pt",
        vec![
            (190, 0.014),
            (192, 0.782),
            (194, 32.967),
            (195, 33.832),
            (196, 25.242),
            (198, 7.163),
        ],
    );
    map.insert("Pb", vec![(204, 1.4), (206, 24.1), (207, 22.1), (208, 52.4)]);
    map.insert("Th", vec![(232, 100.0)]);
    map.insert("U", vec![(234, 0.0054), (235, 0.7204), (238, 99.2742)]);
    map
}

/// The isotopes of one element, or `None` for an unknown symbol.
pub fn isotopes_of(element: &str) -> Option<Vec<(u32, f64)>> {
    isotopic_abundance().get(element).cloned()
}

/// The mass number of the most abundant isotope of an element.
pub fn most_abundant_isotope(element: &str) -> Option<u32> {
    isotopes_of(element)?
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(mass_number, _)| mass_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_abundant_isotopes() {
        assert_eq!(most_abundant_isotope("Ti"), Some(48));
        assert_eq!(most_abundant_isotope("Fe"), Some(56));
        assert_eq!(most_abundant_isotope("Sr"), Some(88));
        assert_eq!(most_abundant_isotope("Mo"), Some(98));
    }

    #[test]
    fn test_unknown_element() {
        assert_eq!(most_abundant_isotope("Xx"), None);
    }

    #[test]
    fn test_abundances_sum_to_one_hundred() {
        for (element, isotopes) in isotopic_abundance() {
            let total: f64 = isotopes.iter().map(|(_, a)| a).sum();
            assert!(
                (total - 100.0).abs() < 0.05,
                "abundances of {element} sum to {total}"
            );
        }
    }
}
