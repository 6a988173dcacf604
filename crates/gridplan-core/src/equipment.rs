//! Equipment catalogue of standard cables, overhead lines and transformers.
//!
//! The same line type name can appear several times in one table with
//! different nominal voltages (e.g. an MV cable rated for 10 kV and 20 kV);
//! lookups therefore take the nominal voltage of the grid into account.

use crate::components::{LineKind, VoltageLevel};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// System frequency used to derive reactances and susceptances.
pub const FREQUENCY_HZ: f64 = 50.0;

/// Electrical data of one cable or overhead line type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineType {
    pub name: String,
    /// Nominal voltage in kV
    #[serde(rename = "U_n")]
    pub u_n: f64,
    /// Thermal current limit in kA
    #[serde(rename = "I_max_th")]
    pub i_max_th: f64,
    /// Resistance in Ohm/km
    #[serde(rename = "R_per_km")]
    pub r_per_km: f64,
    /// Inductance in mH/km
    #[serde(rename = "L_per_km")]
    pub l_per_km: f64,
    /// Capacitance in µF/km
    #[serde(rename = "C_per_km", default)]
    pub c_per_km: f64,
}

/// Series and shunt parameters of a line of a given length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineParameters {
    pub r: f64,
    pub x: f64,
    pub b: f64,
    pub s_nom: f64,
}

impl LineType {
    /// Thermal rating of a single line in MVA.
    pub fn s_nom(&self) -> f64 {
        3f64.sqrt() * self.u_n * self.i_max_th
    }

    /// Total parameters of `num_parallel` lines of length `length` km.
    pub fn parameters(&self, length: f64, num_parallel: u32) -> LineParameters {
        let n = num_parallel.max(1) as f64;
        LineParameters {
            r: self.r_per_km * length / n,
            x: self.l_per_km * 2.0 * PI * FREQUENCY_HZ / 1e3 * length / n,
            b: self.c_per_km * 2.0 * PI * FREQUENCY_HZ * 1e-6 * length * n,
            s_nom: self.s_nom() * n,
        }
    }
}

/// Electrical data of one transformer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerType {
    pub name: String,
    /// Rating in MVA
    #[serde(rename = "S_nom")]
    pub s_nom: f64,
    /// Upper side nominal voltage in kV
    #[serde(rename = "U_n_upper", default)]
    pub u_n_upper: f64,
    /// Lower side nominal voltage in kV
    #[serde(rename = "U_n_lower", default)]
    pub u_n_lower: f64,
    pub r_pu: f64,
    pub x_pu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentData {
    pub mv_cables: Vec<LineType>,
    pub mv_overhead_lines: Vec<LineType>,
    pub lv_cables: Vec<LineType>,
    /// HV/MV transformers
    pub mv_transformers: Vec<TransformerType>,
    /// MV/LV transformers
    pub lv_transformers: Vec<TransformerType>,
}

fn line(name: &str, u_n: f64, i_max_th: f64, r: f64, l: f64, c: f64) -> LineType {
    LineType {
        name: name.to_string(),
        u_n,
        i_max_th,
        r_per_km: r,
        l_per_km: l,
        c_per_km: c,
    }
}

fn transformer(name: &str, s_nom: f64, upper: f64, lower: f64, r_pu: f64, x_pu: f64) -> TransformerType {
    TransformerType {
        name: name.to_string(),
        s_nom,
        u_n_upper: upper,
        u_n_lower: lower,
        r_pu,
        x_pu,
    }
}

impl Default for EquipmentData {
    fn default() -> Self {
        let mut mv_cables = Vec::new();
        for (u_n, l95, l150, l185, l240, c95, c150, c185, c240) in [
            (10.0, 0.4, 0.37, 0.36, 0.35, 0.28, 0.36, 0.41, 0.47),
            (20.0, 0.43, 0.4, 0.38, 0.36, 0.22, 0.26, 0.27, 0.3),
        ] {
            mv_cables.push(line("NA2XS2Y 3x1x95 RM/25", u_n, 0.26, 0.313, l95, c95));
            mv_cables.push(line("NA2XS2Y 3x1x150 RM/25", u_n, 0.32, 0.206, l150, c150));
            mv_cables.push(line("NA2XS2Y 3x1x185 RM/25", u_n, 0.357, 0.164, l185, c185));
            mv_cables.push(line("NA2XS2Y 3x1x240", u_n, 0.417, 0.125, l240, c240));
        }

        let mut mv_overhead_lines = Vec::new();
        for u_n in [10.0, 20.0] {
            mv_overhead_lines.push(line("48-AL1/8-ST1A", u_n, 0.21, 0.5939, 1.27, 0.009));
            mv_overhead_lines.push(line("94-AL1/15-ST1A", u_n, 0.35, 0.306, 1.2, 0.0097));
            mv_overhead_lines.push(line("122-AL1/20-ST1A", u_n, 0.41, 0.2376, 1.18, 0.0098));
        }

        let lv_cables = vec![
            line("NAYY 4x1x35", 0.4, 0.123, 0.867, 0.25, 0.0),
            line("NAYY 4x1x50", 0.4, 0.142, 0.642, 0.26, 0.0),
            line("NAYY 4x1x95", 0.4, 0.224, 0.321, 0.256, 0.0),
            line("NAYY 4x1x120", 0.4, 0.25, 0.255, 0.256, 0.0),
            line("NAYY 4x1x150", 0.4, 0.275, 0.206, 0.256, 0.0),
            line("NAYY 4x1x185", 0.4, 0.313, 0.164, 0.256, 0.0),
            line("NAYY 4x1x240", 0.4, 0.364, 0.125, 0.256, 0.0),
            line("NAYY 4x1x300", 0.4, 0.419, 0.1, 0.279, 0.0),
        ];

        let mv_transformers = vec![
            transformer("20 MVA", 20.0, 110.0, 20.0, 0.00375, 0.11994),
            transformer("32 MVA", 32.0, 110.0, 20.0, 0.00369, 0.11994),
            transformer("40 MVA", 40.0, 110.0, 20.0, 0.00363, 0.11994),
            transformer("63 MVA", 63.0, 110.0, 20.0, 0.00357, 0.11994),
        ];

        let lv_transformers = vec![
            transformer("100 kVA", 0.1, 20.0, 0.4, 0.0175, 0.03594),
            transformer("160 kVA", 0.16, 20.0, 0.4, 0.0146, 0.03732),
            transformer("250 kVA", 0.25, 20.0, 0.4, 0.0128, 0.03792),
            transformer("400 kVA", 0.4, 20.0, 0.4, 0.0115, 0.03831),
            transformer("630 kVA", 0.63, 20.0, 0.4, 0.0103, 0.03865),
            transformer("800 kVA", 0.8, 20.0, 0.4, 0.0131, 0.05853),
            transformer("1000 kVA", 1.0, 20.0, 0.4, 0.0105, 0.05906),
        ];

        Self {
            mv_cables,
            mv_overhead_lines,
            lv_cables,
            mv_transformers,
            lv_transformers,
        }
    }
}

impl EquipmentData {
    /// Look up a line type of the given voltage level.
    ///
    /// For MV, cables are searched before overhead lines. Among entries with
    /// the right name the one whose `U_n` is closest to `v_nom` wins.
    pub fn line_type(&self, name: &str, level: VoltageLevel, v_nom: f64) -> Option<(&LineType, LineKind)> {
        let tables: Vec<(&[LineType], LineKind)> = match level {
            VoltageLevel::Mv => vec![
                (&self.mv_cables, LineKind::Cable),
                (&self.mv_overhead_lines, LineKind::Line),
            ],
            VoltageLevel::Lv => vec![(&self.lv_cables, LineKind::Cable)],
        };

        for (table, kind) in tables {
            let best = table
                .iter()
                .filter(|t| t.name == name)
                .min_by(|a, b| {
                    (a.u_n - v_nom)
                        .abs()
                        .total_cmp(&(b.u_n - v_nom).abs())
                });
            if let Some(found) = best {
                return Some((found, kind));
            }
        }
        None
    }

    /// Cables of a voltage level rated for `v_nom`, sorted by ampacity.
    pub fn cables_for(&self, level: VoltageLevel, v_nom: f64) -> Vec<&LineType> {
        let mut cables: Vec<&LineType> = match level {
            VoltageLevel::Mv => self
                .mv_cables
                .iter()
                .filter(|c| (c.u_n - v_nom).abs() < 1e-6)
                .collect(),
            VoltageLevel::Lv => self.lv_cables.iter().collect(),
        };
        cables.sort_by(|a, b| a.i_max_th.total_cmp(&b.i_max_th));
        cables
    }

    pub fn mv_transformer(&self, name: &str) -> Option<&TransformerType> {
        self.mv_transformers.iter().find(|t| t.name == name)
    }

    pub fn lv_transformer(&self, name: &str) -> Option<&TransformerType> {
        self.lv_transformers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mv_cable_parameters() {
        let data = EquipmentData::default();
        let (cable, kind) = data
            .line_type("NA2XS2Y 3x1x185 RM/25", VoltageLevel::Mv, 20.0)
            .unwrap();
        assert_eq!(kind, LineKind::Cable);
        assert_eq!(cable.u_n, 20.0);

        let params = cable.parameters(2.0, 1);
        assert!((params.r - 0.328).abs() < 1e-9);
        assert!((params.x - 0.38 * 2.0 * PI * 50.0 / 1e3 * 2.0).abs() < 1e-9);
        assert!((params.s_nom - 3f64.sqrt() * 20.0 * 0.357).abs() < 1e-9);
    }

    #[test]
    fn parallel_lines_fold_into_parameters() {
        let data = EquipmentData::default();
        let (cable, _) = data.line_type("NAYY 4x1x300", VoltageLevel::Lv, 0.4).unwrap();
        let single = cable.parameters(0.1, 1);
        let double = cable.parameters(0.1, 2);
        assert!((double.r - single.r / 2.0).abs() < 1e-12);
        assert!((double.s_nom - single.s_nom * 2.0).abs() < 1e-12);
    }

    #[test]
    fn overhead_line_lookup() {
        let data = EquipmentData::default();
        let (_, kind) = data.line_type("94-AL1/15-ST1A", VoltageLevel::Mv, 20.0).unwrap();
        assert_eq!(kind, LineKind::Line);
        assert!(data.line_type("94-AL1/15-ST1A", VoltageLevel::Lv, 0.4).is_none());
    }

    #[test]
    fn cables_sorted_by_ampacity() {
        let data = EquipmentData::default();
        let cables = data.cables_for(VoltageLevel::Mv, 10.0);
        assert_eq!(cables.len(), 4);
        assert!(cables.windows(2).all(|w| w[0].i_max_th <= w[1].i_max_th));
    }
}
