//! JSON export of analysis and reinforcement results.
//!
//! The full result tables are written as CSV by [`Results::to_csv`]; the
//! JSON summary is meant for scripts and the command line.

use anyhow::{Context, Result};
use gridplan_algo::{ChangeKind, Results};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub trait ResultsExport {
    /// Summary as a JSON value (for stdout)
    fn to_json_value(&self) -> Result<serde_json::Value>;

    /// Summary as pretty printed JSON file
    fn to_json(&self, path: &Path) -> Result<()> {
        let value = self.to_json_value()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("writing {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusVoltage {
    pub bus: String,
    pub timestep: String,
    pub v_pu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub mode: Option<String>,
    pub timesteps: usize,
    pub not_converged: usize,
    pub min_voltage: Option<BusVoltage>,
    pub max_voltage: Option<BusVoltage>,
    /// Energy lost in the grid over all time steps in MWh, hourly steps assumed
    pub grid_losses: f64,
    pub lines_and_transformers_added: u32,
    pub lines_and_transformers_changed: u32,
    pub transformers_removed: u32,
    /// kEUR
    pub total_costs: f64,
    pub unresolved_issues: usize,
    pub measures: Vec<String>,
}

fn extreme_voltage(results: &Results, highest: bool) -> Option<BusVoltage> {
    let frame = &results.v_res;
    let mut best: Option<BusVoltage> = None;
    for (bus, values) in &frame.columns {
        for (row, v) in values.iter().enumerate() {
            let better = match &best {
                None => true,
                Some(b) if highest => *v > b.v_pu,
                Some(b) => *v < b.v_pu,
            };
            if better {
                best = Some(BusVoltage {
                    bus: bus.clone(),
                    timestep: frame.index[row].to_string(),
                    v_pu: *v,
                });
            }
        }
    }
    best
}

impl ResultsSummary {
    pub fn from_results(results: &Results) -> Self {
        let count = |kind: ChangeKind| -> u32 {
            results
                .equipment_changes
                .iter()
                .filter(|c| c.change == kind)
                .map(|c| c.quantity)
                .sum()
        };
        Self {
            mode: results.mode.map(|m| m.to_string()),
            timesteps: results.timesteps().len(),
            not_converged: results.not_converged.len(),
            min_voltage: extreme_voltage(results, false),
            max_voltage: extreme_voltage(results, true),
            grid_losses: results.grid_losses.column("p").map_or(0.0, |p| p.iter().sum()),
            lines_and_transformers_added: count(ChangeKind::Added),
            lines_and_transformers_changed: count(ChangeKind::Changed),
            transformers_removed: count(ChangeKind::Removed),
            total_costs: results.total_costs(),
            unresolved_issues: results.unresolved_issues.len(),
            measures: results.measures.clone(),
        }
    }
}

impl ResultsExport for Results {
    fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(ResultsSummary::from_results(self))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_algo::{EquipmentChange, ExpansionCost};
    use tempfile::tempdir;

    fn results() -> Results {
        let start = chrono::NaiveDate::from_ymd_opt(2011, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let index = vec![start, start + chrono::Duration::hours(1)];
        let mut results = Results::new();
        results.v_res.index = index.clone();
        results.v_res.insert("Bus_A", vec![1.0, 0.97]).unwrap();
        results.v_res.insert("Bus_B", vec![1.04, 0.99]).unwrap();
        results.grid_losses.index = index;
        results.grid_losses.insert("p", vec![0.01, 0.02]).unwrap();
        results.equipment_changes.push(EquipmentChange {
            name: "Line_1".into(),
            iteration_step: 1,
            change: ChangeKind::Added,
            equipment: "NAYY 4x1x150".into(),
            quantity: 2,
        });
        results.grid_expansion_costs.push(ExpansionCost {
            name: "Line_1".into(),
            kind: "NAYY 4x1x150".into(),
            total_costs: 12.5,
            quantity: 2,
            length: 0.1,
            voltage_level: "lv".into(),
        });
        results
    }

    #[test]
    fn summary_of_results() {
        let summary = ResultsSummary::from_results(&results());
        assert_eq!(summary.timesteps, 2);
        let min = summary.min_voltage.unwrap();
        assert_eq!((min.bus.as_str(), min.v_pu), ("Bus_A", 0.97));
        assert_eq!(min.timestep, "2011-01-01 01:00:00");
        assert_eq!(summary.max_voltage.unwrap().bus, "Bus_B");
        assert!((summary.grid_losses - 0.03).abs() < 1e-12);
        assert_eq!(summary.lines_and_transformers_added, 2);
        assert_eq!(summary.total_costs, 12.5);
    }

    #[test]
    fn json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/summary.json");
        results().to_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["unresolved_issues"], 0);
        assert_eq!(value["measures"], serde_json::json!([]));
    }

    #[test]
    fn empty_results() {
        let summary = ResultsSummary::from_results(&Results::new());
        assert!(summary.min_voltage.is_none());
        assert_eq!(summary.grid_losses, 0.0);
    }
}
