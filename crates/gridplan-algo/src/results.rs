//! Power flow and grid expansion results.
//!
//! Power flow results are time series frames indexed by the analyzed time
//! steps. Grid expansion results are plain tables.
//!
//! On disk:
//!
//! ```text
//! <dir>/powerflow_results/voltages_pu.csv
//!                         currents.csv
//!                         active_powers.csv
//!                         reactive_powers.csv
//!                         apparent_powers.csv
//!                         grid_losses.csv
//!                         slack_results.csv
//! <dir>/grid_expansion_results/equipment_changes.csv
//!                              grid_expansion_costs.csv
//!                              unresolved_issues.csv
//! <dir>/metadata.json
//! ```

use crate::network::AnalyzeMode;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use gridplan_ts::{TimeIndex, TimeSeriesFrame};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One change to a line or transformer made during reinforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentChange {
    /// Name of the line or transformer
    pub name: String,
    pub iteration_step: u32,
    pub change: ChangeKind,
    /// Equipment type after the change
    pub equipment: String,
    /// Number of added or removed units
    pub quantity: u32,
}

/// Cost of the reinforcement of one line or transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionCost {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// kEUR
    pub total_costs: f64,
    pub quantity: u32,
    /// km, zero for transformers
    pub length: f64,
    /// `mv`, `lv` or `mv/lv`
    pub voltage_level: String,
}

/// Issue still present after reinforcement with `skip_unresolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedIssue {
    pub name: String,
    pub issue: String,
    /// Relative overload or voltage deviation in p.u.
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Metadata {
    mode: Option<AnalyzeMode>,
    measures: Vec<String>,
    not_converged: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct Results {
    /// Voltage magnitude per bus in p.u.
    pub v_res: TimeSeriesFrame,
    /// Current per line and transformer in kA
    pub i_res: TimeSeriesFrame,
    /// Active power entering each line and transformer at bus0 in MW
    pub pfa_p: TimeSeriesFrame,
    /// Reactive power entering each line and transformer at bus0 in Mvar
    pub pfa_q: TimeSeriesFrame,
    /// Larger apparent power of both terminals in MVA
    pub s_res: TimeSeriesFrame,
    /// Columns `p` and `q`
    pub grid_losses: TimeSeriesFrame,
    /// Columns `p` and `q`, power supplied by the slack
    pub pfa_slack: TimeSeriesFrame,
    pub equipment_changes: Vec<EquipmentChange>,
    pub grid_expansion_costs: Vec<ExpansionCost>,
    pub unresolved_issues: Vec<UnresolvedIssue>,
    /// Reinforcement measures applied, in order
    pub measures: Vec<String>,
    /// Mode of the last analysis
    pub mode: Option<AnalyzeMode>,
    pub not_converged: Vec<NaiveDateTime>,
}

const POWERFLOW_DIR: &str = "powerflow_results";
const EXPANSION_DIR: &str = "grid_expansion_results";

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time steps of the last power flow.
    pub fn timesteps(&self) -> &TimeIndex {
        &self.v_res.index
    }

    pub fn has_power_flow(&self) -> bool {
        !self.v_res.is_empty()
    }

    /// Empty power flow frames for `index`.
    pub(crate) fn reset_power_flow(&mut self, index: TimeIndex, mode: AnalyzeMode) {
        for frame in self.power_flow_frames_mut() {
            *frame = TimeSeriesFrame::new(index.clone());
        }
        self.mode = Some(mode);
        self.not_converged.clear();
    }

    fn power_flow_frames(&self) -> [(&'static str, &TimeSeriesFrame); 7] {
        [
            ("voltages_pu", &self.v_res),
            ("currents", &self.i_res),
            ("active_powers", &self.pfa_p),
            ("reactive_powers", &self.pfa_q),
            ("apparent_powers", &self.s_res),
            ("grid_losses", &self.grid_losses),
            ("slack_results", &self.pfa_slack),
        ]
    }

    fn power_flow_frames_mut(&mut self) -> [&mut TimeSeriesFrame; 7] {
        [
            &mut self.v_res,
            &mut self.i_res,
            &mut self.pfa_p,
            &mut self.pfa_q,
            &mut self.s_res,
            &mut self.grid_losses,
            &mut self.pfa_slack,
        ]
    }

    /// Total expansion costs in kEUR.
    pub fn total_costs(&self) -> f64 {
        self.grid_expansion_costs.iter().map(|c| c.total_costs).sum()
    }

    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        let pf_dir = dir.join(POWERFLOW_DIR);
        fs::create_dir_all(&pf_dir).with_context(|| format!("creating {}", pf_dir.display()))?;
        for (name, frame) in self.power_flow_frames() {
            if !frame.is_empty() {
                frame.to_csv(&pf_dir.join(format!("{}.csv", name)))?;
            }
        }

        let exp_dir = dir.join(EXPANSION_DIR);
        fs::create_dir_all(&exp_dir).with_context(|| format!("creating {}", exp_dir.display()))?;
        write_records(&exp_dir.join("equipment_changes.csv"), &self.equipment_changes)?;
        write_records(&exp_dir.join("grid_expansion_costs.csv"), &self.grid_expansion_costs)?;
        write_records(&exp_dir.join("unresolved_issues.csv"), &self.unresolved_issues)?;

        let metadata = Metadata {
            mode: self.mode,
            measures: self.measures.clone(),
            not_converged: self.not_converged.clone(),
        };
        let path = dir.join("metadata.json");
        fs::write(&path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        let mut results = Self::new();
        let pf_dir = dir.join(POWERFLOW_DIR);
        let names: Vec<&str> = results.power_flow_frames().iter().map(|(n, _)| *n).collect();
        for (name, frame) in names.into_iter().zip(results.power_flow_frames_mut()) {
            let path = pf_dir.join(format!("{}.csv", name));
            if path.exists() {
                *frame = TimeSeriesFrame::from_csv(&path)?;
            }
        }

        let exp_dir = dir.join(EXPANSION_DIR);
        results.equipment_changes = read_records(&exp_dir.join("equipment_changes.csv"))?;
        results.grid_expansion_costs = read_records(&exp_dir.join("grid_expansion_costs.csv"))?;
        results.unresolved_issues = read_records(&exp_dir.join("unresolved_issues.csv"))?;

        let path = dir.join("metadata.json");
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let metadata: Metadata = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            results.mode = metadata.mode;
            results.measures = metadata.measures;
            results.not_converged = metadata.not_converged;
        }
        Ok(results)
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}
