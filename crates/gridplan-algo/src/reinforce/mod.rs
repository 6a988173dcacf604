//! Automatic grid reinforcement.
//!
//! [`reinforce`] alternates power flow analysis and reinforcement measures
//! until no overloading and no voltage issues are left:
//!
//! 1. overloaded stations and lines
//! 2. voltage issues in the MV grid
//! 3. voltage issues at the secondary side of MV/LV stations
//! 4. voltage issues in the LV grids
//!
//! Overloading is checked again after the voltage measures and the whole
//! sequence is repeated while new overloading shows up.

pub mod measures;

use crate::analyze::{analyze, AnalyzeOptions, Troubleshooting};
use crate::checks::{self, VoltageIssue, Violations};
use crate::costs::grid_expansion_costs;
use crate::network::AnalyzeMode;
use crate::power_flow::PowerFlowSolver;
use crate::results::{EquipmentChange, Results, UnresolvedIssue};
use chrono::NaiveDateTime;
use gridplan_core::{Config, GridError, GridResult, Topology};
use gridplan_ts::TimeSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Time steps the grid is reinforced for.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TimestepSelection {
    #[default]
    All,
    Explicit(Vec<NaiveDateTime>),
    /// Time steps with the largest and the smallest residual load
    Snapshot,
    /// Time steps with the worst overloading or voltage deviation of any
    /// component in an initial analysis of all time steps
    Reduced,
}

/// Part of the grid to reinforce. Everything when not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinforceMode {
    /// MV grid and HV/MV station, LV grids aggregated at their station
    Mv,
    /// MV grid and MV/LV stations
    MvLv,
    /// MV/LV stations and LV grids
    Lv,
}

impl fmt::Display for ReinforceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReinforceMode::Mv => "mv",
            ReinforceMode::MvLv => "mvlv",
            ReinforceMode::Lv => "lv",
        };
        f.write_str(s)
    }
}

impl FromStr for ReinforceMode {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mv" => Ok(ReinforceMode::Mv),
            "mvlv" => Ok(ReinforceMode::MvLv),
            "lv" => Ok(ReinforceMode::Lv),
            other => Err(GridError::Validation(format!(
                "Unknown reinforcement mode {}. Use one of mv, mvlv, lv.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReinforceOptions {
    pub timesteps: TimestepSelection,
    /// Iterations allowed per issue type
    pub max_while_iterations: usize,
    /// Check MV and LV voltages against one combined band
    pub combined_analysis: bool,
    pub mode: Option<ReinforceMode>,
    /// Record issues left after `max_while_iterations` instead of failing
    pub skip_unresolved: bool,
    /// Reinforce a copy and leave the topology untouched
    pub copy_grid: bool,
    pub solver: PowerFlowSolver,
    pub troubleshooting: Troubleshooting,
}

impl Default for ReinforceOptions {
    fn default() -> Self {
        Self {
            timesteps: TimestepSelection::All,
            max_while_iterations: 20,
            combined_analysis: false,
            mode: None,
            skip_unresolved: false,
            copy_grid: false,
            solver: PowerFlowSolver::new(),
            troubleshooting: Troubleshooting::Off,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Overloading,
    MvVoltage,
    StationVoltage,
    LvVoltage,
}

impl Stage {
    fn label(&self) -> &'static str {
        match self {
            Stage::Overloading => "Overloading issues",
            Stage::MvVoltage => "Voltage issues in the MV grid",
            Stage::StationVoltage => "Voltage issues at MV/LV stations",
            Stage::LvVoltage => "Voltage issues in LV grids",
        }
    }
}

/// Which checks apply in a reinforcement mode.
#[derive(Debug, Clone, Copy)]
struct Scope {
    hv_mv_station: bool,
    mv: bool,
    mv_lv_stations: bool,
    lv: bool,
}

impl Scope {
    fn of(mode: Option<ReinforceMode>) -> Self {
        match mode {
            Some(ReinforceMode::Mv) => Scope {
                hv_mv_station: true,
                mv: true,
                mv_lv_stations: false,
                lv: false,
            },
            Some(ReinforceMode::MvLv) => Scope {
                hv_mv_station: true,
                mv: true,
                mv_lv_stations: true,
                lv: false,
            },
            Some(ReinforceMode::Lv) => Scope {
                hv_mv_station: false,
                mv: false,
                mv_lv_stations: true,
                lv: true,
            },
            None => Scope {
                hv_mv_station: true,
                mv: true,
                mv_lv_stations: true,
                lv: true,
            },
        }
    }

    fn analyze_mode(mode: Option<ReinforceMode>) -> AnalyzeMode {
        match mode {
            Some(ReinforceMode::Mv) => AnalyzeMode::Mv,
            Some(ReinforceMode::MvLv) => AnalyzeMode::MvLv,
            Some(ReinforceMode::Lv) | None => AnalyzeMode::Full,
        }
    }
}

struct Reinforcement<'a> {
    topology: Topology,
    timeseries: &'a TimeSeries,
    config: &'a Config,
    options: &'a ReinforceOptions,
    analyze_options: AnalyzeOptions,
    scope: Scope,
    iteration_step: u32,
    changes: Vec<EquipmentChange>,
    measures: Vec<String>,
    unresolved: Vec<UnresolvedIssue>,
}

impl<'a> Reinforcement<'a> {
    fn run_power_flow(&self) -> GridResult<Results> {
        analyze(&self.topology, self.timeseries, self.config, &self.analyze_options)
    }

    fn find(&self, stage: Stage, results: &Results) -> Violations {
        let (topo, ts, config) = (&self.topology, self.timeseries, self.config);
        let combined = self.options.combined_analysis;
        let scope = self.scope;
        let mut found = Violations::default();
        match stage {
            Stage::Overloading => {
                if scope.hv_mv_station {
                    found.hv_mv_station = checks::hv_mv_station_overload(topo, ts, results, config);
                }
                if scope.mv_lv_stations {
                    found.mv_lv_stations = checks::mv_lv_station_overload(topo, ts, results, config);
                }
                if scope.mv {
                    found.mv_lines = checks::mv_line_overload(topo, ts, results, config);
                }
                if scope.lv {
                    found.lv_lines = checks::lv_line_overload(topo, ts, results, config);
                }
            }
            Stage::MvVoltage if scope.mv => {
                found.mv_voltage = checks::mv_voltage_deviation(topo, results, config, combined);
            }
            Stage::StationVoltage if scope.mv_lv_stations && !combined => {
                found.mv_lv_station_voltage =
                    checks::mv_lv_station_voltage_deviation(topo, results, config);
            }
            Stage::LvVoltage if scope.lv => {
                found.lv_voltage = checks::lv_voltage_deviation(topo, results, config, combined);
            }
            _ => {}
        }
        found
    }

    fn note_measure(&mut self, name: &str) {
        if !self.measures.iter().any(|m| m == name) {
            self.measures.push(name.to_string());
        }
    }

    fn apply(&mut self, stage: Stage, found: &Violations) -> GridResult<Vec<EquipmentChange>> {
        let config = self.config;
        let mut changes = Vec::new();
        match stage {
            Stage::Overloading => {
                if !found.hv_mv_station.is_empty() {
                    self.note_measure("reinforce_hv_mv_station_overloading");
                    changes.extend(measures::reinforce_hv_mv_station_overloading(
                        &mut self.topology,
                        config,
                        &found.hv_mv_station,
                    )?);
                }
                if !found.mv_lv_stations.is_empty() {
                    self.note_measure("reinforce_mv_lv_station_overloading");
                    changes.extend(measures::reinforce_mv_lv_station_overloading(
                        &mut self.topology,
                        config,
                        &found.mv_lv_stations,
                    )?);
                }
                let lines: Vec<_> = found.mv_lines.iter().chain(&found.lv_lines).cloned().collect();
                if !lines.is_empty() {
                    self.note_measure("reinforce_lines_overloading");
                    changes.extend(measures::reinforce_lines_overloading(
                        &mut self.topology,
                        config,
                        &lines,
                    )?);
                }
            }
            Stage::MvVoltage => {
                self.note_measure("reinforce_lines_voltage_issues");
                changes.extend(measures::reinforce_lines_voltage_issues(
                    &mut self.topology,
                    config,
                    None,
                    &found.mv_voltage,
                )?);
            }
            Stage::StationVoltage => {
                self.note_measure("reinforce_mv_lv_station_voltage_issues");
                changes.extend(measures::reinforce_mv_lv_station_voltage_issues(
                    &mut self.topology,
                    config,
                    &found.mv_lv_station_voltage,
                )?);
            }
            Stage::LvVoltage => {
                self.note_measure("reinforce_lines_voltage_issues");
                let mut per_grid: BTreeMap<u32, Vec<VoltageIssue>> = BTreeMap::new();
                for issue in &found.lv_voltage {
                    if let Some(id) = issue.lv_grid_id {
                        per_grid.entry(id).or_default().push(issue.clone());
                    }
                }
                for (id, issues) in per_grid {
                    changes.extend(measures::reinforce_lines_voltage_issues(
                        &mut self.topology,
                        config,
                        Some(id),
                        &issues,
                    )?);
                }
            }
        }
        Ok(changes)
    }

    /// Apply the measures of `stage` until its issues are gone.
    ///
    /// Returns false if issues are left and `skip_unresolved` is set.
    fn resolve(&mut self, stage: Stage, results: &mut Results) -> GridResult<bool> {
        let mut found = self.find(stage, results);
        let mut iteration = 0;
        while !found.is_empty() && iteration < self.options.max_while_iterations {
            iteration += 1;
            self.iteration_step += 1;
            let mut changes = self.apply(stage, &found)?;
            info!(
                stage = stage.label(),
                iteration = self.iteration_step,
                issues = found.overload_count() + found.voltage_issue_count(),
                changes = changes.len(),
                "applied reinforcement measures"
            );
            for change in &mut changes {
                change.iteration_step = self.iteration_step;
            }
            self.changes.extend(changes);
            *results = self.run_power_flow()?;
            found = self.find(stage, results);
        }
        if found.is_empty() {
            debug!(stage = stage.label(), "resolved");
            return Ok(true);
        }
        if !self.options.skip_unresolved {
            return Err(GridError::Reinforcement(format!(
                "{} could not be solved after maximum allowed iterations.",
                stage.label()
            )));
        }
        warn!(
            "{} could not be solved after maximum allowed iterations and are skipped.",
            stage.label()
        );
        self.unresolved.extend(unresolved_issues(&found));
        Ok(false)
    }

    fn run(&mut self) -> GridResult<Results> {
        let mut results = self.run_power_flow()?;
        let mut round = 0;
        loop {
            round += 1;
            let mut resolved = self.resolve(Stage::Overloading, &mut results)?;
            for stage in [Stage::MvVoltage, Stage::StationVoltage, Stage::LvVoltage] {
                resolved &= self.resolve(stage, &mut results)?;
            }
            if !resolved {
                break;
            }
            let remaining = self.find(Stage::Overloading, &results);
            if remaining.is_empty() {
                break;
            }
            if round >= self.options.max_while_iterations {
                if !self.options.skip_unresolved {
                    return Err(GridError::Reinforcement(format!(
                        "{} could not be solved after maximum allowed iterations.",
                        Stage::Overloading.label()
                    )));
                }
                self.unresolved.extend(unresolved_issues(&remaining));
                break;
            }
            debug!(round, "voltage measures caused new overloading");
        }
        Ok(results)
    }
}

fn unresolved_issues(found: &Violations) -> Vec<UnresolvedIssue> {
    let stations = found
        .hv_mv_station
        .iter()
        .chain(&found.mv_lv_stations)
        .map(|s| UnresolvedIssue {
            name: s.grid.clone(),
            issue: "station overloading".to_string(),
            value: s.max_rel_overload,
        });
    let lines = found.mv_lines.iter().chain(&found.lv_lines).map(|l| UnresolvedIssue {
        name: l.name.clone(),
        issue: "line overloading".to_string(),
        value: l.max_rel_overload,
    });
    let voltages = found
        .mv_voltage
        .iter()
        .chain(&found.mv_lv_station_voltage)
        .chain(&found.lv_voltage)
        .map(|v| UnresolvedIssue {
            name: v.bus.clone(),
            issue: "voltage deviation".to_string(),
            value: v.v_diff_max,
        });
    stations.chain(lines).chain(voltages).collect()
}

/// Time steps with the largest and the smallest residual load.
pub fn snapshot_timesteps(timeseries: &TimeSeries) -> Vec<NaiveDateTime> {
    let residual = timeseries.residual_load();
    let rows = residual.iter().enumerate();
    let max = rows.clone().max_by(|a, b| a.1.total_cmp(b.1)).map(|(i, _)| i);
    let min = rows.min_by(|a, b| a.1.total_cmp(b.1)).map(|(i, _)| i);
    let mut steps: Vec<NaiveDateTime> = [max, min]
        .into_iter()
        .flatten()
        .filter_map(|row| timeseries.timeindex.get(row).copied())
        .collect();
    steps.sort();
    steps.dedup();
    steps
}

/// Reinforce the grid until no overloading and voltage issues are left.
///
/// Changes are made to `topology` unless `copy_grid` is set. The returned
/// results hold the last power flow, the equipment changes and their costs.
pub fn reinforce(
    topology: &mut Topology,
    timeseries: &TimeSeries,
    config: &Config,
    options: &ReinforceOptions,
) -> GridResult<Results> {
    let mode = Scope::analyze_mode(options.mode);
    let mut analyze_options = AnalyzeOptions {
        mode,
        timesteps: None,
        raise_not_converged: true,
        troubleshooting: options.troubleshooting,
        solver: options.solver.clone(),
    };

    let mut state = Reinforcement {
        topology: topology.clone(),
        timeseries,
        config,
        options,
        analyze_options: analyze_options.clone(),
        scope: Scope::of(options.mode),
        iteration_step: 0,
        changes: Vec::new(),
        measures: Vec::new(),
        unresolved: Vec::new(),
    };

    analyze_options.timesteps = match &options.timesteps {
        TimestepSelection::All => None,
        TimestepSelection::Explicit(steps) => Some(steps.clone()),
        TimestepSelection::Snapshot => Some(snapshot_timesteps(timeseries)),
        TimestepSelection::Reduced => {
            let initial = state.run_power_flow()?;
            let mut all = Violations::default();
            for stage in [
                Stage::Overloading,
                Stage::MvVoltage,
                Stage::StationVoltage,
                Stage::LvVoltage,
            ] {
                let found = state.find(stage, &initial);
                all.hv_mv_station.extend(found.hv_mv_station);
                all.mv_lv_stations.extend(found.mv_lv_stations);
                all.mv_lines.extend(found.mv_lines);
                all.lv_lines.extend(found.lv_lines);
                all.mv_voltage.extend(found.mv_voltage);
                all.mv_lv_station_voltage.extend(found.mv_lv_station_voltage);
                all.lv_voltage.extend(found.lv_voltage);
            }
            let steps = all.critical_timesteps();
            if steps.is_empty() {
                None
            } else {
                Some(steps)
            }
        }
    };
    info!(
        mode = %mode,
        timesteps = analyze_options
            .timesteps
            .as_ref()
            .map_or(timeseries.timeindex.len(), |t| t.len()),
        "starting grid reinforcement"
    );
    state.analyze_options = analyze_options;

    let mut results = state.run()?;
    results.grid_expansion_costs = grid_expansion_costs(&state.topology, &state.changes, config);
    results.equipment_changes = state.changes;
    results.measures = state.measures;
    results.unresolved_issues = state.unresolved;
    info!(
        changes = results.equipment_changes.len(),
        total_costs = results.total_costs(),
        "grid reinforcement finished"
    );

    if !options.copy_grid {
        *topology = state.topology;
    }
    Ok(results)
}
