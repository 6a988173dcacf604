//! Technical constraint checks on power flow results.
//!
//! Overloading is measured relative to the rating scaled with the allowed
//! load factor of the time step's case (load case or feed-in case).
//! Voltages are checked against bands from the configuration: the MV grid
//! against a fixed band around the slack voltage, LV buses relative to
//! their station and station secondary sides relative to the primary side.

use crate::results::Results;
use chrono::NaiveDateTime;
use gridplan_core::config::VoltageDeviations;
use gridplan_core::{Case, Config, Topology, VoltageLevel};
use gridplan_ts::TimeSeries;
use serde::Serialize;
use std::collections::BTreeMap;

/// Overloads and deviations below this are numerical noise.
const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOverload {
    pub name: String,
    /// Largest `s_res / (s_nom · load factor)`
    pub max_rel_overload: f64,
    pub time_index: NaiveDateTime,
    pub voltage_level: VoltageLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationOverload {
    /// `MVGrid_<id>` or `LVGrid_<id>`
    pub grid: String,
    /// None for the HV/MV station
    pub lv_grid_id: Option<u32>,
    /// Largest missing transformer capacity in MVA
    pub s_missing: f64,
    pub max_rel_overload: f64,
    pub time_index: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageIssue {
    pub bus: String,
    /// Largest distance to the allowed band in p.u.
    pub v_diff_max: f64,
    pub time_index: NaiveDateTime,
    /// None for MV buses
    pub lv_grid_id: Option<u32>,
}

/// All violations found in one set of results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Violations {
    pub hv_mv_station: Vec<StationOverload>,
    pub mv_lv_stations: Vec<StationOverload>,
    pub mv_lines: Vec<LineOverload>,
    pub lv_lines: Vec<LineOverload>,
    pub mv_voltage: Vec<VoltageIssue>,
    pub mv_lv_station_voltage: Vec<VoltageIssue>,
    pub lv_voltage: Vec<VoltageIssue>,
}

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.overload_count() == 0 && self.voltage_issue_count() == 0
    }

    pub fn overload_count(&self) -> usize {
        self.hv_mv_station.len() + self.mv_lv_stations.len() + self.mv_lines.len() + self.lv_lines.len()
    }

    pub fn voltage_issue_count(&self) -> usize {
        self.mv_voltage.len() + self.mv_lv_station_voltage.len() + self.lv_voltage.len()
    }

    /// Time steps at which some component has its worst violation.
    pub fn critical_timesteps(&self) -> Vec<NaiveDateTime> {
        let mut steps: Vec<NaiveDateTime> = self
            .hv_mv_station
            .iter()
            .chain(&self.mv_lv_stations)
            .map(|s| s.time_index)
            .chain(self.mv_lines.iter().chain(&self.lv_lines).map(|l| l.time_index))
            .chain(
                self.mv_voltage
                    .iter()
                    .chain(&self.mv_lv_station_voltage)
                    .chain(&self.lv_voltage)
                    .map(|v| v.time_index),
            )
            .collect();
        steps.sort();
        steps.dedup();
        steps
    }
}

/// Case of every analyzed time step.
pub(crate) fn cases(timeseries: &TimeSeries, results: &Results) -> Vec<Case> {
    let by_step = timeseries.timesteps_load_feedin_case();
    results
        .timesteps()
        .iter()
        .map(|ts| by_step.get(ts).copied().unwrap_or(Case::LoadCase))
        .collect()
}

fn line_overload(
    topology: &Topology,
    results: &Results,
    config: &Config,
    cases: &[Case],
    level: VoltageLevel,
) -> Vec<LineOverload> {
    let factors = &config.grid_expansion_load_factors;
    let mut out = Vec::new();
    for line in topology.lines.values() {
        if topology.voltage_level(&line.bus0) != Some(level) || line.s_nom <= 0.0 {
            continue;
        }
        let Some(s) = results.s_res.column(&line.name) else {
            continue;
        };
        let worst = s
            .iter()
            .zip(cases)
            .enumerate()
            .map(|(row, (s, case))| (row, s / (line.s_nom * factors.line(level, *case))))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((row, rel)) = worst {
            if rel > 1.0 + TOLERANCE {
                out.push(LineOverload {
                    name: line.name.clone(),
                    max_rel_overload: rel,
                    time_index: results.timesteps()[row],
                    voltage_level: level,
                });
            }
        }
    }
    out.sort_by(|a, b| b.max_rel_overload.total_cmp(&a.max_rel_overload));
    out
}

pub fn mv_line_overload(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
) -> Vec<LineOverload> {
    let cases = cases(timeseries, results);
    line_overload(topology, results, config, &cases, VoltageLevel::Mv)
}

pub fn lv_line_overload(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
) -> Vec<LineOverload> {
    let cases = cases(timeseries, results);
    line_overload(topology, results, config, &cases, VoltageLevel::Lv)
}

/// Worst shortfall of `capacity` against `load`, both per time step.
fn station_shortfall(load: &[f64], capacity: &[f64]) -> Option<(usize, f64, f64)> {
    load.iter()
        .zip(capacity)
        .enumerate()
        .map(|(row, (s, cap))| (row, s - cap, if *cap > 0.0 { s / cap } else { f64::INFINITY }))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, missing, _)| *missing > TOLERANCE)
}

/// Overloading of the HV/MV station, from the power supplied by the slack.
pub fn hv_mv_station_overload(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
) -> Vec<StationOverload> {
    if matches!(results.mode, Some(crate::network::AnalyzeMode::Lv(_))) {
        return Vec::new();
    }
    let (Some(p), Some(q)) = (results.pfa_slack.column("p"), results.pfa_slack.column("q")) else {
        return Vec::new();
    };
    let s_nom: f64 = topology.transformers_hvmv.values().map(|t| t.s_nom).sum();
    let factors = &config.grid_expansion_load_factors;
    let load: Vec<f64> = p.iter().zip(q).map(|(p, q)| p.hypot(*q)).collect();
    let capacity: Vec<f64> = cases(timeseries, results)
        .iter()
        .map(|case| s_nom * factors.transformer(VoltageLevel::Mv, *case))
        .collect();
    station_shortfall(&load, &capacity)
        .map(|(row, s_missing, rel)| StationOverload {
            grid: topology.mv_grid().to_string(),
            lv_grid_id: None,
            s_missing,
            max_rel_overload: rel,
            time_index: results.timesteps()[row],
        })
        .into_iter()
        .collect()
}

/// Overloading of MV/LV stations. Stations whose transformers are not part
/// of the results are skipped.
pub fn mv_lv_station_overload(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
) -> Vec<StationOverload> {
    let cases = cases(timeseries, results);
    let factors = &config.grid_expansion_load_factors;
    let mut out = Vec::new();
    for grid in topology.lv_grids() {
        let trafos = grid.transformers();
        if trafos.is_empty() {
            continue;
        }
        let columns: Option<Vec<&[f64]>> = trafos.iter().map(|t| results.s_res.column(&t.name)).collect();
        let Some(columns) = columns else {
            continue;
        };
        let s_nom: f64 = trafos.iter().map(|t| t.s_nom).sum();
        let load: Vec<f64> = (0..cases.len())
            .map(|row| columns.iter().map(|c| c[row]).sum())
            .collect();
        let capacity: Vec<f64> = cases
            .iter()
            .map(|case| s_nom * factors.transformer(VoltageLevel::Lv, *case))
            .collect();
        if let Some((row, s_missing, rel)) = station_shortfall(&load, &capacity) {
            out.push(StationOverload {
                grid: grid.to_string(),
                lv_grid_id: Some(grid.id),
                s_missing,
                max_rel_overload: rel,
                time_index: results.timesteps()[row],
            });
        }
    }
    out.sort_by(|a, b| b.s_missing.total_cmp(&a.s_missing));
    out
}

/// Distance of `v` to the band `[lower, upper]` per time step: positive
/// above, negative below and zero inside the band.
pub fn voltage_diff(v: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    v.iter()
        .zip(lower.iter().zip(upper))
        .map(|(v, (lo, up))| {
            if v > up {
                v - up
            } else if v < lo {
                v - lo
            } else {
                0.0
            }
        })
        .collect()
}

fn worst_deviation(
    results: &Results,
    bus: &str,
    lower: &[f64],
    upper: &[f64],
    lv_grid_id: Option<u32>,
) -> Option<VoltageIssue> {
    let v = results.v_res.column(bus)?;
    let diff = voltage_diff(v, lower, upper);
    let (row, worst) = diff
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
    (worst.abs() > TOLERANCE).then(|| VoltageIssue {
        bus: bus.to_string(),
        v_diff_max: worst.abs(),
        time_index: results.timesteps()[row],
        lv_grid_id,
    })
}

fn sorted(mut issues: Vec<VoltageIssue>) -> Vec<VoltageIssue> {
    issues.sort_by(|a, b| b.v_diff_max.total_cmp(&a.v_diff_max));
    issues
}

/// Allowed MV band `(lower, upper)` around the slack.
pub fn mv_allowed_band(deviations: &VoltageDeviations, combined: bool) -> (f64, f64) {
    if combined {
        return (
            1.0 - deviations.mv_lv_max_v_deviation,
            1.0 + deviations.mv_lv_max_v_deviation,
        );
    }
    let base = 1.0 + deviations.hv_mv_trafo_offset;
    (
        base - deviations.hv_mv_trafo_control_deviation - deviations.mv_load_case_max_v_drop,
        base + deviations.hv_mv_trafo_control_deviation + deviations.mv_feedin_case_max_v_rise,
    )
}

/// Voltage issues at MV buses.
///
/// With `combined` the MV and LV grids share one band and are checked
/// against it together.
pub fn mv_voltage_deviation(
    topology: &Topology,
    results: &Results,
    config: &Config,
    combined: bool,
) -> Vec<VoltageIssue> {
    let (lo, up) = mv_allowed_band(&config.grid_expansion_allowed_voltage_deviations, combined);
    let n = results.timesteps().len();
    let (lower, upper) = (vec![lo; n], vec![up; n]);
    let issues = topology
        .mv_grid()
        .buses()
        .into_iter()
        .filter_map(|bus| worst_deviation(results, &bus.name, &lower, &upper, None))
        .collect();
    sorted(issues)
}

/// Voltage issues at the secondary side of MV/LV stations, relative to the
/// primary side.
pub fn mv_lv_station_voltage_deviation(
    topology: &Topology,
    results: &Results,
    config: &Config,
) -> Vec<VoltageIssue> {
    let dev = &config.grid_expansion_allowed_voltage_deviations;
    let mut issues = Vec::new();
    for id in topology.lv_grid_ids() {
        let (Some(secondary), Some(primary)) =
            (topology.lv_station_bus(id), topology.lv_station_primary_bus(id))
        else {
            continue;
        };
        let Some(v_primary) = results.v_res.column(primary) else {
            continue;
        };
        let lower: Vec<f64> = v_primary
            .iter()
            .map(|v| v - dev.mv_lv_station_load_case_max_v_drop)
            .collect();
        let upper: Vec<f64> = v_primary
            .iter()
            .map(|v| v + dev.mv_lv_station_feedin_case_max_v_rise)
            .collect();
        issues.extend(worst_deviation(results, secondary, &lower, &upper, Some(id)));
    }
    sorted(issues)
}

/// Voltage issues at LV buses, relative to the station's secondary side, or
/// against the combined band with `combined`.
pub fn lv_voltage_deviation(
    topology: &Topology,
    results: &Results,
    config: &Config,
    combined: bool,
) -> Vec<VoltageIssue> {
    let dev = &config.grid_expansion_allowed_voltage_deviations;
    let n = results.timesteps().len();
    let mut issues = Vec::new();
    for grid in topology.lv_grids() {
        let Some(station) = grid.station_bus() else {
            continue;
        };
        let (lower, upper) = if combined {
            let (lo, up) = mv_allowed_band(dev, true);
            (vec![lo; n], vec![up; n])
        } else {
            let Some(v_station) = results.v_res.column(station) else {
                continue;
            };
            (
                v_station.iter().map(|v| v - dev.lv_load_case_max_v_drop).collect(),
                v_station.iter().map(|v| v + dev.lv_feedin_case_max_v_rise).collect(),
            )
        };
        for bus in grid.buses() {
            if bus.name == station && !combined {
                continue;
            }
            issues.extend(worst_deviation(results, &bus.name, &lower, &upper, Some(grid.id)));
        }
    }
    sorted(issues)
}

/// Run all checks.
pub fn check_all(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
    combined: bool,
) -> Violations {
    Violations {
        hv_mv_station: hv_mv_station_overload(topology, timeseries, results, config),
        mv_lv_stations: mv_lv_station_overload(topology, timeseries, results, config),
        mv_lines: mv_line_overload(topology, timeseries, results, config),
        lv_lines: lv_line_overload(topology, timeseries, results, config),
        mv_voltage: mv_voltage_deviation(topology, results, config, combined),
        mv_lv_station_voltage: if combined {
            Vec::new()
        } else {
            mv_lv_station_voltage_deviation(topology, results, config)
        },
        lv_voltage: lv_voltage_deviation(topology, results, config, combined),
    }
}

/// Relative load of every line and transformer per time step.
pub fn relative_loading(
    topology: &Topology,
    timeseries: &TimeSeries,
    results: &Results,
    config: &Config,
) -> BTreeMap<String, Vec<f64>> {
    let cases = cases(timeseries, results);
    let factors = &config.grid_expansion_load_factors;
    let mut out = BTreeMap::new();
    for line in topology.lines.values() {
        let (Some(s), Some(level)) = (results.s_res.column(&line.name), topology.voltage_level(&line.bus0))
        else {
            continue;
        };
        if line.s_nom <= 0.0 {
            continue;
        }
        let rel = s
            .iter()
            .zip(&cases)
            .map(|(s, case)| s / (line.s_nom * factors.line(level, *case)))
            .collect();
        out.insert(line.name.clone(), rel);
    }
    for trafo in topology.transformers.values() {
        let Some(s) = results.s_res.column(&trafo.name) else {
            continue;
        };
        let rel = s
            .iter()
            .zip(&cases)
            .map(|(s, case)| s / (trafo.s_nom * factors.transformer(VoltageLevel::Lv, *case)))
            .collect();
        out.insert(trafo.name.clone(), rel);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{analyze, AnalyzeOptions};
    use gridplan_core::synthetic;

    fn analyzed(topo: &Topology, config: &Config) -> (TimeSeries, Results) {
        let mut ts = TimeSeries::new();
        ts.set_worst_case(topo, config, &[Case::LoadCase, Case::FeedInCase])
            .unwrap();
        let results = analyze(topo, &ts, config, &AnalyzeOptions::default()).unwrap();
        (ts, results)
    }

    #[test]
    fn example_grid_is_within_limits() {
        let topo = synthetic::example_topology();
        let config = Config::default();
        let (ts, results) = analyzed(&topo, &config);
        let violations = check_all(&topo, &ts, &results, &config, false);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn heavy_mv_load_overloads_lines_and_drops_voltage() {
        let mut topo = synthetic::example_topology();
        topo.loads
            .get_mut("Conventional_Load_MVGrid_1_industrial_1")
            .unwrap()
            .p_set = 15.0;
        let config = Config::default();
        let (ts, results) = analyzed(&topo, &config);

        let lines = mv_line_overload(&topo, &ts, &results, &config);
        let names: Vec<&str> = lines.iter().map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"Line_10004"));
        assert!(names.contains(&"Line_10005"));
        assert!(lines.iter().all(|l| l.max_rel_overload > 1.0));
        // worst in a load case step
        let case_of = ts.timesteps_load_feedin_case();
        assert_eq!(case_of[&lines[0].time_index], Case::LoadCase);

        let voltage = mv_voltage_deviation(&topo, &results, &config, false);
        assert_eq!(voltage[0].bus, "BranchTee_MVGrid_1_2");
        assert!(voltage[0].v_diff_max > 0.0);
        assert!(voltage.iter().all(|v| v.lv_grid_id.is_none()));
    }

    #[test]
    fn small_station_transformer_is_overloaded() {
        let mut topo = synthetic::example_topology();
        topo.transformers
            .get_mut("LVStation_2_transformer_1")
            .unwrap()
            .s_nom = 0.02;
        let config = Config::default();
        let (ts, results) = analyzed(&topo, &config);
        let stations = mv_lv_station_overload(&topo, &ts, &results, &config);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].lv_grid_id, Some(2));
        assert!(stations[0].s_missing > 0.0);
    }

    #[test]
    fn hv_mv_station_uses_slack_power() {
        let mut topo = synthetic::example_topology();
        for t in topo.transformers_hvmv.values_mut() {
            t.s_nom = 1.0;
        }
        let config = Config::default();
        let (ts, results) = analyzed(&topo, &config);
        // 1.5 MW wind feed-in against 1 MVA
        let station = hv_mv_station_overload(&topo, &ts, &results, &config);
        assert_eq!(station.len(), 1);
        assert_eq!(station[0].grid, "MVGrid_1");
        assert!(station[0].s_missing > 0.0);
        assert!(station[0].max_rel_overload > 1.0);
    }

    #[test]
    fn lv_voltage_relative_to_station() {
        let mut topo = synthetic::example_topology();
        topo.loads
            .get_mut("Conventional_Load_LVGrid_1_residential_3")
            .unwrap()
            .p_set = 0.4;
        let config = Config::default();
        let (ts, results) = analyzed(&topo, &config);
        let issues = lv_voltage_deviation(&topo, &results, &config, false);
        assert!(!issues.is_empty());
        assert_eq!(issues[0].bus, "Bus_LVGrid_1_building_3");
        assert_eq!(issues[0].lv_grid_id, Some(1));
        assert!(issues.iter().all(|i| i.bus != "BusBar_LVGrid_1_LV"));
        // the combined band is wider
        let combined = lv_voltage_deviation(&topo, &results, &config, true);
        assert!(combined.len() <= issues.len());
    }

    #[test]
    fn voltage_diff_signs() {
        let diff = voltage_diff(&[1.2, 0.95, 0.8], &[0.9; 3], &[1.1; 3]);
        assert!((diff[0] - 0.1).abs() < 1e-12);
        assert_eq!(diff[1], 0.0);
        assert!((diff[2] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn mv_band_from_config() {
        let dev = VoltageDeviations::default();
        let (lo, up) = mv_allowed_band(&dev, false);
        assert!((lo - 0.985).abs() < 1e-12);
        assert!((up - 1.05).abs() < 1e-12);
        let (lo, up) = mv_allowed_band(&dev, true);
        assert!((lo - 0.9).abs() < 1e-12 && (up - 1.1).abs() < 1e-12);
    }

    #[test]
    fn equal_overloads_report_the_last_time_step() {
        let topo = synthetic::example_topology();
        let config = Config::default();
        let s_nom = topo.lines["Line_10001"].s_nom;
        let start = chrono::NaiveDate::from_ymd_opt(2011, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let index = gridplan_ts::date_range(start, 3, chrono::Duration::hours(1));
        let mut results = Results::new();
        results.v_res.index = index.clone();
        results.s_res.index = index.clone();
        results
            .s_res
            .insert("Line_10001", vec![s_nom, 0.2 * s_nom, s_nom])
            .unwrap();

        let cases = [Case::LoadCase; 3];
        let overloads = line_overload(&topo, &results, &config, &cases, VoltageLevel::Mv);
        assert_eq!(overloads.len(), 1);
        // load case factor 0.5 for MV lines
        assert!((overloads[0].max_rel_overload - 2.0).abs() < 1e-12);
        assert_eq!(overloads[0].time_index, index[2]);
    }
}
