//! Charging strategies and flexibility bands.
//!
//! Charging profiles are built per charging process on the time index of the
//! mobility simulation in kW at the car, then summed per integrated charging
//! park, converted to MW at the grid with the charging point efficiency and
//! mapped onto the grid's time index.

use crate::data::{ChargingProcess, Electromobility, UseCase};
use chrono::{Duration, NaiveDateTime};
use gridplan_core::config::ElectromobilityConfig;
use gridplan_core::{GridError, GridResult};
use gridplan_ts::resample::infer_frequency;
use gridplan_ts::{TimeIndex, TimeSeriesFrame};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargingStrategy {
    /// Full power from arrival until the demand is met
    #[default]
    Dumb,
    /// Home and work charging stretched over the parking time
    Reduced,
    /// Home and work charging shifted into low residual load
    Residual,
}

impl FromStr for ChargingStrategy {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dumb" => Ok(ChargingStrategy::Dumb),
            "reduced" => Ok(ChargingStrategy::Reduced),
            "residual" => Ok(ChargingStrategy::Residual),
            other => Err(GridError::Validation(format!(
                "Charging strategy {} is not valid. Use dumb, reduced or residual.",
                other
            ))),
        }
    }
}

impl fmt::Display for ChargingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargingStrategy::Dumb => "dumb",
            ChargingStrategy::Reduced => "reduced",
            ChargingStrategy::Residual => "residual",
        };
        f.write_str(s)
    }
}

/// Time steps of the parking window that lie within the simulation.
fn window(process: &ChargingProcess, timesteps: usize) -> std::ops::Range<usize> {
    let end = (process.park_end + 1).min(timesteps);
    process.park_start.min(end)..end
}

/// Charge `steps` time steps worth of energy at `power` following `order`.
/// Full steps come first, the remainder goes to the next step in order.
/// Returns the share of `steps` that did not fit.
fn charge_in_order(
    order: impl IntoIterator<Item = usize>,
    power: f64,
    steps: f64,
    profile: &mut [f64],
) -> f64 {
    let mut left = steps;
    for t in order {
        if left <= 0.0 {
            break;
        }
        let share = left.min(1.0);
        profile[t] += power * share;
        left -= share;
    }
    left.max(0.0)
}

fn dumb(process: &ChargingProcess, stepsize_hours: f64, profile: &mut [f64]) -> f64 {
    let steps = process.full_power_timesteps(stepsize_hours);
    charge_in_order(
        window(process, profile.len()),
        process.netto_charging_capacity,
        steps,
        profile,
    )
}

/// Charging as late as possible within the parking window.
fn late(process: &ChargingProcess, stepsize_hours: f64, profile: &mut [f64]) -> f64 {
    let steps = process.full_power_timesteps(stepsize_hours);
    charge_in_order(
        window(process, profile.len()).rev(),
        process.netto_charging_capacity,
        steps,
        profile,
    )
}

fn reduced(
    process: &ChargingProcess,
    stepsize_hours: f64,
    config: &ElectromobilityConfig,
    profile: &mut [f64],
) -> f64 {
    let park_time = process.park_time_timesteps as f64;
    let duration_hours = park_time * stepsize_hours;
    let netto = process.netto_charging_capacity;
    let power = (process.charging_demand / duration_hours)
        .max(config.minimum_charging_capacity_factor * netto);
    if power >= netto || power <= 0.0 {
        return dumb(process, stepsize_hours, profile);
    }
    let steps = process.charging_demand / (power * stepsize_hours);
    if steps < config.timestamp_share_threshold * park_time {
        return dumb(process, stepsize_hours, profile);
    }
    charge_in_order(window(process, profile.len()), power, steps, profile)
}

/// Charging in the time steps with the lowest residual load. `residual` is
/// in MW and is raised by the grid side power of this process.
fn residual(
    process: &ChargingProcess,
    stepsize_hours: f64,
    eta: f64,
    residual: &mut [f64],
    profile: &mut [f64],
) -> f64 {
    let mut order: Vec<usize> = window(process, profile.len()).collect();
    order.sort_by(|a, b| residual[*a].total_cmp(&residual[*b]).then(a.cmp(b)));
    let mut own = vec![0.0; profile.len()];
    let left = charge_in_order(
        order,
        process.netto_charging_capacity,
        process.full_power_timesteps(stepsize_hours),
        &mut own,
    );
    for (t, p) in own.iter().enumerate() {
        if *p > 0.0 {
            profile[t] += p;
            residual[t] += p / eta / 1000.0;
        }
    }
    left
}

/// Residual load of the grid on the simulation time index. Every simulation
/// step takes the value of the latest grid step at or before it.
fn residual_on_simulation_index(
    sim_index: &[NaiveDateTime],
    grid_index: &[NaiveDateTime],
    residual_load: &[f64],
) -> Vec<f64> {
    sim_index
        .iter()
        .map(|t| {
            let pos = grid_index.partition_point(|g| g <= t);
            if pos == 0 {
                0.0
            } else {
                residual_load.get(pos - 1).copied().unwrap_or(0.0)
            }
        })
        .collect()
}

/// Map a profile on the simulation index onto `target`. Simulation steps
/// starting within a target step are averaged; target steps finer than the
/// simulation take the value of the simulation step containing them.
fn map_to_index(
    values: &[f64],
    sim_index: &[NaiveDateTime],
    sim_step: Duration,
    target: &[NaiveDateTime],
) -> Vec<f64> {
    let freq = infer_frequency(target).unwrap_or(sim_step);
    target
        .iter()
        .map(|t| {
            let from = sim_index.partition_point(|s| s < t);
            let to = sim_index.partition_point(|s| *s < *t + freq);
            if to > from {
                values[from..to].iter().sum::<f64>() / (to - from) as f64
            } else if from > 0 && sim_index[from - 1] + sim_step > *t {
                values[from - 1]
            } else {
                0.0
            }
        })
        .collect()
}

/// Charging profiles at the car in kW per process on the simulation index.
fn process_profiles(
    emob: &Electromobility,
    strategy: ChargingStrategy,
    grid_index: &[NaiveDateTime],
    residual_load: Option<&[f64]>,
    config: &ElectromobilityConfig,
) -> GridResult<Vec<Vec<f64>>> {
    let n = emob.timesteps();
    let h = emob.stepsize_hours();
    let mut profiles = vec![vec![0.0; n]; emob.charging_processes.len()];
    let mut unmet = 0usize;
    let flexible = |p: &ChargingProcess| p.use_case.is_private() && p.charging_park_id.is_some();

    let mut residual_sim = match strategy {
        ChargingStrategy::Residual => {
            let load = residual_load.ok_or_else(|| {
                GridError::Validation(
                    "Residual charging strategy requires the residual load of the grid."
                        .to_string(),
                )
            })?;
            if load.len() != grid_index.len() {
                return Err(GridError::Validation(format!(
                    "Residual load has {} values but the time index has {} entries.",
                    load.len(),
                    grid_index.len()
                )));
            }
            residual_on_simulation_index(&emob.timeindex(), grid_index, load)
        }
        _ => Vec::new(),
    };

    for (i, process) in emob.charging_processes.iter().enumerate() {
        if process.charging_park_id.is_none() {
            continue;
        }
        let left = match strategy {
            ChargingStrategy::Reduced if flexible(process) => {
                reduced(process, h, config, &mut profiles[i])
            }
            ChargingStrategy::Residual if flexible(process) => continue,
            ChargingStrategy::Residual => {
                let left = dumb(process, h, &mut profiles[i]);
                for (t, p) in profiles[i].iter().enumerate() {
                    residual_sim[t] += p / emob.eta_charging_points / 1000.0;
                }
                left
            }
            _ => dumb(process, h, &mut profiles[i]),
        };
        if left > 1e-9 {
            unmet += 1;
        }
    }

    if strategy == ChargingStrategy::Residual {
        let mut order: Vec<usize> = emob
            .charging_processes
            .iter()
            .enumerate()
            .filter(|(_, p)| flexible(p))
            .map(|(i, _)| i)
            .collect();
        let flexibility = |i: usize| {
            let p = &emob.charging_processes[i];
            p.park_time_timesteps as f64 - p.full_power_timesteps(h)
        };
        order.sort_by(|a, b| flexibility(*a).total_cmp(&flexibility(*b)).then(a.cmp(b)));
        for i in order {
            let left = residual(
                &emob.charging_processes[i],
                h,
                emob.eta_charging_points,
                &mut residual_sim,
                &mut profiles[i],
            );
            if left > 1e-9 {
                unmet += 1;
            }
        }
    }

    if unmet > 0 {
        warn!(
            "Charging demand of {} charging processes cannot be met within their parking time.",
            unmet
        );
    }
    Ok(profiles)
}

/// Charging time series in MW per integrated charging park on `timeindex`.
///
/// Processes at parks that are not integrated are ignored. `residual_load`
/// in MW on `timeindex` is required for [`ChargingStrategy::Residual`].
pub fn apply_charging_strategy(
    emob: &Electromobility,
    strategy: ChargingStrategy,
    timeindex: &[NaiveDateTime],
    residual_load: Option<&[f64]>,
    config: &ElectromobilityConfig,
) -> GridResult<TimeSeriesFrame> {
    let profiles = process_profiles(emob, strategy, timeindex, residual_load, config)?;
    let n = emob.timesteps();
    let sim_index = emob.timeindex();
    let sim_step = Duration::minutes(emob.stepsize_minutes as i64);

    let mut per_load: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (process, profile) in emob.charging_processes.iter().zip(&profiles) {
        let Some(load) = process
            .charging_park_id
            .and_then(|id| emob.integrated_charging_parks.get(&id))
        else {
            continue;
        };
        let sum = per_load.entry(load.as_str()).or_insert_with(|| vec![0.0; n]);
        for (s, p) in sum.iter_mut().zip(profile) {
            *s += p;
        }
    }
    for load in emob.integrated_charging_parks.values() {
        per_load.entry(load.as_str()).or_insert_with(|| vec![0.0; n]);
    }

    let mut frame = TimeSeriesFrame::new(timeindex.to_vec());
    let to_mw = 1.0 / emob.eta_charging_points / 1000.0;
    for (load, values) in per_load {
        let grid: Vec<f64> = values.iter().map(|v| v * to_mw).collect();
        frame.insert(load, map_to_index(&grid, &sim_index, sim_step, timeindex))?;
    }
    info!(
        strategy = %strategy,
        charging_parks = frame.columns.len(),
        "applied charging strategy"
    );
    Ok(frame)
}

/// Flexibility of charging points on the simulation time index.
///
/// `upper_power` in MW is the grid side power available while cars are
/// parked. `upper_energy` and `lower_energy` in MWh are the cumulative
/// energies of charging as early and as late as possible.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibilityBands {
    pub upper_power: TimeSeriesFrame,
    pub upper_energy: TimeSeriesFrame,
    pub lower_energy: TimeSeriesFrame,
}

fn cumulative(values: &[f64], factor: f64) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v * factor;
            Some(*acc)
        })
        .collect()
}

/// Flexibility bands per charging point of the given use cases. Columns are
/// named `charging_point_<id>`.
pub fn flexibility_bands(
    emob: &Electromobility,
    use_cases: &[UseCase],
) -> GridResult<FlexibilityBands> {
    let n = emob.timesteps();
    let h = emob.stepsize_hours();
    let index: TimeIndex = emob.timeindex();

    let mut points: BTreeMap<u64, [Vec<f64>; 3]> = BTreeMap::new();
    for process in &emob.charging_processes {
        if !use_cases.contains(&process.use_case) {
            continue;
        }
        let Some(point) = process.charging_point_id else { continue };
        let [power, early, late_] = points
            .entry(point)
            .or_insert_with(|| [vec![0.0; n], vec![0.0; n], vec![0.0; n]]);
        for t in window(process, n) {
            power[t] += process.netto_charging_capacity;
        }
        dumb(process, h, early);
        late(process, h, late_);
    }

    let to_mw = 1.0 / emob.eta_charging_points / 1000.0;
    let mut bands = FlexibilityBands {
        upper_power: TimeSeriesFrame::new(index.clone()),
        upper_energy: TimeSeriesFrame::new(index.clone()),
        lower_energy: TimeSeriesFrame::new(index),
    };
    for (point, [power, early, late_]) in points {
        let name = format!("charging_point_{}", point);
        bands
            .upper_power
            .insert(name.clone(), power.iter().map(|p| p * to_mw).collect())?;
        bands
            .upper_energy
            .insert(name.clone(), cumulative(&early, to_mw * h))?;
        bands.lower_energy.insert(name, cumulative(&late_, to_mw * h))?;
    }
    debug!(points = bands.upper_power.columns.len(), "determined flexibility bands");
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::electromobility;
    use chrono::Duration;

    const TO_MW: f64 = 1.0 / 0.9 / 1000.0;

    /// Home processes at park 0, public at 2 and hpc at 3, all integrated.
    fn assigned() -> Electromobility {
        let mut emob = electromobility();
        for (i, p) in emob.charging_processes.iter_mut().enumerate() {
            p.charging_park_id = Some(match p.use_case {
                UseCase::Home | UseCase::Work => 0,
                UseCase::Public => 2,
                UseCase::Hpc => 3,
            });
            p.charging_point_id = Some(if p.car_id == "car_1" && p.use_case == UseCase::Home {
                100
            } else {
                i as u64
            });
        }
        emob.integrated_charging_parks.insert(0, "cp_home".to_string());
        emob.integrated_charging_parks.insert(2, "cp_public".to_string());
        emob.integrated_charging_parks.insert(3, "cp_hpc".to_string());
        emob
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn dumb_charging_at_full_power_from_arrival() {
        let emob = assigned();
        let index = emob.timeindex();
        let ts = apply_charging_strategy(&emob, ChargingStrategy::Dumb, &index, None, &Default::default())
            .unwrap();
        let home = ts.column("cp_home").unwrap();
        assert!(close(home[0], 11.0 * TO_MW));
        assert!(close(home[5], 14.7 * TO_MW));
        assert!(close(home[8], 3.7 * TO_MW));
        assert!(close(home[12], 0.0));
        assert!(close(home[73], 11.0 * TO_MW));
        assert!(close(home[74], 0.0));

        let hpc = ts.column("cp_hpc").unwrap();
        assert!(close(hpc[50], 150.0 * TO_MW));
        assert!(close(hpc.iter().sum::<f64>(), 150.0 * TO_MW));
    }

    #[test]
    fn hourly_grid_index_averages_simulation_steps() {
        let emob = assigned();
        let index = gridplan_ts::date_range(emob.simulation_start, 24, Duration::hours(1));
        let ts = apply_charging_strategy(&emob, ChargingStrategy::Dumb, &index, None, &Default::default())
            .unwrap();
        let hpc = ts.column("cp_hpc").unwrap();
        assert_eq!(hpc.len(), 24);
        assert!(close(hpc[12], 150.0 / 4.0 * TO_MW));
        // 22 kW public charging in 40 and 41, 44 is the next hour
        let public = ts.column("cp_public").unwrap();
        assert!(close(public[10], 22.0 / 2.0 * TO_MW));
        assert!(close(public[11], 22.0 / 4.0 * TO_MW));
    }

    #[test]
    fn reduced_charging_stretches_home_charging() {
        let emob = assigned();
        let index = emob.timeindex();
        let ts = apply_charging_strategy(&emob, ChargingStrategy::Reduced, &index, None, &Default::default())
            .unwrap();
        let home = ts.column("cp_home").unwrap();
        // 22 kWh over 8 h and 7.4 kWh over 8 h
        assert!(close(home[20], (2.75 + 0.925) * TO_MW));
        let hpc = ts.column("cp_hpc").unwrap();
        assert!(close(hpc[50], 150.0 * TO_MW));
    }

    #[test]
    fn reduced_falls_back_to_dumb_for_short_charging() {
        let mut emob = assigned();
        // minimum power keeps charging at full power
        let config = ElectromobilityConfig {
            minimum_charging_capacity_factor: 1.0,
            ..Default::default()
        };
        emob.charging_processes.truncate(1);
        let index = emob.timeindex();
        let ts = apply_charging_strategy(&emob, ChargingStrategy::Reduced, &index, None, &config).unwrap();
        let home = ts.column("cp_home").unwrap();
        assert!(close(home[0], 11.0 * TO_MW));
        assert!(close(home[8], 0.0));
    }

    #[test]
    fn residual_charging_follows_low_residual_load() {
        let emob = assigned();
        let index = emob.timeindex();
        let mut residual_load = vec![0.0; index.len()];
        for v in &mut residual_load[20..28] {
            *v = -1.0;
        }
        let ts = apply_charging_strategy(
            &emob,
            ChargingStrategy::Residual,
            &index,
            Some(&residual_load),
            &Default::default(),
        )
        .unwrap();
        let home = ts.column("cp_home").unwrap();
        assert!(close(home[0], 0.0));
        assert!(close(home[20], 14.7 * TO_MW));
        assert!(close(home[27], 14.7 * TO_MW));
        // flat residual load: earliest steps
        assert!(close(home[72], 11.0 * TO_MW));
        assert!(close(home[74], 0.0));
    }

    #[test]
    fn residual_strategy_needs_residual_load() {
        let emob = assigned();
        let index = emob.timeindex();
        assert!(apply_charging_strategy(&emob, ChargingStrategy::Residual, &index, None, &Default::default())
            .is_err());
    }

    #[test]
    fn parks_not_in_the_grid_are_ignored() {
        let mut emob = assigned();
        emob.integrated_charging_parks.remove(&3);
        let index = emob.timeindex();
        let ts = apply_charging_strategy(&emob, ChargingStrategy::Dumb, &index, None, &Default::default())
            .unwrap();
        assert!(ts.column("cp_hpc").is_none());
        assert_eq!(ts.columns.len(), 2);
    }

    #[test]
    fn flexibility_bands_of_home_charging() {
        let emob = assigned();
        let bands = flexibility_bands(&emob, &[UseCase::Home]).unwrap();
        assert_eq!(bands.upper_power.columns.len(), 2);

        let power = bands.upper_power.column("charging_point_100").unwrap();
        assert!(close(power[10], 11.0 * TO_MW));
        assert!(close(power[50], 0.0));

        let upper = bands.upper_energy.column("charging_point_100").unwrap();
        let lower = bands.lower_energy.column("charging_point_100").unwrap();
        assert!(close(upper[10], 22.0 * TO_MW));
        assert!(close(lower[10], 0.0));
        assert!(close(upper[95], 27.5 * TO_MW));
        assert!(close(lower[95], upper[95]));
        assert!(upper.iter().zip(lower).all(|(u, l)| u + 1e-12 >= *l));
    }

    #[test]
    fn strategy_names() {
        assert_eq!("residual".parse::<ChargingStrategy>().unwrap(), ChargingStrategy::Residual);
        assert_eq!(ChargingStrategy::Reduced.to_string(), "reduced");
        assert!("smart".parse::<ChargingStrategy>().is_err());
    }
}
