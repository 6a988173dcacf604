//! Allocation of charging processes to charging parks and charging points.

use crate::data::{Electromobility, PotentialChargingPark, UseCase};
use gridplan_core::config::ElectromobilityConfig;
use gridplan_core::topology::connect::haversine_km;
use gridplan_core::{GridError, GridResult, Topology};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionMode {
    /// Parks are drawn by their user centric weight
    #[default]
    UserFriendly,
    /// User centric weight times the grid centric weight of the closest
    /// MV/LV station
    GridFriendly,
}

impl FromStr for DistributionMode {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_friendly" => Ok(DistributionMode::UserFriendly),
            "grid_friendly" => Ok(DistributionMode::GridFriendly),
            other => Err(GridError::Validation(format!(
                "Unknown distribution mode {}. Use user_friendly or grid_friendly.",
                other
            ))),
        }
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionMode::UserFriendly => f.write_str("user_friendly"),
            DistributionMode::GridFriendly => f.write_str("grid_friendly"),
        }
    }
}

/// LV grid of the MV/LV station closest to (`x`, `y`).
fn nearest_lv_grid(topology: &Topology, x: f64, y: f64) -> Option<u32> {
    topology
        .lv_grid_ids()
        .into_iter()
        .filter_map(|id| {
            let station = topology.lv_station_bus(id)?;
            let pos = topology.buses.get(station)?.coordinates()?;
            Some((id, haversine_km((x, y), pos)))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

/// Spare station capacity of an LV grid relative to its rating, counting
/// local generation as available.
pub fn grid_centric_weight(topology: &Topology, lv_grid_id: u32) -> f64 {
    let Some(grid) = topology.lv_grids().find(|g| g.id == lv_grid_id) else {
        return 0.0;
    };
    let s_nom: f64 = grid.transformers().iter().map(|t| t.s_nom).sum();
    if s_nom <= 0.0 {
        return 0.0;
    }
    ((s_nom - grid.p_set() + grid.peak_generation_capacity()) / s_nom).max(0.0)
}

/// Set the closest LV grid and the grid centric weight of every park.
pub fn locate_charging_parks(emob: &mut Electromobility, topology: &Topology) {
    for park in &mut emob.potential_charging_parks {
        park.nearest_lv_grid = nearest_lv_grid(topology, park.x, park.y);
        park.grid_centric_weight = park
            .nearest_lv_grid
            .map_or(0.0, |id| grid_centric_weight(topology, id));
    }
}

fn weight(park: &PotentialChargingPark, mode: DistributionMode) -> f64 {
    match mode {
        DistributionMode::UserFriendly => park.user_centric_weight,
        DistributionMode::GridFriendly => park.user_centric_weight * park.grid_centric_weight,
    }
}

/// Parks of `use_case` and a sampler over their weights.
fn sampler(
    emob: &Electromobility,
    use_case: UseCase,
    mode: DistributionMode,
) -> Option<(Vec<u64>, WeightedIndex<f64>)> {
    let parks: Vec<&PotentialChargingPark> = emob
        .potential_charging_parks
        .iter()
        .filter(|p| p.use_case == use_case)
        .collect();
    let weights: Vec<f64> = parks.iter().map(|p| weight(p, mode).max(0.0)).collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => Some((parks.iter().map(|p| p.id).collect(), dist)),
        Err(e) => {
            debug!(use_case = %use_case, error = %e, "no park can be drawn");
            None
        }
    }
}

/// Assign every charging process to a charging park and a charging point.
///
/// Home and work: all processes of a car at one use case go to the same
/// randomly drawn park and share one charging point there. Public and hpc:
/// every process draws its own park and uses the first charging point there
/// that is free at its start, or a new one.
///
/// Drawing is reproducible for a given `seed`. Capacities of the parks are
/// updated afterwards.
pub fn distribute_charging_demand(
    emob: &mut Electromobility,
    topology: &Topology,
    mode: DistributionMode,
    seed: u64,
    config: &ElectromobilityConfig,
) -> GridResult<()> {
    locate_charging_parks(emob, topology);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_point = 0u64;
    for process in &mut emob.charging_processes {
        process.charging_park_id = None;
        process.charging_point_id = None;
    }

    for use_case in UseCase::ALL {
        let indices: Vec<usize> = emob
            .charging_processes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.use_case == use_case)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            continue;
        }
        let Some((park_ids, dist)) = sampler(emob, use_case, mode) else {
            warn!(
                "No potential charging parks for {} charging. {} charging processes are not allocated.",
                use_case,
                indices.len()
            );
            continue;
        };

        if use_case.is_private() {
            let mut per_car: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for i in indices {
                per_car
                    .entry(emob.charging_processes[i].car_id.clone())
                    .or_default()
                    .push(i);
            }
            for processes in per_car.values() {
                let park = park_ids[dist.sample(&mut rng)];
                for &i in processes {
                    emob.charging_processes[i].charging_park_id = Some(park);
                    emob.charging_processes[i].charging_point_id = Some(next_point);
                }
                next_point += 1;
            }
        } else {
            let mut ordered = indices;
            ordered.sort_by_key(|&i| (emob.charging_processes[i].park_start, i));
            // park id to (charging point, last occupied time step)
            let mut points: BTreeMap<u64, Vec<(u64, usize)>> = BTreeMap::new();
            for i in ordered {
                let park = park_ids[dist.sample(&mut rng)];
                let (start, end) = {
                    let p = &emob.charging_processes[i];
                    (p.park_start, p.park_end)
                };
                let at_park = points.entry(park).or_default();
                let point = match at_park.iter_mut().find(|(_, last)| *last < start) {
                    Some(free) => {
                        free.1 = end;
                        free.0
                    }
                    None => {
                        at_park.push((next_point, end));
                        next_point += 1;
                        next_point - 1
                    }
                };
                emob.charging_processes[i].charging_park_id = Some(park);
                emob.charging_processes[i].charging_point_id = Some(point);
            }
        }
    }

    emob.update_park_capacities(config);
    info!(
        mode = %mode,
        charging_points = next_point,
        parks = emob
            .potential_charging_parks
            .iter()
            .filter(|p| p.designated_charging_point_capacity > 0.0)
            .count(),
        "distributed charging demand"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::electromobility;
    use gridplan_core::synthetic;

    #[test]
    fn private_processes_share_park_and_point_per_car() {
        let topo = synthetic::example_topology();
        let mut emob = electromobility();
        distribute_charging_demand(
            &mut emob,
            &topo,
            DistributionMode::UserFriendly,
            42,
            &Default::default(),
        )
        .unwrap();
        let car_1_home: Vec<_> = emob
            .charging_processes
            .iter()
            .filter(|p| p.car_id == "car_1" && p.use_case == UseCase::Home)
            .collect();
        assert_eq!(car_1_home.len(), 2);
        assert_eq!(car_1_home[0].charging_park_id, car_1_home[1].charging_park_id);
        assert_eq!(car_1_home[0].charging_point_id, car_1_home[1].charging_point_id);
        assert!(emob.charging_processes.iter().all(|p| p.charging_park_id.is_some()));

        let car_2_home = emob
            .charging_processes
            .iter()
            .find(|p| p.car_id == "car_2" && p.use_case == UseCase::Home)
            .unwrap();
        assert_ne!(car_2_home.charging_point_id, car_1_home[0].charging_point_id);
    }

    #[test]
    fn public_points_are_reused_when_free() {
        let topo = synthetic::example_topology();
        let mut emob = electromobility();
        distribute_charging_demand(
            &mut emob,
            &topo,
            DistributionMode::UserFriendly,
            1,
            &Default::default(),
        )
        .unwrap();
        // one public park: 40..=43 and 44..=47 do not overlap
        let public: Vec<_> = emob
            .charging_processes
            .iter()
            .filter(|p| p.use_case == UseCase::Public)
            .collect();
        assert_eq!(public[0].charging_park_id, Some(2));
        assert_eq!(public[0].charging_point_id, public[1].charging_point_id);

        let park = emob.park(2).unwrap();
        assert!((park.designated_charging_point_capacity - 24.4).abs() < 1e-9);
        assert_eq!(park.nearest_lv_grid, Some(3));
    }

    #[test]
    fn overlapping_public_processes_get_separate_points() {
        let topo = synthetic::example_topology();
        let mut emob = electromobility();
        emob.charging_processes[4].park_start = 42;
        distribute_charging_demand(
            &mut emob,
            &topo,
            DistributionMode::UserFriendly,
            1,
            &Default::default(),
        )
        .unwrap();
        assert_ne!(
            emob.charging_processes[2].charging_point_id,
            emob.charging_processes[4].charging_point_id
        );
    }

    #[test]
    fn same_seed_same_allocation() {
        let topo = synthetic::example_topology();
        let mut a = electromobility();
        let mut b = electromobility();
        for emob in [&mut a, &mut b] {
            distribute_charging_demand(emob, &topo, DistributionMode::GridFriendly, 7, &Default::default())
                .unwrap();
        }
        assert_eq!(a.charging_processes, b.charging_processes);
    }

    #[test]
    fn parks_without_weight_leave_processes_unallocated() {
        let topo = synthetic::example_topology();
        let mut emob = electromobility();
        for park in &mut emob.potential_charging_parks {
            if park.use_case == UseCase::Hpc {
                park.user_centric_weight = 0.0;
            }
        }
        distribute_charging_demand(&mut emob, &topo, DistributionMode::UserFriendly, 3, &Default::default())
            .unwrap();
        let hpc = emob
            .charging_processes
            .iter()
            .find(|p| p.use_case == UseCase::Hpc)
            .unwrap();
        assert!(hpc.charging_park_id.is_none());
    }

    #[test]
    fn grid_centric_weight_of_example_grid() {
        let topo = synthetic::example_topology();
        // LV grid 2: 630 kVA, 0.05 MW load, 0.02 MW solar
        let w = grid_centric_weight(&topo, 2);
        assert!((w - (0.63 - 0.05 + 0.02) / 0.63).abs() < 1e-9);
        assert_eq!(grid_centric_weight(&topo, 99), 0.0);
    }

    #[test]
    fn parks_without_station_are_not_drawn_grid_friendly() {
        let mut topo = synthetic::example_topology();
        for bus in topo.buses.values_mut() {
            bus.x = None;
            bus.y = None;
        }
        let mut emob = electromobility();
        locate_charging_parks(&mut emob, &topo);
        for park in &emob.potential_charging_parks {
            assert_eq!(park.nearest_lv_grid, None);
            assert_eq!(park.grid_centric_weight, 0.0);
        }

        distribute_charging_demand(&mut emob, &topo, DistributionMode::GridFriendly, 5, &Default::default())
            .unwrap();
        assert!(emob.charging_processes.iter().all(|p| p.charging_park_id.is_none()));

        // user friendly drawing does not depend on the grid
        distribute_charging_demand(&mut emob, &topo, DistributionMode::UserFriendly, 5, &Default::default())
            .unwrap();
        assert!(emob.charging_processes.iter().all(|p| p.charging_park_id.is_some()));
    }
}
