//! Storage integration and simple storage operation.

use gridplan_core::topology::connect::select_cable;
use gridplan_core::{Config, Control, GridError, GridResult, LineParams, Topology, VoltageLevel};
use gridplan_ts::{ComponentTable, TimeSeries};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Cable length between the station busbar and a new storage unit in km.
const STORAGE_CABLE_LENGTH: f64 = 0.001;

/// Where new storage units are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePosition {
    HvMvSubstationBusbar,
}

impl FromStr for StoragePosition {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hvmv_substation_busbar" => Ok(StoragePosition::HvMvSubstationBusbar),
            other => Err(GridError::Validation(format!(
                "{} is not a valid storage positioning mode",
                other
            ))),
        }
    }
}

impl fmt::Display for StoragePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoragePosition::HvMvSubstationBusbar => f.write_str("hvmv_substation_busbar"),
        }
    }
}

/// Add a storage unit at `position` and return its name.
pub fn integrate_storage(
    topology: &mut Topology,
    position: StoragePosition,
    p_nom: f64,
    max_hours: f64,
    config: &Config,
) -> GridResult<String> {
    match position {
        StoragePosition::HvMvSubstationBusbar => {
            integrate_storage_at_station(topology, p_nom, max_hours, config)
        }
    }
}

/// Add a storage unit next to the HV/MV substation.
///
/// The storage gets its own bus, connected to the station busbar by a 1 m
/// cable sized for `p_nom`.
pub fn integrate_storage_at_station(
    topology: &mut Topology,
    p_nom: f64,
    max_hours: f64,
    config: &Config,
) -> GridResult<String> {
    let station = topology
        .mv_station_bus()
        .map(str::to_string)
        .ok_or_else(|| GridError::Topology("MV grid has no HV/MV station.".to_string()))?;
    let (v_nom, x, y) = {
        let bus = topology
            .buses
            .get(&station)
            .ok_or_else(|| GridError::NotFound(format!("Bus {} not in Topology.", station)))?;
        (bus.v_nom, bus.x, bus.y)
    };

    let (cable, num_parallel) = select_cable(
        &topology.equipment,
        VoltageLevel::Mv,
        v_nom,
        p_nom,
        STORAGE_CABLE_LENGTH,
        config.grid_connection.max_connection_voltage_deviation_mv,
    )?;
    let bus = topology.add_bus(
        &format!("Bus_storage_{}", station),
        v_nom,
        None,
        x,
        y,
    )?;
    topology.add_line(
        &station,
        &bus,
        STORAGE_CABLE_LENGTH,
        LineParams::of_type(cable.name.clone()).with_num_parallel(num_parallel),
    )?;
    let name = topology.add_storage_unit(&bus, p_nom, Control::PQ, max_hours)?;
    info!(storage = %name, p_nom, cable = %cable.name, num_parallel, "integrated storage unit");
    Ok(name)
}

/// Operate `storage` by the 50 % rule: charge at full power while the
/// generation in the grid exceeds half of its installed capacity, discharge
/// at full power otherwise. Reactive power is zero.
pub fn fifty_fifty_operation(
    topology: &Topology,
    timeseries: &mut TimeSeries,
    storage: &str,
) -> GridResult<()> {
    let unit = topology
        .storage_units
        .get(storage)
        .ok_or_else(|| GridError::NotFound(format!("Storage unit {} not in Topology.", storage)))?;
    let capacity: f64 = topology.generators.values().map(|g| g.p_nom).sum();
    let generation = timeseries.generators_active_power.sum_rows();
    let n = timeseries.timeindex.len();
    let active: Vec<f64> = (0..n)
        .map(|row| {
            let feed_in = generation.get(row).copied().unwrap_or(0.0);
            if feed_in > 0.5 * capacity {
                -unit.p_nom
            } else {
                unit.p_nom
            }
        })
        .collect();
    timeseries.add_component_time_series(
        ComponentTable::StorageUnits,
        storage,
        active,
        Some(vec![0.0; n]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_core::{synthetic, Case};

    #[test]
    fn storage_at_station() {
        let mut topo = synthetic::example_topology();
        let config = Config::default();
        let name = integrate_storage(
            &mut topo,
            "hvmv_substation_busbar".parse().unwrap(),
            2.0,
            4.0,
            &config,
        )
        .unwrap();
        let unit = &topo.storage_units[&name];
        assert_eq!(unit.p_nom, 2.0);
        assert_eq!(unit.max_hours, 4.0);
        let lines = topo.get_connected_lines_from_bus(&unit.bus);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].connects("Bus_MVStation_1"));
        assert!((lines[0].length - 0.001).abs() < 1e-12);
        assert_eq!(topo.bus_grid(&unit.bus).unwrap().to_string(), "MVGrid_1");
    }

    #[test]
    fn unknown_position_is_rejected() {
        let err = "distribute".parse::<StoragePosition>().unwrap_err();
        assert!(err
            .to_string()
            .contains("distribute is not a valid storage positioning mode"));
    }

    #[test]
    fn fifty_fifty_follows_generation() {
        let mut topo = synthetic::example_topology();
        let config = Config::default();
        let name = integrate_storage_at_station(&mut topo, 1.0, 2.0, &config).unwrap();
        let mut ts = TimeSeries::new();
        ts.set_worst_case(&topo, &config, &[Case::LoadCase, Case::FeedInCase])
            .unwrap();
        fifty_fifty_operation(&topo, &mut ts, &name).unwrap();

        let cases = ts.timesteps_load_feedin_case();
        let p = ts.storage_units_active_power.column(&name).unwrap().to_vec();
        for (row, step) in ts.timeindex.iter().enumerate() {
            match cases[step] {
                Case::FeedInCase => assert_eq!(p[row], -1.0),
                Case::LoadCase => assert_eq!(p[row], 1.0),
            }
        }
        assert!(fifty_fifty_operation(&topo, &mut ts, "StorageUnit_missing").is_err());
    }
}
