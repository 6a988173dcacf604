//! Integration of charging parks into the grid topology.

use crate::data::Electromobility;
use gridplan_core::config::GridConnectionConfig;
use gridplan_core::{ComponentSpec, ConnectionRequest, GridResult, Topology};
use tracing::{debug, info};

/// Connect every charging park that has charging processes and is not yet
/// part of the grid. Each park becomes one charging point load sized at its
/// grid connection capacity. Returns the names of the new loads.
pub fn integrate_charging_parks(
    emob: &mut Electromobility,
    topology: &mut Topology,
    config: &GridConnectionConfig,
) -> GridResult<Vec<String>> {
    let used: Vec<u64> = emob
        .potential_charging_parks
        .iter()
        .filter(|p| !emob.integrated_charging_parks.contains_key(&p.id))
        .filter(|p| !emob.processes_of_park(p.id).is_empty())
        .map(|p| p.id)
        .collect();

    let mut added = Vec::with_capacity(used.len());
    for id in used {
        let Some(park) = emob.park(id) else { continue };
        let level = config.voltage_level_for(park.grid_connection_capacity);
        let mut request = ConnectionRequest::new(ComponentSpec::ChargingPoint {
            p_set: park.grid_connection_capacity,
            use_case: park.use_case.as_str().to_string(),
        })
        .at(park.x, park.y)
        .in_voltage_level(level);

        let name = if level >= 6 {
            if let Some(lv_grid) = park.nearest_lv_grid {
                request = request.in_lv_grid(lv_grid);
            }
            topology.connect_to_lv(&request, config)?
        } else {
            topology.connect_to_mv(&request, config)?
        };
        debug!(park = id, load = %name, level, "integrated charging park");
        emob.integrated_charging_parks.insert(id, name.clone());
        added.push(name);
    }
    info!(count = added.len(), "integrated charging parks");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::electromobility;
    use crate::distribute::{distribute_charging_demand, DistributionMode};
    use gridplan_core::components::LoadKind;
    use gridplan_core::synthetic;

    #[test]
    fn parks_become_charging_point_loads() {
        let mut topo = synthetic::example_topology();
        let mut emob = electromobility();
        distribute_charging_demand(&mut emob, &topo, DistributionMode::UserFriendly, 5, &Default::default())
            .unwrap();
        let loads_before = topo.loads.len();

        let added = integrate_charging_parks(&mut emob, &mut topo, &Default::default()).unwrap();

        let used_parks = emob
            .potential_charging_parks
            .iter()
            .filter(|p| !emob.processes_of_park(p.id).is_empty())
            .count();
        assert_eq!(added.len(), used_parks);
        assert_eq!(topo.loads.len(), loads_before + used_parks);
        for name in &added {
            let load = &topo.loads[name];
            assert_eq!(load.kind, LoadKind::ChargingPoint);
            assert!(name.starts_with("Charging_Point_"));
        }

        // the 150 kW hpc park is in voltage level 6
        let hpc_load = &emob.integrated_charging_parks[&3];
        let bus = &topo.loads[hpc_load].bus;
        assert!(topo.is_station_bus(bus));
        assert_eq!(topo.loads[hpc_load].sector.as_deref(), Some("hpc"));
    }

    #[test]
    fn integrated_parks_are_not_connected_twice() {
        let mut topo = synthetic::example_topology();
        let mut emob = electromobility();
        distribute_charging_demand(&mut emob, &topo, DistributionMode::UserFriendly, 5, &Default::default())
            .unwrap();
        integrate_charging_parks(&mut emob, &mut topo, &Default::default()).unwrap();
        let again = integrate_charging_parks(&mut emob, &mut topo, &Default::default()).unwrap();
        assert!(again.is_empty());
    }
}
