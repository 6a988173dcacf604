//! Grid topology: component tables and queries over them.
//!
//! Editing operations live in [`edit`], connection of new components in
//! [`connect`] and integrity checks in [`integrity`].

pub mod connect;
pub mod edit;
pub mod integrity;

use crate::components::{
    Bus, Generator, GridDistrict, Line, Load, StorageUnit, SwitchRecord, Transformer, VoltageLevel,
};
use crate::equipment::EquipmentData;
use crate::grids::{Grid, GridKind, GridRef};
use crate::switch::{Switch, SwitchState};
use crate::error::{GridError, GridResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub use connect::{ComponentSpec, ConnectionRequest};
pub use edit::{first_free, LineParams};

/// MV grid with its underlying LV grids.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub buses: BTreeMap<String, Bus>,
    pub lines: BTreeMap<String, Line>,
    /// MV/LV station transformers
    pub transformers: BTreeMap<String, Transformer>,
    /// HV/MV station transformers
    pub transformers_hvmv: BTreeMap<String, Transformer>,
    pub loads: BTreeMap<String, Load>,
    pub generators: BTreeMap<String, Generator>,
    pub storage_units: BTreeMap<String, StorageUnit>,
    pub switches: BTreeMap<String, SwitchRecord>,
    pub grid_district: GridDistrict,
    pub mv_grid_id: u32,
    pub equipment: EquipmentData,
}

/// Names of all elements attached to one bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectedComponents {
    pub loads: Vec<String>,
    pub generators: Vec<String>,
    pub storage_units: Vec<String>,
    pub lines: Vec<String>,
    pub transformers: Vec<String>,
    pub transformers_hvmv: Vec<String>,
    pub switches: Vec<String>,
}

impl ConnectedComponents {
    /// Number of loads, generators and storage units.
    pub fn component_count(&self) -> usize {
        self.loads.len() + self.generators.len() + self.storage_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_count() == 0
            && self.lines.is_empty()
            && self.transformers.is_empty()
            && self.transformers_hvmv.is_empty()
            && self.switches.is_empty()
    }
}

impl Topology {
    pub fn new(mv_grid_id: u32) -> Self {
        Self {
            mv_grid_id,
            ..Self::default()
        }
    }

    pub fn mv_grid(&self) -> Grid<'_> {
        Grid::new(self, GridKind::Mv, self.mv_grid_id)
    }

    /// Sorted ids of all LV grids.
    pub fn lv_grid_ids(&self) -> Vec<u32> {
        let ids: BTreeSet<u32> = self.buses.values().filter_map(|b| b.lv_grid_id).collect();
        ids.into_iter().collect()
    }

    pub fn lv_grids(&self) -> impl Iterator<Item = Grid<'_>> + '_ {
        self.lv_grid_ids()
            .into_iter()
            .map(move |id| Grid::new(self, GridKind::Lv, id))
    }

    /// LV grid by id or by its representation (`"LVGrid_3"`).
    pub fn get_lv_grid(&self, grid: &GridRef) -> Option<Grid<'_>> {
        let id = match grid {
            GridRef::Id(id) => *id,
            GridRef::Name(name) => {
                let parsed = name
                    .strip_prefix("LVGrid_")
                    .unwrap_or(name)
                    .parse::<u32>();
                match parsed {
                    Ok(id) => id,
                    Err(_) => {
                        tracing::warn!("`grid` must be integer or string.");
                        return None;
                    }
                }
            }
        };
        self.buses
            .values()
            .any(|b| b.lv_grid_id == Some(id))
            .then(|| Grid::new(self, GridKind::Lv, id))
    }

    /// Representation of all grids, MV grid first.
    pub fn grids_repr(&self) -> Vec<String> {
        std::iter::once(self.mv_grid().to_string())
            .chain(self.lv_grids().map(|g| g.to_string()))
            .collect()
    }

    /// Grid the bus belongs to.
    pub fn bus_grid(&self, bus: &str) -> Option<Grid<'_>> {
        let bus = self.buses.get(bus)?;
        Some(match bus.lv_grid_id {
            Some(id) => Grid::new(self, GridKind::Lv, id),
            None => self.mv_grid(),
        })
    }

    pub(crate) fn require_bus(&self, bus: &str) -> GridResult<&Bus> {
        self.buses.get(bus).ok_or_else(|| {
            GridError::Topology(format!(
                "Specified bus {} is not valid as it is not defined in buses_df.",
                bus
            ))
        })
    }

    /// MV side bus of the HV/MV station.
    pub fn mv_station_bus(&self) -> Option<&str> {
        self.transformers_hvmv.values().next().map(|t| t.bus1.as_str())
    }

    /// LV side bus of the MV/LV station of LV grid `lv_grid_id`.
    pub fn lv_station_bus(&self, lv_grid_id: u32) -> Option<&str> {
        self.transformers
            .values()
            .find(|t| {
                self.buses
                    .get(&t.bus1)
                    .map_or(false, |b| b.lv_grid_id == Some(lv_grid_id))
            })
            .map(|t| t.bus1.as_str())
    }

    /// MV side bus of the MV/LV station of LV grid `lv_grid_id`.
    pub fn lv_station_primary_bus(&self, lv_grid_id: u32) -> Option<&str> {
        self.transformers
            .values()
            .find(|t| {
                self.buses
                    .get(&t.bus1)
                    .map_or(false, |b| b.lv_grid_id == Some(lv_grid_id))
            })
            .map(|t| t.bus0.as_str())
    }

    /// True if the bus is the secondary side of an MV/LV or HV/MV station.
    pub fn is_station_bus(&self, bus: &str) -> bool {
        self.transformers.values().any(|t| t.bus1 == bus)
            || self.transformers_hvmv.values().any(|t| t.bus1 == bus)
    }

    pub fn voltage_level(&self, bus: &str) -> Option<VoltageLevel> {
        self.buses.get(bus).map(|b| b.voltage_level())
    }

    pub fn get_connected_lines_from_bus(&self, bus: &str) -> Vec<&Line> {
        self.lines.values().filter(|l| l.connects(bus)).collect()
    }

    pub fn get_connected_components_from_bus(&self, bus: &str) -> ConnectedComponents {
        fn names<'a, T: 'a>(
            table: impl Iterator<Item = (&'a String, &'a T)>,
            pred: impl Fn(&T) -> bool,
        ) -> Vec<String> {
            table.filter(|(_, v)| pred(v)).map(|(k, _)| k.clone()).collect()
        }

        ConnectedComponents {
            loads: names(self.loads.iter(), |l| l.bus == bus),
            generators: names(self.generators.iter(), |g| g.bus == bus),
            storage_units: names(self.storage_units.iter(), |s| s.bus == bus),
            lines: names(self.lines.iter(), |l| l.connects(bus)),
            transformers: names(self.transformers.iter(), |t| t.bus0 == bus || t.bus1 == bus),
            transformers_hvmv: names(self.transformers_hvmv.iter(), |t| {
                t.bus0 == bus || t.bus1 == bus
            }),
            switches: names(self.switches.iter(), |s| {
                s.bus_open == bus || s.bus_closed == bus
            }),
        }
    }

    /// Buses directly connected to `bus` through a line.
    pub fn get_neighbours(&self, bus: &str) -> BTreeSet<String> {
        self.lines
            .values()
            .filter_map(|l| l.other_bus(bus))
            .map(str::to_string)
            .collect()
    }

    /// Lines that represent a switch.
    pub(crate) fn switch_branches(&self) -> BTreeSet<&str> {
        self.switches.values().map(|s| s.branch.as_str()).collect()
    }

    pub fn switch(&self, name: &str) -> GridResult<Switch<'_>> {
        let record = self
            .switches
            .get(name)
            .ok_or_else(|| GridError::NotFound(format!("Switch {} not in Topology.", name)))?;
        Ok(Switch::new(self, record))
    }

    pub fn switch_state(&self, name: &str) -> GridResult<SwitchState> {
        self.switch(name)?.state()
    }

    pub fn open_switch(&mut self, name: &str) -> GridResult<()> {
        crate::switch::set_state(self, name, SwitchState::Open)
    }

    pub fn close_switch(&mut self, name: &str) -> GridResult<()> {
        crate::switch::set_state(self, name, SwitchState::Closed)
    }

    /// Orient every line so that `bus0` is the terminal closer to the HV/MV
    /// station (by number of hops).
    pub fn sort_buses(&mut self) {
        let Some(station) = self.mv_station_bus().map(str::to_string) else {
            tracing::warn!("No HV/MV station in topology, lines are not sorted.");
            return;
        };
        let graph = crate::graph_utils::TopologyGraph::from_topology(self);
        let hops = graph.hop_distances(&station);

        for line in self.lines.values_mut() {
            let d0 = hops.get(&line.bus0).copied().unwrap_or(usize::MAX);
            let d1 = hops.get(&line.bus1).copied().unwrap_or(usize::MAX);
            if d1 < d0 {
                std::mem::swap(&mut line.bus0, &mut line.bus1);
            }
        }
    }

    /// Fundamental cycles of the MV grid passing through the HV/MV station,
    /// with every switch treated as closed.
    pub fn rings(&self) -> Vec<Vec<String>> {
        let Some(station) = self.mv_station_bus() else {
            return Vec::new();
        };
        let graph = crate::graph_utils::TopologyGraph::mv_closed(self);
        graph
            .cycle_basis(station)
            .into_iter()
            .filter(|cycle| cycle.iter().any(|b| b == station))
            .collect()
    }

    pub fn to_graph(&self) -> crate::graph_utils::TopologyGraph {
        crate::graph_utils::TopologyGraph::from_topology(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn grid_views() {
        let topo = synthetic::example_topology();
        assert_eq!(topo.lv_grid_ids(), vec![1, 2, 3]);
        assert_eq!(
            topo.grids_repr(),
            vec!["MVGrid_1", "LVGrid_1", "LVGrid_2", "LVGrid_3"]
        );
        assert!(topo.get_lv_grid(&GridRef::Id(2)).is_some());
        assert!(topo.get_lv_grid(&GridRef::Name("LVGrid_3".into())).is_some());
        assert!(topo.get_lv_grid(&GridRef::Name("grid".into())).is_none());
        assert!(topo.get_lv_grid(&GridRef::Id(17)).is_none());
    }

    #[test]
    fn station_buses() {
        let topo = synthetic::example_topology();
        assert_eq!(topo.mv_station_bus(), Some("Bus_MVStation_1"));
        assert_eq!(topo.lv_station_bus(1), Some("BusBar_LVGrid_1_LV"));
        assert_eq!(topo.lv_station_primary_bus(1), Some("BusBar_LVGrid_1_MV"));
        assert!(topo.is_station_bus("BusBar_LVGrid_2_LV"));
    }

    #[test]
    fn connected_components() {
        let topo = synthetic::example_topology();
        let connected = topo.get_connected_components_from_bus("BusBar_LVGrid_1_MV");
        assert_eq!(connected.transformers, vec!["LVStation_1_transformer_1"]);
        assert_eq!(connected.lines.len(), 2);
        assert_eq!(connected.component_count(), 0);

        let neighbours = topo.get_neighbours("BranchTee_LVGrid_1_1");
        assert!(neighbours.contains("BusBar_LVGrid_1_LV"));
        assert!(neighbours.contains("BranchTee_LVGrid_1_2"));
    }

    #[test]
    fn sort_buses_orients_lines_from_station() {
        let mut topo = synthetic::example_topology();
        let line = topo.lines.get_mut("Line_10002").unwrap();
        std::mem::swap(&mut line.bus0, &mut line.bus1);

        topo.sort_buses();

        let line = &topo.lines["Line_10002"];
        assert_eq!(line.bus0, "BusBar_LVGrid_1_MV");
        assert_eq!(line.bus1, "BranchTee_MVGrid_1_1");
    }

    #[test]
    fn ring_through_station() {
        let topo = synthetic::example_topology();
        let rings = topo.rings();
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert!(ring.contains(&"Bus_MVStation_1".to_string()));
        assert!(ring.contains(&"BranchTee_MVGrid_1_2".to_string()));
        assert!(!ring.iter().any(|b| b.starts_with("virtual_")));
    }
}
