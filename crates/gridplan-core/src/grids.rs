//! Views on the MV grid and the LV grids of a topology.

use crate::components::{Bus, Generator, Line, Load, StorageUnit, SwitchRecord, Transformer};
use crate::topology::Topology;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridKind {
    Mv,
    Lv,
}

/// Reference to an LV grid by id or by representation (`"LVGrid_3"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridRef {
    Id(u32),
    Name(String),
}

impl From<u32> for GridRef {
    fn from(id: u32) -> Self {
        GridRef::Id(id)
    }
}

impl From<&str> for GridRef {
    fn from(name: &str) -> Self {
        GridRef::Name(name.to_string())
    }
}

/// Borrowed view of one grid. All accessors filter the topology tables.
#[derive(Clone, Copy)]
pub struct Grid<'a> {
    topology: &'a Topology,
    pub kind: GridKind,
    pub id: u32,
}

impl<'a> Grid<'a> {
    pub fn new(topology: &'a Topology, kind: GridKind, id: u32) -> Self {
        Self { topology, kind, id }
    }

    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    pub fn contains_bus(&self, bus: &str) -> bool {
        self.topology
            .buses
            .get(bus)
            .map_or(false, |b| self.owns(b))
    }

    fn owns(&self, bus: &Bus) -> bool {
        match self.kind {
            GridKind::Mv => bus.lv_grid_id.is_none(),
            GridKind::Lv => bus.lv_grid_id == Some(self.id),
        }
    }

    pub fn buses(&self) -> Vec<&'a Bus> {
        self.topology.buses.values().filter(|b| self.owns(b)).collect()
    }

    pub fn bus_names(&self) -> BTreeSet<&'a str> {
        self.topology
            .buses
            .values()
            .filter(|b| self.owns(b))
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Lines with both terminals in the grid.
    pub fn lines(&self) -> Vec<&'a Line> {
        self.topology
            .lines
            .values()
            .filter(|l| self.contains_bus(&l.bus0) && self.contains_bus(&l.bus1))
            .collect()
    }

    pub fn loads(&self) -> Vec<&'a Load> {
        self.topology
            .loads
            .values()
            .filter(|l| self.contains_bus(&l.bus))
            .collect()
    }

    pub fn generators(&self) -> Vec<&'a Generator> {
        self.topology
            .generators
            .values()
            .filter(|g| self.contains_bus(&g.bus))
            .collect()
    }

    pub fn storage_units(&self) -> Vec<&'a StorageUnit> {
        self.topology
            .storage_units
            .values()
            .filter(|s| self.contains_bus(&s.bus))
            .collect()
    }

    /// HV/MV transformers for the MV grid, station transformers for LV grids.
    pub fn transformers(&self) -> Vec<&'a Transformer> {
        match self.kind {
            GridKind::Mv => self.topology.transformers_hvmv.values().collect(),
            GridKind::Lv => self
                .topology
                .transformers
                .values()
                .filter(|t| self.contains_bus(&t.bus1))
                .collect(),
        }
    }

    pub fn switch_disconnectors(&self) -> Vec<&'a SwitchRecord> {
        self.topology
            .switches
            .values()
            .filter(|s| self.contains_bus(&s.bus_closed))
            .collect()
    }

    /// Secondary side bus of the grid's station.
    pub fn station_bus(&self) -> Option<&'a str> {
        match self.kind {
            GridKind::Mv => self.topology.mv_station_bus(),
            GridKind::Lv => self.topology.lv_station_bus(self.id),
        }
    }

    /// Nominal voltage in kV.
    pub fn nominal_voltage(&self) -> f64 {
        let station = self
            .station_bus()
            .and_then(|b| self.topology.buses.get(b))
            .map(|b| b.v_nom);
        match (station, self.kind) {
            (Some(v), _) => v,
            (None, GridKind::Lv) => 0.4,
            (None, GridKind::Mv) => self
                .buses()
                .iter()
                .map(|b| b.v_nom)
                .fold(0.0, f64::max),
        }
    }

    pub fn weather_cells(&self) -> Vec<u64> {
        let cells: BTreeSet<u64> = self
            .generators()
            .iter()
            .filter_map(|g| g.weather_cell_id)
            .collect();
        cells.into_iter().collect()
    }

    /// Installed generation capacity in MW.
    pub fn peak_generation_capacity(&self) -> f64 {
        self.generators().iter().map(|g| g.p_nom).sum()
    }

    pub fn peak_generation_capacity_per_technology(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for g in self.generators() {
            *out.entry(g.kind.clone()).or_insert(0.0) += g.p_nom;
        }
        out
    }

    /// Peak load in MW.
    pub fn p_set(&self) -> f64 {
        self.loads().iter().map(|l| l.p_set).sum()
    }

    pub fn p_set_per_sector(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for l in self.loads() {
            let sector = l.sector.clone().unwrap_or_else(|| "other".to_string());
            *out.entry(sector).or_insert(0.0) += l.p_set;
        }
        out
    }
}

impl fmt::Display for Grid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            GridKind::Mv => write!(f, "MVGrid_{}", self.id),
            GridKind::Lv => write!(f, "LVGrid_{}", self.id),
        }
    }
}

impl fmt::Debug for Grid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn mv_grid_contents() {
        let topo = synthetic::example_topology();
        let mv = topo.mv_grid();
        assert_eq!(mv.to_string(), "MVGrid_1");
        assert_eq!(mv.nominal_voltage(), 20.0);
        assert_eq!(mv.station_bus(), Some("Bus_MVStation_1"));
        assert_eq!(mv.transformers().len(), 1);
        assert_eq!(mv.switch_disconnectors().len(), 1);
        assert!(mv.lines().iter().all(|l| l.name.starts_with("Line_1000")));
        assert!((mv.peak_generation_capacity() - 1.5).abs() < 1e-9);
        assert_eq!(mv.weather_cells(), vec![1122075]);
    }

    #[test]
    fn lv_grid_contents() {
        let topo = synthetic::example_topology();
        let lv = topo.get_lv_grid(&GridRef::Id(2)).unwrap();
        assert_eq!(lv.to_string(), "LVGrid_2");
        assert_eq!(lv.nominal_voltage(), 0.4);
        assert_eq!(lv.station_bus(), Some("BusBar_LVGrid_2_LV"));
        assert_eq!(lv.transformers().len(), 1);
        assert_eq!(lv.loads().len(), 4);

        let per_sector = lv.p_set_per_sector();
        assert!((per_sector["residential"] - 0.03).abs() < 1e-9);
        assert!((per_sector["cts"] - 0.02).abs() < 1e-9);
        assert!((lv.p_set() - 0.05).abs() < 1e-9);

        let per_tech = lv.peak_generation_capacity_per_technology();
        assert!((per_tech["solar"] - 0.02).abs() < 1e-9);
    }
}
