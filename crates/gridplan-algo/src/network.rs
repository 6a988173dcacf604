//! Power flow network assembled from a topology.
//!
//! Electrical parameters are converted to per unit on a 1 MVA base and the
//! nominal voltage of each branch's first bus. Depending on the
//! [`AnalyzeMode`] LV grids are modelled in detail or aggregated at their
//! station.

use gridplan_core::{GridError, GridResult, Topology};
use gridplan_ts::TimeSeries;
use num_complex::Complex64;
use petgraph::graph::UnGraph;
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Which part of the grid is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzeMode {
    /// MV grid; LV grids are aggregated at the MV side of their station
    Mv,
    /// MV grid and station transformers; LV grids are aggregated at the LV
    /// side of their station
    MvLv,
    /// A single LV grid, slack at its station's secondary side
    Lv(u32),
    /// MV and all LV grids
    #[default]
    Full,
}

impl fmt::Display for AnalyzeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzeMode::Mv => write!(f, "mv"),
            AnalyzeMode::MvLv => write!(f, "mvlv"),
            AnalyzeMode::Lv(id) => write!(f, "lv_{}", id),
            AnalyzeMode::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for AnalyzeMode {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mv" => Ok(AnalyzeMode::Mv),
            "mvlv" => Ok(AnalyzeMode::MvLv),
            "full" => Ok(AnalyzeMode::Full),
            other => other
                .strip_prefix("lv_")
                .or_else(|| other.strip_prefix("lvgrid_"))
                .and_then(|id| id.parse().ok())
                .map(AnalyzeMode::Lv)
                .ok_or_else(|| {
                    GridError::Validation(format!(
                        "Invalid analysis mode '{}'. Use mv, mvlv, lv_<id> or full.",
                        s
                    ))
                }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    Line,
    Transformer,
}

#[derive(Debug, Clone)]
pub struct PfBus {
    pub name: String,
    /// Nominal voltage in kV
    pub v_nom: f64,
}

#[derive(Debug, Clone)]
pub struct PfBranch {
    pub name: String,
    pub kind: BranchKind,
    pub from: usize,
    pub to: usize,
    /// Series admittance in p.u.
    pub y_series: Complex64,
    /// Total shunt susceptance in p.u.
    pub b_shunt: f64,
}

/// Net injections per network bus in MW / Mvar (generation positive).
#[derive(Debug, Clone, PartialEq)]
pub struct Injections {
    pub p: Vec<f64>,
    pub q: Vec<f64>,
}

impl Injections {
    pub fn zeros(n: usize) -> Self {
        Self {
            p: vec![0.0; n],
            q: vec![0.0; n],
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            p: self.p.iter().map(|v| v * factor).collect(),
            q: self.q.iter().map(|v| v * factor).collect(),
        }
    }
}

/// Bus-branch model used by the power flow.
#[derive(Debug, Clone)]
pub struct PfNetwork {
    pub mode: AnalyzeMode,
    pub buses: Vec<PfBus>,
    pub branches: Vec<PfBranch>,
    pub slack: usize,
    /// Slack voltage magnitude in p.u.
    pub slack_voltage: f64,
    pub base_mva: f64,
    index: HashMap<String, usize>,
    /// Topology buses whose components are attached to another network bus
    aggregated: HashMap<String, usize>,
    /// Non-zero admittance matrix entries per row
    pub(crate) y_bus: Vec<Vec<(usize, Complex64)>>,
}

const MIN_IMPEDANCE_PU: f64 = 1e-6;

impl PfNetwork {
    /// Assemble the network for `mode`.
    ///
    /// Buses without a connection to the slack bus are left out with a
    /// warning; injections at these buses are ignored.
    pub fn build(topology: &Topology, mode: AnalyzeMode, slack_voltage: f64) -> GridResult<Self> {
        let slack_bus = match mode {
            AnalyzeMode::Lv(id) => topology.lv_station_bus(id).ok_or_else(|| {
                GridError::PowerFlow(format!("LV grid {} has no station.", id))
            })?,
            _ => topology.mv_station_bus().ok_or_else(|| {
                GridError::PowerFlow("Topology has no HV/MV station.".to_string())
            })?,
        };

        let lv_station_buses: Vec<&str> = topology
            .lv_grid_ids()
            .into_iter()
            .filter_map(|id| topology.lv_station_bus(id))
            .collect();
        let included = |name: &str| -> bool {
            let Some(bus) = topology.buses.get(name) else {
                return false;
            };
            match mode {
                AnalyzeMode::Full => true,
                AnalyzeMode::Mv => bus.lv_grid_id.is_none(),
                AnalyzeMode::MvLv => {
                    bus.lv_grid_id.is_none() || lv_station_buses.contains(&name)
                }
                AnalyzeMode::Lv(id) => bus.lv_grid_id == Some(id),
            }
        };

        // candidate buses and branches
        let candidates: Vec<&str> = topology
            .buses
            .keys()
            .map(String::as_str)
            .filter(|b| included(b))
            .collect();
        let mut graph: UnGraph<&str, ()> = UnGraph::new_undirected();
        let nodes: HashMap<&str, _> = candidates.iter().map(|b| (*b, graph.add_node(*b))).collect();

        let mut branch_specs: Vec<(&str, BranchKind, &str, &str)> = Vec::new();
        for line in topology.lines.values() {
            if included(&line.bus0) && included(&line.bus1) {
                branch_specs.push((
                    line.name.as_str(),
                    BranchKind::Line,
                    line.bus0.as_str(),
                    line.bus1.as_str(),
                ));
            }
        }
        if !matches!(mode, AnalyzeMode::Mv | AnalyzeMode::Lv(_)) {
            for trafo in topology.transformers.values() {
                if included(&trafo.bus0) && included(&trafo.bus1) {
                    branch_specs.push((
                        trafo.name.as_str(),
                        BranchKind::Transformer,
                        trafo.bus0.as_str(),
                        trafo.bus1.as_str(),
                    ));
                }
            }
        }
        for (_, _, a, b) in &branch_specs {
            graph.add_edge(nodes[a], nodes[b], ());
        }

        let slack_node = *nodes.get(slack_bus).ok_or_else(|| {
            GridError::PowerFlow(format!("Slack bus {} is not part of the analyzed grid.", slack_bus))
        })?;
        let mut reachable = vec![false; graph.node_count()];
        let mut bfs = Bfs::new(&graph, slack_node);
        while let Some(node) = bfs.next(&graph) {
            reachable[node.index()] = true;
        }
        let unreachable = reachable.iter().filter(|r| !**r).count();
        if unreachable > 0 {
            tracing::warn!(
                buses = unreachable,
                "buses without connection to the slack are excluded from the power flow"
            );
        }

        let mut buses = Vec::new();
        let mut index = HashMap::new();
        for name in &candidates {
            if reachable[nodes[name].index()] {
                index.insert(name.to_string(), buses.len());
                buses.push(PfBus {
                    name: name.to_string(),
                    v_nom: topology.buses[*name].v_nom,
                });
            }
        }

        let base_mva = 1.0;
        let mut branches = Vec::new();
        for (name, kind, bus0, bus1) in branch_specs {
            let (Some(&from), Some(&to)) = (index.get(bus0), index.get(bus1)) else {
                continue;
            };
            let (z, b_shunt) = match kind {
                BranchKind::Line => {
                    let line = &topology.lines[name];
                    let z_base = buses[from].v_nom.powi(2) / base_mva;
                    (Complex64::new(line.r, line.x) / z_base, line.b * z_base)
                }
                BranchKind::Transformer => {
                    let trafo = &topology.transformers[name];
                    let scale = base_mva / trafo.s_nom;
                    (Complex64::new(trafo.r_pu * scale, trafo.x_pu * scale), 0.0)
                }
            };
            let z = if z.norm() < MIN_IMPEDANCE_PU {
                tracing::debug!(branch = name, "impedance below minimum, using minimum");
                Complex64::new(0.0, MIN_IMPEDANCE_PU)
            } else {
                z
            };
            branches.push(PfBranch {
                name: name.to_string(),
                kind,
                from,
                to,
                y_series: z.inv(),
                b_shunt,
            });
        }

        let mut aggregated = HashMap::new();
        if matches!(mode, AnalyzeMode::Mv | AnalyzeMode::MvLv) {
            for id in topology.lv_grid_ids() {
                let target = match mode {
                    AnalyzeMode::Mv => topology.lv_station_primary_bus(id),
                    _ => topology.lv_station_bus(id),
                };
                let Some(&target) = target.and_then(|t| index.get(t)) else {
                    continue;
                };
                for bus in topology.buses.values().filter(|b| b.lv_grid_id == Some(id)) {
                    if !index.contains_key(&bus.name) {
                        aggregated.insert(bus.name.clone(), target);
                    }
                }
            }
        }

        let slack = index[slack_bus];
        let y_bus = admittance(buses.len(), &branches);
        Ok(Self {
            mode,
            buses,
            branches,
            slack,
            slack_voltage,
            base_mva,
            index,
            aggregated,
            y_bus,
        })
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn bus_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Network bus carrying the components of topology bus `name`.
    pub fn component_bus(&self, name: &str) -> Option<usize> {
        self.bus_index(name).or_else(|| self.aggregated.get(name).copied())
    }

    /// Injections of all components at row `row` of the time series.
    pub fn injections(&self, topology: &Topology, timeseries: &TimeSeries, row: usize) -> Injections {
        let mut inj = Injections::zeros(self.bus_count());
        let mut add = |bus: &str, p: f64, q: f64| {
            if let Some(i) = self.component_bus(bus) {
                inj.p[i] += p;
                inj.q[i] += q;
            }
        };
        for load in topology.loads.values() {
            add(
                &load.bus,
                -timeseries.loads_active_power.value(&load.name, row),
                -timeseries.loads_reactive_power.value(&load.name, row),
            );
        }
        for generator in topology.generators.values() {
            add(
                &generator.bus,
                timeseries.generators_active_power.value(&generator.name, row),
                timeseries.generators_reactive_power.value(&generator.name, row),
            );
        }
        for unit in topology.storage_units.values() {
            add(
                &unit.bus,
                timeseries.storage_units_active_power.value(&unit.name, row),
                timeseries.storage_units_reactive_power.value(&unit.name, row),
            );
        }
        inj
    }

    /// Branches grouped by name, for lookups from results.
    pub fn branch_names(&self) -> BTreeMap<&str, usize> {
        self.branches
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect()
    }
}

fn admittance(n: usize, branches: &[PfBranch]) -> Vec<Vec<(usize, Complex64)>> {
    let mut rows: Vec<BTreeMap<usize, Complex64>> = vec![BTreeMap::new(); n];
    for branch in branches {
        let (i, j) = (branch.from, branch.to);
        let shunt = Complex64::new(0.0, branch.b_shunt / 2.0);
        *rows[i].entry(i).or_default() += branch.y_series + shunt;
        *rows[j].entry(j).or_default() += branch.y_series + shunt;
        *rows[i].entry(j).or_default() -= branch.y_series;
        *rows[j].entry(i).or_default() -= branch.y_series;
    }
    rows.into_iter().map(|r| r.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_core::synthetic;

    #[test]
    fn full_network_contains_all_connected_buses() {
        let topo = synthetic::example_topology();
        let net = PfNetwork::build(&topo, AnalyzeMode::Full, 1.0).unwrap();
        assert_eq!(net.bus_count(), topo.buses.len());
        assert_eq!(net.branches.len(), topo.lines.len() + topo.transformers.len());
        assert_eq!(net.buses[net.slack].name, "Bus_MVStation_1");
    }

    #[test]
    fn mv_mode_aggregates_lv_grids() {
        let topo = synthetic::example_topology();
        let net = PfNetwork::build(&topo, AnalyzeMode::Mv, 1.0).unwrap();
        assert!(net.bus_index("BusBar_LVGrid_1_LV").is_none());
        assert_eq!(
            net.component_bus("Bus_LVGrid_1_building_1"),
            net.bus_index("BusBar_LVGrid_1_MV")
        );
        assert!(net.branches.iter().all(|b| b.kind == BranchKind::Line));
    }

    #[test]
    fn mvlv_mode_keeps_station_transformers() {
        let topo = synthetic::example_topology();
        let net = PfNetwork::build(&topo, AnalyzeMode::MvLv, 1.0).unwrap();
        assert_eq!(
            net.component_bus("Bus_LVGrid_2_building_2"),
            net.bus_index("BusBar_LVGrid_2_LV")
        );
        let trafos = net
            .branches
            .iter()
            .filter(|b| b.kind == BranchKind::Transformer)
            .count();
        assert_eq!(trafos, 3);
    }

    #[test]
    fn lv_mode_uses_station_as_slack() {
        let topo = synthetic::example_topology();
        let net = PfNetwork::build(&topo, AnalyzeMode::Lv(2), 1.0).unwrap();
        assert_eq!(net.buses[net.slack].name, "BusBar_LVGrid_2_LV");
        assert!(net.component_bus("Bus_LVGrid_1_building_1").is_none());
        assert!(PfNetwork::build(&topo, AnalyzeMode::Lv(9), 1.0).is_err());
    }

    #[test]
    fn disconnected_buses_are_excluded() {
        let mut topo = synthetic::example_topology();
        topo.add_bus("Bus_lonely", 20.0, None, None, None).unwrap();
        let net = PfNetwork::build(&topo, AnalyzeMode::Full, 1.0).unwrap();
        assert!(net.bus_index("Bus_lonely").is_none());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("mv".parse::<AnalyzeMode>().unwrap(), AnalyzeMode::Mv);
        assert_eq!("lv_3".parse::<AnalyzeMode>().unwrap(), AnalyzeMode::Lv(3));
        assert!("hv".parse::<AnalyzeMode>().is_err());
        assert_eq!(AnalyzeMode::Lv(3).to_string(), "lv_3");
    }
}
