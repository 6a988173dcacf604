//! Reinforcement measures.
//!
//! Each measure modifies the topology and returns the equipment changes it
//! made. Iteration steps are filled in by the caller.

use crate::checks::{LineOverload, StationOverload, VoltageIssue};
use crate::results::{ChangeKind, EquipmentChange};
use gridplan_core::topology::first_free;
use gridplan_core::{
    Config, GridError, GridKind, GridResult, Topology, TopologyGraph, TransformerType,
};
use std::collections::BTreeMap;
use tracing::debug;

fn change(name: &str, kind: ChangeKind, equipment: &str, quantity: u32) -> EquipmentChange {
    EquipmentChange {
        name: name.to_string(),
        iteration_step: 0,
        change: kind,
        equipment: equipment.to_string(),
        quantity,
    }
}

fn standard_lv_transformer(topology: &Topology, config: &Config) -> GridResult<TransformerType> {
    let name = &config.grid_expansion_standard_equipment.mv_lv_transformer;
    topology.equipment.lv_transformer(name).cloned().ok_or_else(|| {
        GridError::Config(format!("Standard MV/LV transformer {} not in equipment data.", name))
    })
}

fn standard_mv_transformer(topology: &Topology, config: &Config) -> GridResult<TransformerType> {
    let name = &config.grid_expansion_standard_equipment.hv_mv_transformer;
    topology.equipment.mv_transformer(name).cloned().ok_or_else(|| {
        GridError::Config(format!("Standard HV/MV transformer {} not in equipment data.", name))
    })
}

/// `MVStation_1` from `MVStation_1_transformer_1`.
fn station_prefix(trafo_name: &str) -> &str {
    trafo_name
        .split_once("_transformer")
        .map_or(trafo_name, |(prefix, _)| prefix)
}

/// Catalogue type of an existing transformer, rebuilt from its data.
fn type_of(trafo: &gridplan_core::Transformer) -> TransformerType {
    TransformerType {
        name: trafo
            .type_info
            .clone()
            .unwrap_or_else(|| format!("{} MVA", trafo.s_nom)),
        s_nom: trafo.s_nom,
        u_n_upper: 0.0,
        u_n_lower: 0.0,
        r_pu: trafo.r_pu,
        x_pu: trafo.x_pu,
    }
}

/// Next unused `{prefix}_transformer_reinforced_n` in the station's table.
fn reinforced_name(topology: &Topology, prefix: &str, hvmv: bool) -> String {
    let base = format!("{}_transformer_reinforced", prefix);
    if hvmv {
        first_free(&topology.transformers_hvmv, &base, 1)
    } else {
        first_free(&topology.transformers, &base, 1)
    }
}

/// Extend a station whose transformers lack capacity.
///
/// If one more transformer like the largest existing one covers the missing
/// capacity, it is added. Otherwise all transformers are replaced by as
/// many standard transformers as needed.
fn reinforce_station(
    topology: &mut Topology,
    names: &[String],
    overload: &StationOverload,
    standard: &TransformerType,
    hvmv: bool,
) -> GridResult<Vec<EquipmentChange>> {
    let table = if hvmv {
        &topology.transformers_hvmv
    } else {
        &topology.transformers
    };
    let trafos: Vec<gridplan_core::Transformer> =
        names.iter().filter_map(|n| table.get(n).cloned()).collect();
    let Some(largest) = trafos.iter().max_by(|a, b| a.s_nom.total_cmp(&b.s_nom)).cloned() else {
        return Err(GridError::Reinforcement(format!(
            "Station of {} has no transformers. Building new stations is not supported.",
            overload.grid
        )));
    };
    let s_nom: f64 = trafos.iter().map(|t| t.s_nom).sum();
    let s_needed = s_nom * overload.max_rel_overload;
    let prefix = station_prefix(&largest.name).to_string();
    let mut changes = Vec::new();

    if s_nom + largest.s_nom >= s_needed {
        let ttype = type_of(&largest);
        let name = reinforced_name(topology, &prefix, hvmv);
        let name = topology.add_transformer(
            &name,
            &largest.bus0,
            &largest.bus1,
            &ttype,
            hvmv,
        )?;
        changes.push(change(&name, ChangeKind::Added, &ttype.name, 1));
    } else {
        let count = (s_needed / standard.s_nom).ceil().max(1.0) as usize;
        for trafo in &trafos {
            if hvmv {
                topology.transformers_hvmv.remove(&trafo.name);
            } else {
                topology.transformers.remove(&trafo.name);
            }
            let equipment = trafo.type_info.clone().unwrap_or_default();
            changes.push(change(&trafo.name, ChangeKind::Removed, &equipment, 1));
        }
        for _ in 0..count {
            let name = reinforced_name(topology, &prefix, hvmv);
            let name = topology.add_transformer(
                &name,
                &largest.bus0,
                &largest.bus1,
                standard,
                hvmv,
            )?;
            changes.push(change(&name, ChangeKind::Added, &standard.name, 1));
        }
    }
    debug!(station = %overload.grid, changes = changes.len(), "reinforced station");
    Ok(changes)
}

pub fn reinforce_hv_mv_station_overloading(
    topology: &mut Topology,
    config: &Config,
    overloads: &[StationOverload],
) -> GridResult<Vec<EquipmentChange>> {
    let standard = standard_mv_transformer(topology, config)?;
    let mut changes = Vec::new();
    for overload in overloads {
        let names: Vec<String> = topology.transformers_hvmv.keys().cloned().collect();
        changes.extend(reinforce_station(topology, &names, overload, &standard, true)?);
    }
    Ok(changes)
}

fn lv_station_transformers(topology: &Topology, lv_grid_id: u32) -> Vec<String> {
    topology
        .transformers
        .values()
        .filter(|t| {
            topology
                .buses
                .get(&t.bus1)
                .map_or(false, |b| b.lv_grid_id == Some(lv_grid_id))
        })
        .map(|t| t.name.clone())
        .collect()
}

pub fn reinforce_mv_lv_station_overloading(
    topology: &mut Topology,
    config: &Config,
    overloads: &[StationOverload],
) -> GridResult<Vec<EquipmentChange>> {
    let standard = standard_lv_transformer(topology, config)?;
    let mut changes = Vec::new();
    for overload in overloads {
        let Some(id) = overload.lv_grid_id else {
            continue;
        };
        let names = lv_station_transformers(topology, id);
        changes.extend(reinforce_station(topology, &names, overload, &standard, false)?);
    }
    Ok(changes)
}

/// Add one standard transformer to each station with voltage issues.
pub fn reinforce_mv_lv_station_voltage_issues(
    topology: &mut Topology,
    config: &Config,
    issues: &[VoltageIssue],
) -> GridResult<Vec<EquipmentChange>> {
    let standard = standard_lv_transformer(topology, config)?;
    let mut changes = Vec::new();
    let mut done = Vec::new();
    for issue in issues {
        let Some(id) = issue.lv_grid_id else {
            continue;
        };
        if done.contains(&id) {
            continue;
        }
        done.push(id);
        let names = lv_station_transformers(topology, id);
        let Some(existing) = names.first().and_then(|n| topology.transformers.get(n)).cloned() else {
            return Err(GridError::Reinforcement(format!(
                "Station of LVGrid_{} has no transformers. Building new stations is not supported.",
                id
            )));
        };
        let name = reinforced_name(topology, station_prefix(&existing.name), false);
        let name = topology.add_transformer(
            &name,
            &existing.bus0,
            &existing.bus1,
            &standard,
            false,
        )?;
        changes.push(change(&name, ChangeKind::Added, &standard.name, 1));
    }
    Ok(changes)
}

/// Standard line type for the level and voltage of `bus`.
fn standard_line_type(topology: &Topology, config: &Config, bus: &str) -> GridResult<(String, f64)> {
    let bus = topology
        .buses
        .get(bus)
        .ok_or_else(|| GridError::NotFound(format!("Bus {} not in Topology.", bus)))?;
    let level = bus.voltage_level();
    let name = config
        .grid_expansion_standard_equipment
        .line_type(level, bus.v_nom)
        .to_string();
    let s_nom = topology
        .equipment
        .line_type(&name, level, bus.v_nom)
        .map(|(t, _)| t.s_nom())
        .ok_or_else(|| {
            GridError::Config(format!("Standard line type {} not in equipment data.", name))
        })?;
    Ok((name, s_nom))
}

/// Reinforce overloaded lines.
///
/// Lines of the standard type get as many parallel lines as needed; other
/// lines are replaced by the required number of standard lines.
pub fn reinforce_lines_overloading(
    topology: &mut Topology,
    config: &Config,
    overloads: &[LineOverload],
) -> GridResult<Vec<EquipmentChange>> {
    let mut changes = Vec::new();
    for overload in overloads {
        let Some(line) = topology.lines.get(&overload.name).cloned() else {
            continue;
        };
        let (standard, s_nom_standard) = standard_line_type(topology, config, &line.bus0)?;
        if line.type_info.as_deref() == Some(standard.as_str()) {
            let needed = (overload.max_rel_overload * line.num_parallel as f64).ceil() as u32;
            let needed = needed.max(line.num_parallel + 1);
            topology.update_number_of_parallel_lines(&BTreeMap::from([(line.name.clone(), needed)]))?;
            changes.push(change(&line.name, ChangeKind::Added, &standard, needed - line.num_parallel));
        } else {
            let needed = (overload.max_rel_overload * line.s_nom / s_nom_standard).ceil().max(1.0) as u32;
            topology.change_line_type(&[line.name.clone()], &standard)?;
            if needed > 1 {
                topology.update_number_of_parallel_lines(&BTreeMap::from([(line.name.clone(), needed)]))?;
            }
            changes.push(change(&line.name, ChangeKind::Changed, &standard, needed));
        }
    }
    Ok(changes)
}

/// Reinforce a single line against voltage issues: another parallel line if
/// it is already of the standard type, else a type change.
fn reinforce_single_line(
    topology: &mut Topology,
    config: &Config,
    name: &str,
) -> GridResult<EquipmentChange> {
    let line = topology
        .lines
        .get(name)
        .cloned()
        .ok_or_else(|| GridError::NotFound(format!("Line {} not in Topology.", name)))?;
    let (standard, _) = standard_line_type(topology, config, &line.bus0)?;
    if line.type_info.as_deref() == Some(standard.as_str()) {
        topology.update_number_of_parallel_lines(&BTreeMap::from([(
            line.name.clone(),
            line.num_parallel + 1,
        )]))?;
        Ok(change(name, ChangeKind::Added, &standard, 1))
    } else {
        topology.change_line_type(&[line.name.clone()], &standard)?;
        Ok(change(name, ChangeKind::Changed, &standard, 1))
    }
}

enum VoltageMeasure {
    /// Reinforce the line next to the station
    Reinforce(String),
    /// Reconnect the far end of `line` from `from` to the station
    Reconnect {
        line: String,
        from: String,
        length: f64,
    },
}

/// Reinforce lines against voltage issues in the MV grid (`lv_grid_id` is
/// None) or in one LV grid.
///
/// For every feeder only the node with the largest deviation is handled.
/// The measure acts at the first node beyond two thirds of the path length
/// from the station: if it is directly connected to the station, that line
/// is reinforced; otherwise the line towards its predecessor is reconnected
/// to the station bus with the path length as its length and the standard
/// type.
pub fn reinforce_lines_voltage_issues(
    topology: &mut Topology,
    config: &Config,
    lv_grid_id: Option<u32>,
    crit_nodes: &[VoltageIssue],
) -> GridResult<Vec<EquipmentChange>> {
    let plan = {
        let grid = match lv_grid_id {
            None => topology.mv_grid(),
            Some(id) => gridplan_core::Grid::new(topology, GridKind::Lv, id),
        };
        let station = grid.station_bus().ok_or_else(|| {
            GridError::Reinforcement(format!("{} has no station.", grid))
        })?;
        let graph = TopologyGraph::from_grid(&grid);
        let switch_lines: Vec<&str> = topology.switches.values().map(|s| s.branch.as_str()).collect();

        // worst node per feeder
        let mut per_feeder: BTreeMap<String, (&VoltageIssue, Vec<String>)> = BTreeMap::new();
        for issue in crit_nodes.iter().filter(|i| i.lv_grid_id == lv_grid_id) {
            let Some(path) = graph.shortest_path(station, &issue.bus) else {
                continue;
            };
            let Some(feeder) = path.get(1).cloned() else {
                continue;
            };
            match per_feeder.get(&feeder) {
                Some((worst, _)) if worst.v_diff_max >= issue.v_diff_max => {}
                _ => {
                    per_feeder.insert(feeder, (issue, path));
                }
            }
        }

        let mut measures = Vec::new();
        for (feeder, (issue, path)) in &per_feeder {
            let total = graph.path_length(station, &issue.bus).unwrap_or(0.0);
            let mut idx = (1..path.len())
                .find(|&i| {
                    graph.path_length(station, &path[i]).unwrap_or(0.0) >= total * 2.0 / 3.0
                })
                .unwrap_or(path.len() - 1);
            if grid.kind == GridKind::Lv {
                while idx > 0
                    && topology
                        .buses
                        .get(&path[idx])
                        .map_or(false, |b| b.in_building)
                {
                    idx -= 1;
                }
                if idx == 0 {
                    debug!(feeder = %feeder, "no node outside of buildings on the path");
                    continue;
                }
            }
            let lines = graph.edges_along(&path[..=idx]);
            let Some(last_line) = lines.last().cloned() else {
                continue;
            };
            if idx == 1 || switch_lines.contains(&last_line.as_str()) {
                measures.push(VoltageMeasure::Reinforce(last_line));
            } else {
                measures.push(VoltageMeasure::Reconnect {
                    line: last_line,
                    from: path[idx - 1].clone(),
                    length: graph.path_length(station, &path[idx]).unwrap_or(0.0),
                });
            }
        }
        (station.to_string(), measures)
    };

    let (station, measures) = plan;
    let mut changes = Vec::new();
    for measure in measures {
        match measure {
            VoltageMeasure::Reinforce(line) => {
                changes.push(reinforce_single_line(topology, config, &line)?);
            }
            VoltageMeasure::Reconnect { line, from, length } => {
                let (standard, _) = standard_line_type(topology, config, &station)?;
                if let Some(l) = topology.lines.get_mut(&line) {
                    if l.bus0 == from {
                        l.bus0 = station.clone();
                    } else {
                        l.bus1 = station.clone();
                    }
                    l.length = length;
                }
                topology.change_line_type(&[line.clone()], &standard)?;
                debug!(line = %line, length, "reconnected line to station");
                changes.push(change(&line, ChangeKind::Changed, &standard, 1));
            }
        }
    }
    Ok(changes)
}
