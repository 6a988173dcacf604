//! Costs of grid expansion.

use crate::results::{ChangeKind, EquipmentChange, ExpansionCost};
use gridplan_core::{Config, Topology, VoltageLevel};
use std::collections::BTreeMap;

/// Costs of all lines and transformers in `changes`, one row per component.
///
/// Lines of a new type pay earthwork once plus cable costs for every further
/// parallel line. Added parallel lines pay cable costs only. Transformers
/// pay a fixed price per unit depending on the station. Removed equipment
/// and components no longer in the topology are not costed.
pub fn grid_expansion_costs(
    topology: &Topology,
    changes: &[EquipmentChange],
    config: &Config,
) -> Vec<ExpansionCost> {
    let costs = &config.costs;
    let urban = topology
        .grid_district
        .is_urban(costs.urban_population_density);

    let mut rows: BTreeMap<&str, ExpansionCost> = BTreeMap::new();
    for change in changes.iter().filter(|c| c.change != ChangeKind::Removed) {
        let (kind, cost, length, level) = if let Some(line) = topology.lines.get(&change.name) {
            let Some(level) = topology.voltage_level(&line.bus0) else {
                continue;
            };
            let per_km = match change.change {
                ChangeKind::Changed => {
                    costs.cable_incl_earthwork(level, urban)
                        + costs.cable(level) * change.quantity.saturating_sub(1) as f64
                }
                _ => costs.cable(level) * change.quantity as f64,
            };
            (
                line.type_info.clone().unwrap_or_default(),
                per_km * line.length,
                line.length,
                level.as_str().to_string(),
            )
        } else if let Some(trafo) = topology.transformers.get(&change.name) {
            (
                trafo.type_info.clone().unwrap_or_default(),
                costs.lv_transformer * change.quantity as f64,
                0.0,
                "mv/lv".to_string(),
            )
        } else if let Some(trafo) = topology.transformers_hvmv.get(&change.name) {
            (
                trafo.type_info.clone().unwrap_or_default(),
                costs.mv_transformer * change.quantity as f64,
                0.0,
                VoltageLevel::Mv.as_str().to_string(),
            )
        } else {
            continue;
        };

        let row = rows.entry(change.name.as_str()).or_insert_with(|| ExpansionCost {
            name: change.name.clone(),
            kind,
            total_costs: 0.0,
            quantity: 0,
            length,
            voltage_level: level,
        });
        row.total_costs += cost;
        row.quantity += change.quantity;
    }
    rows.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_core::synthetic;

    fn change(name: &str, kind: ChangeKind, quantity: u32) -> EquipmentChange {
        EquipmentChange {
            name: name.to_string(),
            iteration_step: 1,
            change: kind,
            equipment: String::new(),
            quantity,
        }
    }

    #[test]
    fn line_costs_by_change() {
        let topo = synthetic::example_topology();
        let config = Config::default();
        let costs = grid_expansion_costs(
            &topo,
            &[
                // 1.5 km, new type with one further parallel line
                change("Line_10004", ChangeKind::Changed, 2),
                // 0.05 km, two added parallel lines
                change("Line_LVGrid_1_1", ChangeKind::Added, 2),
            ],
            &config,
        );
        assert_eq!(costs.len(), 2);
        let urban = topo
            .grid_district
            .is_urban(config.costs.urban_population_density);

        let lv = costs.iter().find(|c| c.name == "Line_LVGrid_1_1").unwrap();
        assert_eq!(lv.voltage_level, "lv");
        assert!((lv.total_costs - 0.05 * 2.0 * config.costs.lv_cable).abs() < 1e-9);

        let mv = costs.iter().find(|c| c.name == "Line_10004").unwrap();
        let expected = 1.5
            * (config.costs.cable_incl_earthwork(VoltageLevel::Mv, urban) + config.costs.mv_cable);
        assert!((mv.total_costs - expected).abs() < 1e-9);
        assert_eq!(mv.quantity, 2);
        assert!((mv.length - 1.5).abs() < 1e-12);
    }

    #[test]
    fn transformer_costs_by_station() {
        let topo = synthetic::example_topology();
        let config = Config::default();
        let costs = grid_expansion_costs(
            &topo,
            &[
                change("LVStation_1_transformer_1", ChangeKind::Added, 1),
                change("MVStation_1_transformer_1", ChangeKind::Added, 1),
                change("LVStation_2_transformer_1", ChangeKind::Removed, 1),
                change("Line_gone", ChangeKind::Added, 1),
            ],
            &config,
        );
        assert_eq!(costs.len(), 2);
        let lv = costs.iter().find(|c| c.name == "LVStation_1_transformer_1").unwrap();
        assert_eq!(lv.voltage_level, "mv/lv");
        assert_eq!(lv.total_costs, config.costs.lv_transformer);
        let mv = costs.iter().find(|c| c.name == "MVStation_1_transformer_1").unwrap();
        assert_eq!(mv.voltage_level, "mv");
        assert_eq!(mv.total_costs, config.costs.mv_transformer);
    }

    #[test]
    fn repeated_changes_add_up() {
        let topo = synthetic::example_topology();
        let config = Config::default();
        let costs = grid_expansion_costs(
            &topo,
            &[
                change("LVStation_1_transformer_1", ChangeKind::Added, 1),
                change("LVStation_1_transformer_1", ChangeKind::Added, 1),
            ],
            &config,
        );
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].quantity, 2);
        assert!((costs[0].total_costs - 2.0 * config.costs.lv_transformer).abs() < 1e-9);
    }
}
