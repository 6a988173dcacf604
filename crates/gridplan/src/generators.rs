//! Update of the generator park from a list of generator records.

use gridplan_core::config::GridConnectionConfig;
use gridplan_core::{ComponentSpec, ConnectionRequest, GridError, GridResult, Topology};
use gridplan_ts::{ComponentTable, TimeSeries};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// One generator of a future scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRecord {
    pub generator_id: u64,
    /// MW
    pub p_nom: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    /// Derived from `p_nom` if not given
    #[serde(default)]
    pub voltage_level: Option<u8>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub weather_cell_id: Option<u64>,
    /// LV grid to connect voltage level 6 and 7 generators to
    #[serde(default)]
    pub mvlv_subst_id: Option<u32>,
}

/// Names of the generators touched by [`import_generators`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorImport {
    pub updated: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Bring the generators of `topology` in line with `records`.
///
/// Generators whose `generator_id` appears in `records` get the new nominal
/// power and subtype. New ids are connected to the grid according to their
/// voltage level. With `remove_missing`, generators with an id that is not in
/// `records` are removed together with their time series. Generators without
/// id are never touched.
pub fn import_generators(
    topology: &mut Topology,
    timeseries: &mut TimeSeries,
    records: &[GeneratorRecord],
    remove_missing: bool,
    config: &GridConnectionConfig,
) -> GridResult<GeneratorImport> {
    let mut seen = BTreeSet::new();
    for record in records {
        if !seen.insert(record.generator_id) {
            return Err(GridError::Validation(format!(
                "Generator id {} is given more than once.",
                record.generator_id
            )));
        }
    }

    let existing: BTreeMap<u64, String> = topology
        .generators
        .values()
        .filter_map(|g| g.generator_id.map(|id| (id, g.name.clone())))
        .collect();
    let mut report = GeneratorImport::default();

    for record in records {
        match existing.get(&record.generator_id) {
            Some(name) => {
                if let Some(generator) = topology.generators.get_mut(name) {
                    if generator.p_nom != record.p_nom {
                        debug!(generator = %name, old = generator.p_nom, new = record.p_nom, "updated nominal power");
                    }
                    generator.p_nom = record.p_nom;
                    generator.subtype = record.subtype.clone().or(generator.subtype.take());
                    report.updated.push(name.clone());
                }
            }
            None => {
                let name = connect(topology, record, config)?;
                if let Some(generator) = topology.generators.get_mut(&name) {
                    generator.subtype = record.subtype.clone();
                }
                report.added.push(name);
            }
        }
    }

    if remove_missing {
        for (id, name) in &existing {
            if !seen.contains(id) {
                topology.remove_generator(name)?;
                report.removed.push(name.clone());
            }
        }
        timeseries.drop_component_time_series(ComponentTable::Generators, &report.removed);
    }

    if !report.added.is_empty() && !timeseries.timeindex.is_empty() {
        warn!(
            "{} new generators have no time series yet. Set the generator time series again.",
            report.added.len()
        );
    }
    info!(
        updated = report.updated.len(),
        added = report.added.len(),
        removed = report.removed.len(),
        "imported generators"
    );
    Ok(report)
}

fn connect(
    topology: &mut Topology,
    record: &GeneratorRecord,
    config: &GridConnectionConfig,
) -> GridResult<String> {
    let level = record
        .voltage_level
        .unwrap_or_else(|| config.voltage_level_for(record.p_nom));
    let mut request = ConnectionRequest::new(ComponentSpec::Generator {
        p_nom: record.p_nom,
        kind: record.kind.clone(),
        weather_cell_id: record.weather_cell_id,
        generator_id: Some(record.generator_id),
    })
    .in_voltage_level(level);
    if let (Some(x), Some(y)) = (record.x, record.y) {
        request = request.at(x, y);
    }
    if let Some(id) = record.mvlv_subst_id {
        request = request.in_lv_grid(id);
    }
    match level {
        4 | 5 => topology.connect_to_mv(&request, config),
        6 | 7 => topology.connect_to_lv(&request, config),
        other => Err(GridError::Validation(format!(
            "Generator {} has voltage level {}. Only voltage levels 4 to 7 can be integrated.",
            record.generator_id, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_core::synthetic;

    fn record(id: u64, p_nom: f64, kind: &str) -> GeneratorRecord {
        GeneratorRecord {
            generator_id: id,
            p_nom,
            kind: kind.into(),
            subtype: None,
            voltage_level: None,
            x: Some(10.025),
            y: Some(52.003),
            weather_cell_id: Some(1122),
            mvlv_subst_id: None,
        }
    }

    #[test]
    fn update_add_and_remove() {
        let mut topology = synthetic::example_topology();
        let mut ts = TimeSeries::new();
        // keep the wind turbine and the first solar plant of LV grid 1
        let records = vec![
            record(1, 2.5, "wind"),
            record(101, 0.02, "solar"),
            record(900, 3.0, "solar"),
            record(901, 0.05, "solar"),
        ];
        let report = import_generators(&mut topology, &mut ts, &records, true, &Default::default())
            .unwrap();

        assert_eq!(report.updated.len(), 2);
        assert_eq!(topology.generators["Generator_MVGrid_1_wind_1"].p_nom, 2.5);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.removed.len(), 5);
        assert_eq!(topology.generators.len(), 4);

        let big = topology
            .generators
            .values()
            .find(|g| g.generator_id == Some(900))
            .unwrap();
        assert_eq!(topology.voltage_level(&big.bus), Some(gridplan_core::components::VoltageLevel::Mv));
        let small = topology
            .generators
            .values()
            .find(|g| g.generator_id == Some(901))
            .unwrap();
        assert_eq!(topology.voltage_level(&small.bus), Some(gridplan_core::components::VoltageLevel::Lv));
    }

    #[test]
    fn keep_unlisted_generators_by_default() {
        let mut topology = synthetic::example_topology();
        let mut ts = TimeSeries::new();
        let before = topology.generators.len();
        let report =
            import_generators(&mut topology, &mut ts, &[record(1, 2.0, "wind")], false, &Default::default())
                .unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(topology.generators.len(), before);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut topology = synthetic::example_topology();
        let mut ts = TimeSeries::new();
        let records = vec![record(5, 1.0, "solar"), record(5, 2.0, "solar")];
        assert!(import_generators(&mut topology, &mut ts, &records, false, &Default::default()).is_err());
    }
}
