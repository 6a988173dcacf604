//! Grid topology as a directory of CSV tables.
//!
//! ```text
//! <dir>/network.csv              mv_grid_id and grid district
//! <dir>/buses.csv
//! <dir>/lines.csv
//! <dir>/transformers.csv         MV/LV station transformers
//! <dir>/transformers_hvmv.csv    HV/MV station transformers
//! <dir>/loads.csv
//! <dir>/generators.csv
//! <dir>/storage_units.csv        optional
//! <dir>/switches.csv             optional
//! <dir>/equipment/               optional, see [`crate::equipment`]
//! ```

use crate::equipment::import_equipment;
use crate::tables::{read_optional_table, read_table, write_table};
use anyhow::{bail, Context, Result};
use gridplan_core::components::{
    Bus, Generator, GridDistrict, Line, Load, StorageUnit, SwitchRecord, Transformer,
};
use gridplan_core::config::IntegrityConfig;
use gridplan_core::{Diagnostics, ImportStats, Topology};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const NETWORK: &str = "network.csv";
const EQUIPMENT_DIR: &str = "equipment";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkRecord {
    mv_grid_id: u32,
    population: u64,
    area: Option<f64>,
    srid: Option<u32>,
    geom_wkt: Option<String>,
}

/// Imported topology with what was found on the way.
#[derive(Debug, Clone)]
pub struct TopologyImport {
    pub topology: Topology,
    pub diagnostics: Diagnostics,
    pub stats: ImportStats,
}

trait Named {
    fn name(&self) -> &str;
}

macro_rules! named {
    ($($t:ty),*) => {
        $(impl Named for $t {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

named!(Bus, Line, Transformer, Load, Generator, StorageUnit, SwitchRecord);

/// Key records by name. Later duplicates are dropped and reported.
fn keyed<T: Named>(records: Vec<T>, table: &str, diag: &mut Diagnostics) -> BTreeMap<String, T> {
    let mut out = BTreeMap::new();
    for record in records {
        let name = record.name().to_string();
        if out.contains_key(&name) {
            diag.add_warning_with_entity(
                "duplicate",
                &format!("{} is defined more than once in {}. Only the first is kept.", name, table),
                &name,
            );
            continue;
        }
        out.insert(name, record);
    }
    out
}

/// Read a topology from `dir` and check its integrity.
///
/// `network.csv`, `buses.csv` and `lines.csv` are required. Without an
/// `equipment` directory the built-in equipment catalogue is used.
pub fn import_topology(dir: &Path, integrity: &IntegrityConfig) -> Result<TopologyImport> {
    if !dir.is_dir() {
        bail!("Topology directory {} does not exist.", dir.display());
    }
    let mut diagnostics = Diagnostics::new();

    let network: Vec<NetworkRecord> = read_table(&dir.join(NETWORK))?;
    let Some(network) = network.into_iter().next() else {
        bail!("{} is empty.", dir.join(NETWORK).display());
    };
    let mut topology = Topology::new(network.mv_grid_id);
    topology.grid_district = GridDistrict {
        population: network.population,
        area: network.area,
        srid: network.srid,
        geom_wkt: network.geom_wkt,
    };

    topology.buses = keyed(read_table(&dir.join("buses.csv"))?, "buses", &mut diagnostics);
    topology.lines = keyed(read_table(&dir.join("lines.csv"))?, "lines", &mut diagnostics);
    topology.transformers = keyed(
        read_optional_table(&dir.join("transformers.csv"))?,
        "transformers",
        &mut diagnostics,
    );
    topology.transformers_hvmv = keyed(
        read_optional_table(&dir.join("transformers_hvmv.csv"))?,
        "transformers_hvmv",
        &mut diagnostics,
    );
    topology.loads = keyed(
        read_optional_table(&dir.join("loads.csv"))?,
        "loads",
        &mut diagnostics,
    );
    topology.generators = keyed(
        read_optional_table(&dir.join("generators.csv"))?,
        "generators",
        &mut diagnostics,
    );
    topology.storage_units = keyed(
        read_optional_table(&dir.join("storage_units.csv"))?,
        "storage_units",
        &mut diagnostics,
    );
    topology.switches = keyed(
        read_optional_table(&dir.join("switches.csv"))?,
        "switches",
        &mut diagnostics,
    );
    if topology.transformers_hvmv.is_empty() {
        diagnostics.add_warning("station", "Topology has no HV/MV station transformer.");
    }

    let equipment_dir = dir.join(EQUIPMENT_DIR);
    if equipment_dir.is_dir() {
        topology.equipment = import_equipment(&equipment_dir)?;
    } else {
        debug!("no equipment directory, using built-in equipment data");
    }

    diagnostics.merge(topology.check_integrity(integrity));
    let stats = ImportStats {
        buses: topology.buses.len(),
        lines: topology.lines.len(),
        transformers: topology.transformers.len() + topology.transformers_hvmv.len(),
        loads: topology.loads.len(),
        generators: topology.generators.len(),
        storage_units: topology.storage_units.len(),
        switches: topology.switches.len(),
    };
    if diagnostics.has_errors() {
        warn!(
            errors = diagnostics.error_count(),
            "imported topology has integrity errors"
        );
    }
    info!(path = %dir.display(), %stats, "imported topology");
    Ok(TopologyImport {
        topology,
        diagnostics,
        stats,
    })
}

/// Write `topology` to `dir`, equipment data included.
pub fn export_topology(topology: &Topology, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let network = NetworkRecord {
        mv_grid_id: topology.mv_grid_id,
        population: topology.grid_district.population,
        area: topology.grid_district.area,
        srid: topology.grid_district.srid,
        geom_wkt: topology.grid_district.geom_wkt.clone(),
    };
    write_table(&dir.join(NETWORK), [&network])?;
    write_table(&dir.join("buses.csv"), topology.buses.values())?;
    write_table(&dir.join("lines.csv"), topology.lines.values())?;
    write_table(&dir.join("transformers.csv"), topology.transformers.values())?;
    write_table(&dir.join("transformers_hvmv.csv"), topology.transformers_hvmv.values())?;
    write_table(&dir.join("loads.csv"), topology.loads.values())?;
    write_table(&dir.join("generators.csv"), topology.generators.values())?;
    if !topology.storage_units.is_empty() {
        write_table(&dir.join("storage_units.csv"), topology.storage_units.values())?;
    }
    if !topology.switches.is_empty() {
        write_table(&dir.join("switches.csv"), topology.switches.values())?;
    }
    crate::equipment::export_equipment(&topology.equipment, &dir.join(EQUIPMENT_DIR))?;
    info!(path = %dir.display(), "exported topology");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_core::synthetic;
    use tempfile::tempdir;

    #[test]
    fn example_topology_survives_export() {
        let topology = synthetic::example_topology();
        let dir = tempdir().unwrap();
        export_topology(&topology, dir.path()).unwrap();
        assert!(dir.path().join("buses.csv").exists());
        assert!(dir.path().join("equipment").is_dir());

        let imported = import_topology(dir.path(), &Default::default()).unwrap();
        let read = &imported.topology;
        assert_eq!(read.buses, topology.buses);
        assert_eq!(read.lines, topology.lines);
        assert_eq!(read.transformers, topology.transformers);
        assert_eq!(read.transformers_hvmv, topology.transformers_hvmv);
        assert_eq!(read.loads, topology.loads);
        assert_eq!(read.generators, topology.generators);
        assert_eq!(read.grid_district, topology.grid_district);
        assert_eq!(read.equipment, topology.equipment);
        assert_eq!(imported.stats.buses, topology.buses.len());
        assert!(!imported.diagnostics.has_issues(), "{}", imported.diagnostics);
    }

    #[test]
    fn duplicate_names_are_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(NETWORK), "mv_grid_id,population,area,srid,geom_wkt\n7,100,,,\n")
            .unwrap();
        fs::write(
            dir.path().join("buses.csv"),
            "name,v_nom,x,y,mv_grid_id,lv_grid_id,in_building\n\
             Bus_1,20.0,10.0,52.0,7,,false\n\
             Bus_1,20.0,10.1,52.0,7,,false\n\
             Bus_2,20.0,10.2,52.0,7,,false\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("lines.csv"),
            "name,bus0,bus1,length,r,x,b,s_nom,num_parallel,type_info,kind\n\
             Line_1,Bus_1,Bus_2,1.0,0.2,0.1,0.0,10.0,1,,cable\n",
        )
        .unwrap();

        let imported = import_topology(dir.path(), &Default::default()).unwrap();
        assert_eq!(imported.topology.mv_grid_id, 7);
        assert_eq!(imported.topology.buses.len(), 2);
        assert_eq!(imported.topology.buses["Bus_1"].x, Some(10.0));
        assert!(imported.diagnostics.contains("Bus_1 is defined more than once"));
        assert!(imported.diagnostics.contains("no HV/MV station"));
    }

    #[test]
    fn missing_directory_and_tables_fail() {
        let dir = tempdir().unwrap();
        assert!(import_topology(&dir.path().join("nope"), &Default::default()).is_err());
        let err = import_topology(dir.path(), &Default::default()).unwrap_err();
        assert!(err.to_string().contains("network.csv"));
    }
}
