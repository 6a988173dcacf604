//! Equipment catalogue CSV files.
//!
//! One file per table, e.g. `equipment-parameters_MV_cables.csv` with the
//! columns `name,U_n,I_max_th,R_per_km,L_per_km,C_per_km`. Tables without a
//! file keep the built-in data.

use crate::tables::{read_table, write_table};
use anyhow::{Context, Result};
use gridplan_core::EquipmentData;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const MV_CABLES: &str = "equipment-parameters_MV_cables.csv";
const MV_OVERHEAD_LINES: &str = "equipment-parameters_MV_overhead_lines.csv";
const LV_CABLES: &str = "equipment-parameters_LV_cables.csv";
const MV_TRANSFORMERS: &str = "equipment-parameters_MV_transformers.csv";
const LV_TRANSFORMERS: &str = "equipment-parameters_LV_transformers.csv";

pub fn import_equipment(dir: &Path) -> Result<EquipmentData> {
    let mut equipment = EquipmentData::default();
    let mut found = 0;

    macro_rules! table {
        ($field:ident, $file:expr) => {
            let path = dir.join($file);
            if path.exists() {
                equipment.$field = read_table(&path)?;
                found += 1;
            } else {
                debug!(file = $file, "equipment table missing, using built-in data");
            }
        };
    }
    table!(mv_cables, MV_CABLES);
    table!(mv_overhead_lines, MV_OVERHEAD_LINES);
    table!(lv_cables, LV_CABLES);
    table!(mv_transformers, MV_TRANSFORMERS);
    table!(lv_transformers, LV_TRANSFORMERS);

    if found == 0 {
        warn!(
            "No equipment data found in {}. Built-in equipment data is used.",
            dir.display()
        );
    }
    Ok(equipment)
}

pub fn export_equipment(equipment: &EquipmentData, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_table(&dir.join(MV_CABLES), &equipment.mv_cables)?;
    write_table(&dir.join(MV_OVERHEAD_LINES), &equipment.mv_overhead_lines)?;
    write_table(&dir.join(LV_CABLES), &equipment.lv_cables)?;
    write_table(&dir.join(MV_TRANSFORMERS), &equipment.mv_transformers)?;
    write_table(&dir.join(LV_TRANSFORMERS), &equipment.lv_transformers)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn custom_cable_table_replaces_built_in_one() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(LV_CABLES),
            "name,U_n,I_max_th,R_per_km,L_per_km,C_per_km\nNAYY 4x1x400,0.4,0.5,0.08,0.25,\n",
        )
        .unwrap();
        let equipment = import_equipment(dir.path()).unwrap();
        assert_eq!(equipment.lv_cables.len(), 1);
        assert_eq!(equipment.lv_cables[0].c_per_km, 0.0);
        assert_eq!(equipment.mv_cables, EquipmentData::default().mv_cables);
    }

    #[test]
    fn broken_table_names_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MV_TRANSFORMERS), "name,S_nom\n40 MVA,forty\n").unwrap();
        let err = import_equipment(dir.path()).unwrap_err();
        assert!(err.to_string().contains(MV_TRANSFORMERS));
    }
}
