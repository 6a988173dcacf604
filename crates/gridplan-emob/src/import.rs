//! Import of mobility simulation results and potential charging parks.
//!
//! ```text
//! <simbev_dir>/metadata_simbev_run.json
//! <simbev_dir>/<region>/<car_id>.csv      one file per car
//! <tracbev_dir>/home.csv, work.csv, public.csv, hpc.csv
//! ```

use crate::data::{ChargingProcess, Electromobility, PotentialChargingPark, UseCase};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use gridplan_core::config::ElectromobilityConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SIMBEV_METADATA: &str = "metadata_simbev_run.json";

#[derive(Debug, Deserialize)]
struct SimbevMetadata {
    config: SimbevConfig,
}

#[derive(Debug, Deserialize)]
struct SimbevConfig {
    basic: SimbevBasic,
}

#[derive(Debug, Deserialize)]
struct SimbevBasic {
    start_date: NaiveDate,
    end_date: NaiveDate,
    /// Minutes
    stepsize: u32,
    eta_cp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SimbevRow {
    location: String,
    #[serde(default)]
    use_case: String,
    netto_charging_capacity: f64,
    chargingdemand: f64,
    park_start: usize,
    park_end: usize,
}

#[derive(Debug, Deserialize)]
struct TracbevRow {
    x: f64,
    y: f64,
    user_centric_weight: f64,
}

/// Read charging processes and potential charging parks.
pub fn import_electromobility(
    simbev_dir: &Path,
    tracbev_dir: &Path,
    config: &ElectromobilityConfig,
) -> Result<Electromobility> {
    let metadata = read_simbev_metadata(simbev_dir)?;
    let basic = metadata.config.basic;
    if basic.end_date < basic.start_date {
        bail!("Simulation end {} is before its start {}.", basic.end_date, basic.start_date);
    }
    if basic.stepsize == 0 {
        bail!("Simulation step size must be positive.");
    }
    let charging_processes = read_charging_processes(simbev_dir)?;
    let potential_charging_parks = read_potential_charging_parks(tracbev_dir)?;
    info!(
        processes = charging_processes.len(),
        parks = potential_charging_parks.len(),
        "imported electromobility data"
    );

    let simulation_start = basic
        .start_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid simulation start {}", basic.start_date))?;
    Ok(Electromobility {
        charging_processes,
        potential_charging_parks,
        integrated_charging_parks: BTreeMap::new(),
        simulation_start,
        stepsize_minutes: basic.stepsize,
        simulated_days: ((basic.end_date - basic.start_date).num_days() + 1) as u32,
        eta_charging_points: basic.eta_cp.unwrap_or(config.eta_charging_points),
    })
}

fn read_simbev_metadata(dir: &Path) -> Result<SimbevMetadata> {
    let path = dir.join(SIMBEV_METADATA);
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            csv_files(&path, out)?;
        } else if path.extension().map_or(false, |e| e == "csv") {
            out.push(path);
        }
    }
    Ok(())
}

/// Charging processes of all cars below `dir`. Rows without charging demand
/// (driving, parking without charging) are dropped.
pub fn read_charging_processes(dir: &Path) -> Result<Vec<ChargingProcess>> {
    let mut files = Vec::new();
    csv_files(dir, &mut files)?;
    files.sort();

    let mut processes = Vec::new();
    for path in files {
        let car_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut reader =
            csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
        for row in reader.deserialize::<SimbevRow>() {
            let row = row.with_context(|| format!("parsing {}", path.display()))?;
            if row.chargingdemand <= 0.0 || row.use_case.is_empty() {
                continue;
            }
            if row.park_end < row.park_start {
                bail!(
                    "{}: parking of car {} ends at {} before it starts at {}.",
                    path.display(),
                    car_id,
                    row.park_end,
                    row.park_start
                );
            }
            let use_case: UseCase = row
                .use_case
                .parse()
                .with_context(|| format!("parsing {}", path.display()))?;
            processes.push(ChargingProcess {
                car_id: car_id.clone(),
                destination: row.location,
                use_case,
                netto_charging_capacity: row.netto_charging_capacity,
                charging_demand: row.chargingdemand,
                park_start: row.park_start,
                park_end: row.park_end,
                park_time_timesteps: row.park_end - row.park_start + 1,
                charging_park_id: None,
                charging_point_id: None,
            });
        }
    }
    Ok(processes)
}

/// Potential charging parks, numbered across use cases.
pub fn read_potential_charging_parks(dir: &Path) -> Result<Vec<PotentialChargingPark>> {
    let mut parks = Vec::new();
    for use_case in UseCase::ALL {
        let path = dir.join(format!("{}.csv", use_case));
        if !path.exists() {
            warn!("No potential charging parks for use case {} in {}.", use_case, dir.display());
            continue;
        }
        let mut reader =
            csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
        for row in reader.deserialize::<TracbevRow>() {
            let row = row.with_context(|| format!("parsing {}", path.display()))?;
            let id = parks.len() as u64;
            parks.push(PotentialChargingPark::new(
                id,
                use_case,
                row.user_centric_weight,
                row.x,
                row.y,
            ));
        }
    }
    Ok(parks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn imports_simbev_and_tracbev() {
        let simbev = tempdir().unwrap();
        let tracbev = tempdir().unwrap();
        write(
            &simbev.path().join(SIMBEV_METADATA),
            r#"{"config": {"basic": {"start_date": "2011-01-01", "end_date": "2011-01-07", "stepsize": 15}}}"#,
        );
        write(
            &simbev.path().join("region_1/car_1.csv"),
            "location,use_case,netto_charging_capacity,chargingdemand,park_start,park_end\n\
             0_home,home,11.0,20.5,0,30\n\
             driving,,0.0,0.0,31,35\n\
             6_retail,public,22.0,8.0,40,44\n",
        );
        write(
            &simbev.path().join("region_1/car_2.csv"),
            "location,use_case,netto_charging_capacity,chargingdemand,park_start,park_end\n\
             1_work,work,3.7,6.0,20,60\n",
        );
        write(&tracbev.path().join("home.csv"), "x,y,user_centric_weight\n10.0,52.0,0.5\n10.01,52.0,0.5\n");
        write(&tracbev.path().join("hpc.csv"), "x,y,user_centric_weight\n10.02,52.01,1.0\n");

        let emob =
            import_electromobility(simbev.path(), tracbev.path(), &ElectromobilityConfig::default())
                .unwrap();
        assert_eq!(emob.charging_processes.len(), 3);
        assert_eq!(emob.simulated_days, 7);
        assert_eq!(emob.stepsize_minutes, 15);
        assert_eq!(emob.eta_charging_points, 0.9);
        assert_eq!(emob.timesteps(), 7 * 96);

        let first = &emob.charging_processes[0];
        assert_eq!(first.car_id, "car_1");
        assert_eq!(first.destination, "0_home");
        assert_eq!(first.park_time_timesteps, 31);
        assert_eq!(emob.charging_processes[2].use_case, UseCase::Work);

        assert_eq!(emob.potential_charging_parks.len(), 3);
        let hpc = &emob.potential_charging_parks[2];
        assert_eq!((hpc.id, hpc.use_case), (2, UseCase::Hpc));
    }

    #[test]
    fn missing_metadata_is_an_error() {
        let simbev = tempdir().unwrap();
        let tracbev = tempdir().unwrap();
        let err = import_electromobility(simbev.path(), tracbev.path(), &Default::default())
            .unwrap_err();
        assert!(err.to_string().contains(SIMBEV_METADATA));
    }

    #[test]
    fn unknown_use_case_is_rejected() {
        let simbev = tempdir().unwrap();
        write(
            &simbev.path().join("car_9.csv"),
            "location,use_case,netto_charging_capacity,chargingdemand,park_start,park_end\n\
             0_home,street,11.0,20.5,0,30\n",
        );
        assert!(read_charging_processes(simbev.path()).is_err());
    }
}
