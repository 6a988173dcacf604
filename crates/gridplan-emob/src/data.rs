//! Charging processes, potential charging parks and their capacities.
//!
//! Charging processes come from a mobility simulation in kW and kWh on the
//! simulation's own time steps. Potential charging parks are locations where
//! charging infrastructure may be built, one set per use case.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use gridplan_core::config::ElectromobilityConfig;
use gridplan_core::GridError;
use gridplan_ts::TimeIndex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Home,
    Work,
    Public,
    Hpc,
}

impl UseCase {
    pub const ALL: [UseCase; 4] = [UseCase::Home, UseCase::Work, UseCase::Public, UseCase::Hpc];

    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Home => "home",
            UseCase::Work => "work",
            UseCase::Public => "public",
            UseCase::Hpc => "hpc",
        }
    }

    /// Home and work charging points belong to one car each.
    pub fn is_private(&self) -> bool {
        matches!(self, UseCase::Home | UseCase::Work)
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(UseCase::Home),
            "work" => Ok(UseCase::Work),
            "public" => Ok(UseCase::Public),
            "hpc" => Ok(UseCase::Hpc),
            other => Err(GridError::Parse(format!("Unknown charging use case {}.", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingProcess {
    pub car_id: String,
    pub destination: String,
    pub use_case: UseCase,
    /// Charging power at the car in kW
    pub netto_charging_capacity: f64,
    /// kWh
    pub charging_demand: f64,
    /// First parking time step
    pub park_start: usize,
    /// Last parking time step, inclusive
    pub park_end: usize,
    pub park_time_timesteps: usize,
    pub charging_park_id: Option<u64>,
    pub charging_point_id: Option<u64>,
}

impl ChargingProcess {
    /// Time steps needed to charge the demand at full power.
    pub fn full_power_timesteps(&self, stepsize_hours: f64) -> f64 {
        if self.netto_charging_capacity <= 0.0 {
            return 0.0;
        }
        self.charging_demand / (self.netto_charging_capacity * stepsize_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialChargingPark {
    pub id: u64,
    pub use_case: UseCase,
    pub user_centric_weight: f64,
    pub x: f64,
    pub y: f64,
    /// Sum over the park's charging points of their largest power, grid side, kW
    #[serde(default)]
    pub designated_charging_point_capacity: f64,
    /// MW
    #[serde(default)]
    pub grid_connection_capacity: f64,
    /// LV grid of the closest MV/LV station
    #[serde(default)]
    pub nearest_lv_grid: Option<u32>,
    #[serde(default = "one")]
    pub grid_centric_weight: f64,
}

fn one() -> f64 {
    1.0
}

impl PotentialChargingPark {
    pub fn new(id: u64, use_case: UseCase, user_centric_weight: f64, x: f64, y: f64) -> Self {
        Self {
            id,
            use_case,
            user_centric_weight,
            x,
            y,
            designated_charging_point_capacity: 0.0,
            grid_connection_capacity: 0.0,
            nearest_lv_grid: None,
            grid_centric_weight: 1.0,
        }
    }
}

/// Grid connection capacity in MW for charging points of `total_capacity` MW.
///
/// Small parks are connected with their full capacity, large ones with
/// `minimum_factor` of it, and in between the factor falls linearly.
pub fn determine_grid_connection_capacity(
    total_capacity: f64,
    lower_limit: f64,
    upper_limit: f64,
    minimum_factor: f64,
) -> f64 {
    if total_capacity <= lower_limit {
        total_capacity
    } else if total_capacity >= upper_limit {
        minimum_factor * total_capacity
    } else {
        let slope = (minimum_factor - 1.0) / (upper_limit - lower_limit);
        (slope * (total_capacity - lower_limit) + 1.0) * total_capacity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Electromobility {
    pub charging_processes: Vec<ChargingProcess>,
    pub potential_charging_parks: Vec<PotentialChargingPark>,
    /// Charging park id to the name of its charging point load
    pub integrated_charging_parks: BTreeMap<u64, String>,
    pub simulation_start: NaiveDateTime,
    pub stepsize_minutes: u32,
    pub simulated_days: u32,
    pub eta_charging_points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Metadata {
    simulation_start: NaiveDateTime,
    stepsize_minutes: u32,
    simulated_days: u32,
    eta_charging_points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntegratedPark {
    charging_park_id: u64,
    load: String,
}

impl Electromobility {
    pub fn stepsize_hours(&self) -> f64 {
        self.stepsize_minutes as f64 / 60.0
    }

    pub fn timesteps(&self) -> usize {
        (self.simulated_days as usize * 24 * 60) / self.stepsize_minutes.max(1) as usize
    }

    /// Time index of the mobility simulation.
    pub fn timeindex(&self) -> TimeIndex {
        gridplan_ts::date_range(
            self.simulation_start,
            self.timesteps(),
            Duration::minutes(self.stepsize_minutes as i64),
        )
    }

    pub fn park(&self, id: u64) -> Option<&PotentialChargingPark> {
        self.potential_charging_parks.iter().find(|p| p.id == id)
    }

    /// Indices of the charging processes assigned to park `id`.
    pub fn processes_of_park(&self, id: u64) -> Vec<usize> {
        self.charging_processes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.charging_park_id == Some(id))
            .map(|(i, _)| i)
            .collect()
    }

    /// Recompute designated charging point capacity and grid connection
    /// capacity of every park from the assigned charging processes.
    pub fn update_park_capacities(&mut self, config: &ElectromobilityConfig) {
        let mut points: BTreeMap<u64, BTreeMap<u64, f64>> = BTreeMap::new();
        for process in &self.charging_processes {
            if let (Some(park), Some(point)) = (process.charging_park_id, process.charging_point_id) {
                let max = points.entry(park).or_default().entry(point).or_insert(0.0);
                *max = max.max(process.netto_charging_capacity);
            }
        }
        let eta = self.eta_charging_points;
        for park in &mut self.potential_charging_parks {
            let netto: f64 = points.get(&park.id).map_or(0.0, |p| p.values().sum());
            let designated = (netto / eta * 10.0).round() / 10.0;
            park.designated_charging_point_capacity = designated;
            park.grid_connection_capacity = if park.use_case == UseCase::Hpc {
                designated / 1000.0
            } else {
                determine_grid_connection_capacity(
                    designated / 1000.0,
                    config.lower_limit_mw,
                    config.upper_limit_mw,
                    config.minimum_factor,
                )
            };
        }
    }

    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        write_records(&dir.join("charging_processes.csv"), &self.charging_processes)?;
        write_records(
            &dir.join("potential_charging_parks.csv"),
            &self.potential_charging_parks,
        )?;
        let integrated: Vec<IntegratedPark> = self
            .integrated_charging_parks
            .iter()
            .map(|(id, load)| IntegratedPark {
                charging_park_id: *id,
                load: load.clone(),
            })
            .collect();
        write_records(&dir.join("integrated_charging_parks.csv"), &integrated)?;
        let metadata = Metadata {
            simulation_start: self.simulation_start,
            stepsize_minutes: self.stepsize_minutes,
            simulated_days: self.simulated_days,
            eta_charging_points: self.eta_charging_points,
        };
        let path = dir.join("metadata.json");
        fs::write(&path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        let path = dir.join("metadata.json");
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let metadata: Metadata =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let integrated: Vec<IntegratedPark> =
            read_records(&dir.join("integrated_charging_parks.csv"))?;
        Ok(Self {
            charging_processes: read_records(&dir.join("charging_processes.csv"))?,
            potential_charging_parks: read_records(&dir.join("potential_charging_parks.csv"))?,
            integrated_charging_parks: integrated
                .into_iter()
                .map(|p| (p.charging_park_id, p.load))
                .collect(),
            simulation_start: metadata.simulation_start,
            stepsize_minutes: metadata.stepsize_minutes,
            simulated_days: metadata.simulated_days,
            eta_charging_points: metadata.eta_charging_points,
        })
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use gridplan_ts::parse_timestamp;

    pub fn process(
        car: &str,
        use_case: UseCase,
        netto: f64,
        demand: f64,
        start: usize,
        end: usize,
    ) -> ChargingProcess {
        ChargingProcess {
            car_id: car.to_string(),
            destination: use_case.as_str().to_string(),
            use_case,
            netto_charging_capacity: netto,
            charging_demand: demand,
            park_start: start,
            park_end: end,
            park_time_timesteps: end - start + 1,
            charging_park_id: None,
            charging_point_id: None,
        }
    }

    /// One day in 15 minute steps with two home parks, one public and one
    /// hpc park next to the example grid.
    pub fn electromobility() -> Electromobility {
        Electromobility {
            charging_processes: vec![
                process("car_1", UseCase::Home, 11.0, 22.0, 0, 31),
                process("car_1", UseCase::Home, 11.0, 5.5, 72, 95),
                process("car_1", UseCase::Public, 22.0, 11.0, 40, 43),
                process("car_2", UseCase::Home, 3.7, 7.4, 4, 35),
                process("car_2", UseCase::Public, 22.0, 5.5, 44, 47),
                process("car_3", UseCase::Hpc, 150.0, 37.5, 50, 50),
            ],
            potential_charging_parks: vec![
                PotentialChargingPark::new(0, UseCase::Home, 0.6, 10.01, 52.0005),
                PotentialChargingPark::new(1, UseCase::Home, 0.4, 10.03, 52.0052),
                PotentialChargingPark::new(2, UseCase::Public, 1.0, 10.0, 52.0121),
                PotentialChargingPark::new(3, UseCase::Hpc, 1.0, 10.02, 52.0051),
            ],
            integrated_charging_parks: BTreeMap::new(),
            simulation_start: parse_timestamp("2011-01-01 00:00:00").unwrap(),
            stepsize_minutes: 15,
            simulated_days: 1,
            eta_charging_points: 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn grid_connection_capacity_limits() {
        assert_eq!(determine_grid_connection_capacity(0.2, 0.3, 1.0, 0.45), 0.2);
        assert!((determine_grid_connection_capacity(2.0, 0.3, 1.0, 0.45) - 0.9).abs() < 1e-12);
        // halfway the factor is halfway between 1 and 0.45
        let p = determine_grid_connection_capacity(0.65, 0.3, 1.0, 0.45);
        assert!((p - 0.65 * 0.725).abs() < 1e-12);
    }

    #[test]
    fn park_capacities_from_charging_points() {
        let mut emob = electromobility();
        for (i, p) in emob.charging_processes.iter_mut().enumerate() {
            p.charging_park_id = Some(if p.use_case == UseCase::Hpc { 3 } else { 0 });
            // car_1 and car_2 share one point at home
            p.charging_point_id = Some(if p.use_case == UseCase::Home { 7 } else { i as u64 });
        }
        emob.update_park_capacities(&ElectromobilityConfig::default());
        let home = emob.park(0).unwrap();
        // 11 kW home point plus two 22 kW public points over 0.9
        assert!((home.designated_charging_point_capacity - 61.1).abs() < 1e-9);
        assert!((home.grid_connection_capacity - 0.0611).abs() < 1e-9);
        let hpc = emob.park(3).unwrap();
        assert!((hpc.grid_connection_capacity - 0.1667).abs() < 1e-9);
        assert_eq!(emob.park(1).unwrap().grid_connection_capacity, 0.0);
    }

    #[test]
    fn simulation_time_index() {
        let emob = electromobility();
        assert_eq!(emob.timesteps(), 96);
        let index = emob.timeindex();
        assert_eq!(index.len(), 96);
        assert_eq!(index[4] - index[0], Duration::hours(1));
    }

    #[test]
    fn use_case_names() {
        for case in UseCase::ALL {
            assert_eq!(case.as_str().parse::<UseCase>().unwrap(), case);
        }
        assert!("street".parse::<UseCase>().is_err());
        assert!(UseCase::Work.is_private() && !UseCase::Hpc.is_private());
    }

    #[test]
    fn electromobility_on_disk() {
        let mut emob = electromobility();
        emob.charging_processes[0].charging_park_id = Some(0);
        emob.charging_processes[0].charging_point_id = Some(0);
        emob.integrated_charging_parks
            .insert(0, "Charging_Point_LVGrid_1_home_1".to_string());
        let dir = tempdir().unwrap();
        emob.to_csv(dir.path()).unwrap();
        let read = Electromobility::from_csv(dir.path()).unwrap();
        assert_eq!(read, emob);
    }
}
