//! Component records stored in the topology tables.
//!
//! Every record is keyed by its unique `name`. Records serialize with the
//! column names used by the CSV grid format (`bus0`, `v_nom`, `type_info`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Voltage level a bus or component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoltageLevel {
    Mv,
    Lv,
}

impl VoltageLevel {
    /// Buses below 1 kV are low voltage.
    pub fn from_v_nom(v_nom: f64) -> Self {
        if v_nom < 1.0 {
            VoltageLevel::Lv
        } else {
            VoltageLevel::Mv
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoltageLevel::Mv => "mv",
            VoltageLevel::Lv => "lv",
        }
    }
}

impl fmt::Display for VoltageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[default]
    Cable,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadKind {
    #[default]
    ConventionalLoad,
    ChargingPoint,
    HeatPump,
}

impl LoadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadKind::ConventionalLoad => "conventional_load",
            LoadKind::ChargingPoint => "charging_point",
            LoadKind::HeatPump => "heat_pump",
        }
    }
}

/// Power flow control mode of a generator or storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Control {
    #[default]
    PQ,
    PV,
    Slack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    /// Nominal voltage in kV
    pub v_nom: f64,
    /// Longitude (WGS84)
    #[serde(default)]
    pub x: Option<f64>,
    /// Latitude (WGS84)
    #[serde(default)]
    pub y: Option<f64>,
    pub mv_grid_id: u32,
    /// `None` for buses in the MV grid
    #[serde(default)]
    pub lv_grid_id: Option<u32>,
    #[serde(default)]
    pub in_building: bool,
}

impl Bus {
    pub fn new(name: impl Into<String>, v_nom: f64, mv_grid_id: u32) -> Self {
        Self {
            name: name.into(),
            v_nom,
            x: None,
            y: None,
            mv_grid_id,
            lv_grid_id: None,
            in_building: false,
        }
    }

    pub fn with_lv_grid(mut self, lv_grid_id: u32) -> Self {
        self.lv_grid_id = Some(lv_grid_id);
        self
    }

    pub fn with_coordinates(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn voltage_level(&self) -> VoltageLevel {
        VoltageLevel::from_v_nom(self.v_nom)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Length in km
    pub length: f64,
    /// Total series resistance in Ohm (parallel lines already folded in)
    pub r: f64,
    /// Total series reactance in Ohm
    pub x: f64,
    /// Total shunt susceptance in Siemens
    #[serde(default)]
    pub b: f64,
    /// Thermal rating in MVA (all parallel lines)
    pub s_nom: f64,
    #[serde(default = "default_num_parallel")]
    pub num_parallel: u32,
    #[serde(default)]
    pub type_info: Option<String>,
    #[serde(default)]
    pub kind: LineKind,
}

fn default_num_parallel() -> u32 {
    1
}

impl Line {
    /// True if `bus` is one of the line's terminals.
    pub fn connects(&self, bus: &str) -> bool {
        self.bus0 == bus || self.bus1 == bus
    }

    /// Terminal opposite to `bus`.
    pub fn other_bus(&self, bus: &str) -> Option<&str> {
        if self.bus0 == bus {
            Some(&self.bus1)
        } else if self.bus1 == bus {
            Some(&self.bus0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub name: String,
    /// Upper voltage side
    pub bus0: String,
    /// Lower voltage side
    pub bus1: String,
    /// Resistance in p.u. of the transformer rating
    pub r_pu: f64,
    /// Reactance in p.u. of the transformer rating
    pub x_pu: f64,
    /// Rating in MVA
    pub s_nom: f64,
    #[serde(default)]
    pub type_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub name: String,
    pub bus: String,
    /// Peak active power in MW
    pub p_set: f64,
    #[serde(rename = "type", default)]
    pub kind: LoadKind,
    /// Annual consumption in MWh
    #[serde(default)]
    pub annual_consumption: f64,
    /// Sector for conventional loads, use case for charging points
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub control: Control,
    /// Nominal power in MW
    pub p_nom: f64,
    /// Technology, e.g. solar, wind, gas, biomass
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub weather_cell_id: Option<u64>,
    #[serde(default)]
    pub generator_id: Option<u64>,
}

impl Generator {
    /// Solar and wind generators follow weather dependent profiles.
    pub fn is_fluctuating(&self) -> bool {
        matches!(self.kind.as_str(), "solar" | "wind")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub control: Control,
    /// Nominal power in MW
    pub p_nom: f64,
    /// Energy to power ratio in hours
    #[serde(default = "default_max_hours")]
    pub max_hours: f64,
}

fn default_max_hours() -> f64 {
    2.0
}

/// Switch disconnector represented by the line `branch`.
///
/// In the open state the branch ends at `bus_open`, in the closed state at
/// `bus_closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub name: String,
    pub bus_open: String,
    pub bus_closed: String,
    pub branch: String,
    #[serde(default)]
    pub type_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridDistrict {
    pub population: u64,
    /// Area in km²
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub srid: Option<u32>,
    #[serde(default)]
    pub geom_wkt: Option<String>,
}

impl GridDistrict {
    /// Districts with more than `threshold` inhabitants per km² count as urban.
    pub fn is_urban(&self, threshold: f64) -> bool {
        match self.area {
            Some(area) if area > 0.0 => self.population as f64 / area > threshold,
            _ => false,
        }
    }
}
