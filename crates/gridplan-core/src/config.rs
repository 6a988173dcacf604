//! Study configuration.
//!
//! All sections have defaults, so an empty TOML file yields a usable
//! configuration. Values can be overridden section by section:
//!
//! ```toml
//! [grid_expansion_load_factors]
//! mv_load_case_line = 0.6
//!
//! [integrity]
//! max_line_length_km = 15.0
//! ```

use crate::components::{LoadKind, VoltageLevel};
use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid_connection: GridConnectionConfig,
    pub grid_expansion_standard_equipment: StandardEquipment,
    pub grid_expansion_load_factors: LoadFactors,
    pub grid_expansion_allowed_voltage_deviations: VoltageDeviations,
    pub costs: CostConfig,
    pub worst_case_scale_factors: WorstCaseScaleFactors,
    pub reactive_power_factor: ReactivePowerFactors,
    pub reactive_power_mode: ReactivePowerModes,
    pub integrity: IntegrityConfig,
    pub electromobility: ElectromobilityConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> GridResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> GridResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> GridResult<String> {
        toml::to_string_pretty(self).map_err(|e| GridError::Config(e.to_string()))
    }
}

/// Rules for connecting new components to the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConnectionConfig {
    /// Components up to this power (MW) connect in voltage level 7
    pub upper_limit_voltage_level_7: f64,
    pub upper_limit_voltage_level_6: f64,
    pub upper_limit_voltage_level_5: f64,
    pub upper_limit_voltage_level_4: f64,
    /// Maximum relative voltage drop over a new connection cable
    pub max_connection_voltage_deviation_mv: f64,
    pub max_connection_voltage_deviation_lv: f64,
    /// Minimum length of a new connection line in km
    pub min_connection_length: f64,
}

impl Default for GridConnectionConfig {
    fn default() -> Self {
        Self {
            upper_limit_voltage_level_7: 0.1,
            upper_limit_voltage_level_6: 0.2,
            upper_limit_voltage_level_5: 5.5,
            upper_limit_voltage_level_4: 20.0,
            max_connection_voltage_deviation_mv: 0.02,
            max_connection_voltage_deviation_lv: 0.04,
            min_connection_length: 0.001,
        }
    }
}

impl GridConnectionConfig {
    /// Voltage level (4 to 7) a component of `p_nom` MW is connected in.
    pub fn voltage_level_for(&self, p_nom: f64) -> u8 {
        if p_nom <= self.upper_limit_voltage_level_7 {
            7
        } else if p_nom <= self.upper_limit_voltage_level_6 {
            6
        } else if p_nom <= self.upper_limit_voltage_level_5 {
            5
        } else {
            4
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardEquipment {
    pub hv_mv_transformer: String,
    pub mv_lv_transformer: String,
    pub mv_line_10kv: String,
    pub mv_line_20kv: String,
    pub lv_line: String,
}

impl Default for StandardEquipment {
    fn default() -> Self {
        Self {
            hv_mv_transformer: "40 MVA".to_string(),
            mv_lv_transformer: "630 kVA".to_string(),
            mv_line_10kv: "NA2XS2Y 3x1x185 RM/25".to_string(),
            mv_line_20kv: "NA2XS2Y 3x1x240".to_string(),
            lv_line: "NAYY 4x1x150".to_string(),
        }
    }
}

impl StandardEquipment {
    pub fn line_type(&self, level: VoltageLevel, v_nom: f64) -> &str {
        match level {
            VoltageLevel::Lv => &self.lv_line,
            VoltageLevel::Mv if v_nom <= 15.0 => &self.mv_line_10kv,
            VoltageLevel::Mv => &self.mv_line_20kv,
        }
    }
}

/// Case a time step is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Case {
    #[serde(rename = "load_case")]
    LoadCase,
    #[serde(rename = "feed-in_case")]
    FeedInCase,
}

impl Case {
    pub fn as_str(&self) -> &'static str {
        match self {
            Case::LoadCase => "load_case",
            Case::FeedInCase => "feed-in_case",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("load_case") {
            Some(Case::LoadCase)
        } else if s.starts_with("feed-in_case") {
            Some(Case::FeedInCase)
        } else {
            None
        }
    }
}

/// Allowed relative loading of lines and transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadFactors {
    pub mv_load_case_transformer: f64,
    pub mv_load_case_line: f64,
    #[serde(rename = "mv_feed-in_case_transformer")]
    pub mv_feedin_case_transformer: f64,
    #[serde(rename = "mv_feed-in_case_line")]
    pub mv_feedin_case_line: f64,
    pub lv_load_case_transformer: f64,
    pub lv_load_case_line: f64,
    #[serde(rename = "lv_feed-in_case_transformer")]
    pub lv_feedin_case_transformer: f64,
    #[serde(rename = "lv_feed-in_case_line")]
    pub lv_feedin_case_line: f64,
}

impl Default for LoadFactors {
    fn default() -> Self {
        Self {
            mv_load_case_transformer: 0.5,
            mv_load_case_line: 0.5,
            mv_feedin_case_transformer: 1.0,
            mv_feedin_case_line: 1.0,
            lv_load_case_transformer: 1.0,
            lv_load_case_line: 1.0,
            lv_feedin_case_transformer: 1.0,
            lv_feedin_case_line: 1.0,
        }
    }
}

impl LoadFactors {
    pub fn line(&self, level: VoltageLevel, case: Case) -> f64 {
        match (level, case) {
            (VoltageLevel::Mv, Case::LoadCase) => self.mv_load_case_line,
            (VoltageLevel::Mv, Case::FeedInCase) => self.mv_feedin_case_line,
            (VoltageLevel::Lv, Case::LoadCase) => self.lv_load_case_line,
            (VoltageLevel::Lv, Case::FeedInCase) => self.lv_feedin_case_line,
        }
    }

    /// Transformers are rated by the level of their lower voltage side.
    pub fn transformer(&self, level: VoltageLevel, case: Case) -> f64 {
        match (level, case) {
            (VoltageLevel::Mv, Case::LoadCase) => self.mv_load_case_transformer,
            (VoltageLevel::Mv, Case::FeedInCase) => self.mv_feedin_case_transformer,
            (VoltageLevel::Lv, Case::LoadCase) => self.lv_load_case_transformer,
            (VoltageLevel::Lv, Case::FeedInCase) => self.lv_feedin_case_transformer,
        }
    }
}

/// Allowed voltage deviations in p.u.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageDeviations {
    pub hv_mv_trafo_offset: f64,
    pub hv_mv_trafo_control_deviation: f64,
    pub mv_load_case_max_v_drop: f64,
    #[serde(rename = "mv_feed-in_case_max_v_rise")]
    pub mv_feedin_case_max_v_rise: f64,
    pub mv_lv_station_load_case_max_v_drop: f64,
    #[serde(rename = "mv_lv_station_feed-in_case_max_v_rise")]
    pub mv_lv_station_feedin_case_max_v_rise: f64,
    pub lv_load_case_max_v_drop: f64,
    #[serde(rename = "lv_feed-in_case_max_v_rise")]
    pub lv_feedin_case_max_v_rise: f64,
    /// Combined MV and LV band used when MV and LV are checked together
    pub mv_lv_max_v_deviation: f64,
}

impl Default for VoltageDeviations {
    fn default() -> Self {
        Self {
            hv_mv_trafo_offset: 0.0,
            hv_mv_trafo_control_deviation: 0.0,
            mv_load_case_max_v_drop: 0.015,
            mv_feedin_case_max_v_rise: 0.05,
            mv_lv_station_load_case_max_v_drop: 0.02,
            mv_lv_station_feedin_case_max_v_rise: 0.015,
            lv_load_case_max_v_drop: 0.065,
            lv_feedin_case_max_v_rise: 0.035,
            mv_lv_max_v_deviation: 0.1,
        }
    }
}

/// Grid expansion costs in kEUR (cables per km).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub lv_cable: f64,
    pub lv_cable_incl_earthwork_urban: f64,
    pub lv_cable_incl_earthwork_rural: f64,
    pub mv_cable: f64,
    pub mv_cable_incl_earthwork_urban: f64,
    pub mv_cable_incl_earthwork_rural: f64,
    pub lv_transformer: f64,
    pub mv_transformer: f64,
    /// Population density (inhabitants per km²) above which a district is urban
    pub urban_population_density: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            lv_cable: 9.0,
            lv_cable_incl_earthwork_urban: 100.0,
            lv_cable_incl_earthwork_rural: 60.0,
            mv_cable: 20.0,
            mv_cable_incl_earthwork_urban: 140.0,
            mv_cable_incl_earthwork_rural: 80.0,
            lv_transformer: 10.0,
            mv_transformer: 1000.0,
            urban_population_density: 500.0,
        }
    }
}

impl CostConfig {
    pub fn cable(&self, level: VoltageLevel) -> f64 {
        match level {
            VoltageLevel::Mv => self.mv_cable,
            VoltageLevel::Lv => self.lv_cable,
        }
    }

    pub fn cable_incl_earthwork(&self, level: VoltageLevel, urban: bool) -> f64 {
        match (level, urban) {
            (VoltageLevel::Mv, true) => self.mv_cable_incl_earthwork_urban,
            (VoltageLevel::Mv, false) => self.mv_cable_incl_earthwork_rural,
            (VoltageLevel::Lv, true) => self.lv_cable_incl_earthwork_urban,
            (VoltageLevel::Lv, false) => self.lv_cable_incl_earthwork_rural,
        }
    }
}

/// Scaling factors applied to nominal power in one worst case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFactors {
    pub conventional_load: f64,
    pub charging_point_home: f64,
    pub charging_point_work: f64,
    pub charging_point_public: f64,
    pub charging_point_hpc: f64,
    pub heat_pump: f64,
    pub solar: f64,
    pub wind: f64,
    pub other_generation: f64,
    /// Positive values discharge
    pub storage: f64,
}

impl Default for CaseFactors {
    fn default() -> Self {
        Self::load_case_mv()
    }
}

impl CaseFactors {
    fn load_case_mv() -> Self {
        Self {
            conventional_load: 1.0,
            charging_point_home: 0.2,
            charging_point_work: 0.0,
            charging_point_public: 1.0,
            charging_point_hpc: 1.0,
            heat_pump: 0.8,
            solar: 0.0,
            wind: 0.0,
            other_generation: 0.0,
            storage: -1.0,
        }
    }

    fn load_case_lv() -> Self {
        Self {
            charging_point_home: 1.0,
            charging_point_work: 1.0,
            heat_pump: 1.0,
            ..Self::load_case_mv()
        }
    }

    fn feedin_case_mv() -> Self {
        Self {
            conventional_load: 0.15,
            charging_point_home: 0.0,
            charging_point_work: 0.0,
            charging_point_public: 0.0,
            charging_point_hpc: 0.0,
            heat_pump: 0.0,
            solar: 0.85,
            wind: 1.0,
            other_generation: 1.0,
            storage: 1.0,
        }
    }

    fn feedin_case_lv() -> Self {
        Self {
            conventional_load: 0.1,
            ..Self::feedin_case_mv()
        }
    }

    /// Factor for a load of `kind` with `sector` (use case for charging points).
    pub fn load(&self, kind: LoadKind, sector: Option<&str>) -> f64 {
        match kind {
            LoadKind::ConventionalLoad => self.conventional_load,
            LoadKind::HeatPump => self.heat_pump,
            LoadKind::ChargingPoint => match sector {
                Some("home") => self.charging_point_home,
                Some("work") => self.charging_point_work,
                Some("hpc") => self.charging_point_hpc,
                _ => self.charging_point_public,
            },
        }
    }

    pub fn generator(&self, kind: &str) -> f64 {
        match kind {
            "solar" => self.solar,
            "wind" => self.wind,
            _ => self.other_generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorstCaseScaleFactors {
    pub load_case_mv: CaseFactors,
    #[serde(rename = "feed-in_case_mv")]
    pub feedin_case_mv: CaseFactors,
    pub load_case_lv: CaseFactors,
    #[serde(rename = "feed-in_case_lv")]
    pub feedin_case_lv: CaseFactors,
}

impl Default for WorstCaseScaleFactors {
    fn default() -> Self {
        Self {
            load_case_mv: CaseFactors::load_case_mv(),
            feedin_case_mv: CaseFactors::feedin_case_mv(),
            load_case_lv: CaseFactors::load_case_lv(),
            feedin_case_lv: CaseFactors::feedin_case_lv(),
        }
    }
}

impl WorstCaseScaleFactors {
    pub fn get(&self, case: Case, level: VoltageLevel) -> &CaseFactors {
        match (case, level) {
            (Case::LoadCase, VoltageLevel::Mv) => &self.load_case_mv,
            (Case::FeedInCase, VoltageLevel::Mv) => &self.feedin_case_mv,
            (Case::LoadCase, VoltageLevel::Lv) => &self.load_case_lv,
            (Case::FeedInCase, VoltageLevel::Lv) => &self.feedin_case_lv,
        }
    }
}

/// Component classes that share reactive power settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentClass {
    Generator,
    ConventionalLoad,
    ChargingPoint,
    HeatPump,
    StorageUnit,
}

impl From<LoadKind> for ComponentClass {
    fn from(kind: LoadKind) -> Self {
        match kind {
            LoadKind::ConventionalLoad => ComponentClass::ConventionalLoad,
            LoadKind::ChargingPoint => ComponentClass::ChargingPoint,
            LoadKind::HeatPump => ComponentClass::HeatPump,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassPowerFactors {
    pub generator: f64,
    pub conventional_load: f64,
    pub charging_point: f64,
    pub heat_pump: f64,
    pub storage_unit: f64,
}

impl ClassPowerFactors {
    fn uniform(pf: f64) -> Self {
        Self {
            generator: pf,
            conventional_load: pf,
            charging_point: 1.0,
            heat_pump: 1.0,
            storage_unit: pf,
        }
    }

    pub fn get(&self, class: ComponentClass) -> f64 {
        match class {
            ComponentClass::Generator => self.generator,
            ComponentClass::ConventionalLoad => self.conventional_load,
            ComponentClass::ChargingPoint => self.charging_point,
            ComponentClass::HeatPump => self.heat_pump,
            ComponentClass::StorageUnit => self.storage_unit,
        }
    }
}

impl Default for ClassPowerFactors {
    fn default() -> Self {
        Self::uniform(0.9)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactivePowerFactors {
    pub mv: ClassPowerFactors,
    pub lv: ClassPowerFactors,
}

impl Default for ReactivePowerFactors {
    fn default() -> Self {
        Self {
            mv: ClassPowerFactors::uniform(0.9),
            lv: ClassPowerFactors::uniform(0.95),
        }
    }
}

impl ReactivePowerFactors {
    pub fn get(&self, level: VoltageLevel, class: ComponentClass) -> f64 {
        match level {
            VoltageLevel::Mv => self.mv.get(class),
            VoltageLevel::Lv => self.lv.get(class),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactivePowerMode {
    #[default]
    Inductive,
    Capacitive,
}

impl ReactivePowerMode {
    /// Sign of Q relative to P in generator or load reference frame.
    pub fn q_sign(&self, class: ComponentClass) -> f64 {
        let is_load = matches!(
            class,
            ComponentClass::ConventionalLoad | ComponentClass::ChargingPoint | ComponentClass::HeatPump
        );
        match (self, is_load) {
            (ReactivePowerMode::Inductive, true) => 1.0,
            (ReactivePowerMode::Capacitive, true) => -1.0,
            (ReactivePowerMode::Inductive, false) => -1.0,
            (ReactivePowerMode::Capacitive, false) => 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassModes {
    pub generator: ReactivePowerMode,
    pub conventional_load: ReactivePowerMode,
    pub charging_point: ReactivePowerMode,
    pub heat_pump: ReactivePowerMode,
    pub storage_unit: ReactivePowerMode,
}

impl ClassModes {
    pub fn get(&self, class: ComponentClass) -> ReactivePowerMode {
        match class {
            ComponentClass::Generator => self.generator,
            ComponentClass::ConventionalLoad => self.conventional_load,
            ComponentClass::ChargingPoint => self.charging_point,
            ComponentClass::HeatPump => self.heat_pump,
            ComponentClass::StorageUnit => self.storage_unit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactivePowerModes {
    pub mv: ClassModes,
    pub lv: ClassModes,
}

impl ReactivePowerModes {
    pub fn get(&self, level: VoltageLevel, class: ComponentClass) -> ReactivePowerMode {
        match level {
            VoltageLevel::Mv => self.mv.get(class),
            VoltageLevel::Lv => self.lv.get(class),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub max_line_length_km: f64,
    pub min_line_length_km: f64,
    /// Minimum |r + jx| in Ohm
    pub min_impedance_ohm: f64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            max_line_length_km: 10.0,
            min_line_length_km: 0.001,
            min_impedance_ohm: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectromobilityConfig {
    pub eta_charging_points: f64,
    /// Grid connection capacity scaling, see `determine_grid_connection_capacity`
    pub lower_limit_mw: f64,
    pub upper_limit_mw: f64,
    pub minimum_factor: f64,
    /// Reduced charging never goes below this share of the nominal capacity
    pub minimum_charging_capacity_factor: f64,
    /// Reduced charging falls back to dumb charging below this share of park time
    pub timestamp_share_threshold: f64,
}

impl Default for ElectromobilityConfig {
    fn default() -> Self {
        Self {
            eta_charging_points: 0.9,
            lower_limit_mw: 0.3,
            upper_limit_mw: 1.0,
            minimum_factor: 0.45,
            minimum_charging_capacity_factor: 0.1,
            timestamp_share_threshold: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.grid_expansion_load_factors.mv_load_case_line, 0.5);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_toml_str(
            r#"
            [grid_expansion_load_factors]
            "mv_feed-in_case_line" = 0.8

            [integrity]
            max_line_length_km = 15.0
            "#,
        )
        .unwrap();
        assert_eq!(config.grid_expansion_load_factors.mv_feedin_case_line, 0.8);
        assert_eq!(config.grid_expansion_load_factors.mv_load_case_line, 0.5);
        assert_eq!(config.integrity.max_line_length_km, 15.0);
    }

    #[test]
    fn toml_roundtrip_of_defaults() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn voltage_level_by_capacity() {
        let grid = GridConnectionConfig::default();
        assert_eq!(grid.voltage_level_for(0.05), 7);
        assert_eq!(grid.voltage_level_for(0.15), 6);
        assert_eq!(grid.voltage_level_for(3.0), 5);
        assert_eq!(grid.voltage_level_for(25.0), 4);
    }

    #[test]
    fn q_sign_conventions() {
        assert_eq!(ReactivePowerMode::Inductive.q_sign(ComponentClass::Generator), -1.0);
        assert_eq!(ReactivePowerMode::Inductive.q_sign(ComponentClass::ConventionalLoad), 1.0);
        assert_eq!(ReactivePowerMode::Capacitive.q_sign(ComponentClass::StorageUnit), 1.0);
        assert_eq!(ReactivePowerMode::Capacitive.q_sign(ComponentClass::HeatPump), -1.0);
    }

    #[test]
    fn unknown_config_file_is_io_error() {
        let err = Config::from_file(Path::new("/nonexistent/gridplan.toml")).unwrap_err();
        assert!(matches!(err, GridError::Io(_)));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridplan.toml");
        std::fs::write(&path, "[integrity]\nmax_line_length_km = 12.5\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.integrity.max_line_length_km, 12.5);
        assert_eq!(config.grid_connection, GridConnectionConfig::default());
    }
}
