//! Active and reactive power time series of all grid components.

use crate::frame::{date_range, TimeIndex, TimeSeriesFrame, TIMESTAMP_FORMAT};
use crate::resample::{resample_frame, ResampleMethod};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use gridplan_core::config::ReactivePowerMode;
use gridplan_core::{Case, ComponentClass, Config, Diagnostics, GridError, GridResult, Topology, VoltageLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Synthetic time step used in worst-case analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorstCase {
    #[serde(rename = "load_case_mv")]
    LoadCaseMv,
    #[serde(rename = "feed-in_case_mv")]
    FeedInCaseMv,
    #[serde(rename = "load_case_lv")]
    LoadCaseLv,
    #[serde(rename = "feed-in_case_lv")]
    FeedInCaseLv,
}

impl WorstCase {
    pub const ALL: [WorstCase; 4] = [
        WorstCase::LoadCaseMv,
        WorstCase::FeedInCaseMv,
        WorstCase::LoadCaseLv,
        WorstCase::FeedInCaseLv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorstCase::LoadCaseMv => "load_case_mv",
            WorstCase::FeedInCaseMv => "feed-in_case_mv",
            WorstCase::LoadCaseLv => "load_case_lv",
            WorstCase::FeedInCaseLv => "feed-in_case_lv",
        }
    }

    pub fn case(&self) -> Case {
        match self {
            WorstCase::LoadCaseMv | WorstCase::LoadCaseLv => Case::LoadCase,
            WorstCase::FeedInCaseMv | WorstCase::FeedInCaseLv => Case::FeedInCase,
        }
    }

    pub fn level(&self) -> VoltageLevel {
        match self {
            WorstCase::LoadCaseMv | WorstCase::FeedInCaseMv => VoltageLevel::Mv,
            WorstCase::LoadCaseLv | WorstCase::FeedInCaseLv => VoltageLevel::Lv,
        }
    }
}

/// Component table a time series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentTable {
    Loads,
    Generators,
    StorageUnits,
}

impl ComponentTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentTable::Loads => "loads",
            ComponentTable::Generators => "generators",
            ComponentTable::StorageUnits => "storage_units",
        }
    }
}

/// Overrides for [`TimeSeries::fixed_cosphi`]; unset values come from the
/// configuration of the component's voltage level.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosPhiSettings {
    pub power_factor: Option<f64>,
    pub mode: Option<ReactivePowerMode>,
}

/// Time series container. All frames share `timeindex`.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pub timeindex: TimeIndex,
    pub loads_active_power: TimeSeriesFrame,
    pub loads_reactive_power: TimeSeriesFrame,
    pub generators_active_power: TimeSeriesFrame,
    pub generators_reactive_power: TimeSeriesFrame,
    pub storage_units_active_power: TimeSeriesFrame,
    pub storage_units_reactive_power: TimeSeriesFrame,
    pub timeindex_worst_cases: BTreeMap<String, NaiveDateTime>,
}

const FRAME_NAMES: [&str; 6] = [
    "loads_active_power",
    "loads_reactive_power",
    "generators_active_power",
    "generators_reactive_power",
    "storage_units_active_power",
    "storage_units_reactive_power",
];

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    fn frames(&self) -> [(&'static str, &TimeSeriesFrame); 6] {
        [
            (FRAME_NAMES[0], &self.loads_active_power),
            (FRAME_NAMES[1], &self.loads_reactive_power),
            (FRAME_NAMES[2], &self.generators_active_power),
            (FRAME_NAMES[3], &self.generators_reactive_power),
            (FRAME_NAMES[4], &self.storage_units_active_power),
            (FRAME_NAMES[5], &self.storage_units_reactive_power),
        ]
    }

    fn frames_mut(&mut self) -> [&mut TimeSeriesFrame; 6] {
        [
            &mut self.loads_active_power,
            &mut self.loads_reactive_power,
            &mut self.generators_active_power,
            &mut self.generators_reactive_power,
            &mut self.storage_units_active_power,
            &mut self.storage_units_reactive_power,
        ]
    }

    pub fn active_power(&self, table: ComponentTable) -> &TimeSeriesFrame {
        match table {
            ComponentTable::Loads => &self.loads_active_power,
            ComponentTable::Generators => &self.generators_active_power,
            ComponentTable::StorageUnits => &self.storage_units_active_power,
        }
    }

    pub fn reactive_power(&self, table: ComponentTable) -> &TimeSeriesFrame {
        match table {
            ComponentTable::Loads => &self.loads_reactive_power,
            ComponentTable::Generators => &self.generators_reactive_power,
            ComponentTable::StorageUnits => &self.storage_units_reactive_power,
        }
    }

    fn frames_of_mut(&mut self, table: ComponentTable) -> (&mut TimeSeriesFrame, &mut TimeSeriesFrame) {
        match table {
            ComponentTable::Loads => (&mut self.loads_active_power, &mut self.loads_reactive_power),
            ComponentTable::Generators => (
                &mut self.generators_active_power,
                &mut self.generators_reactive_power,
            ),
            ComponentTable::StorageUnits => (
                &mut self.storage_units_active_power,
                &mut self.storage_units_reactive_power,
            ),
        }
    }

    /// Set the time index and align all frames with it. Rows not present in
    /// a frame are filled with zero.
    pub fn set_timeindex(&mut self, index: TimeIndex) {
        for frame in self.frames_mut() {
            *frame = frame.reindex(&index);
        }
        self.timeindex_worst_cases.retain(|_, ts| index.contains(ts));
        self.timeindex = index;
    }

    /// Build synthetic worst-case time steps for `cases`.
    ///
    /// Each case yields an MV and an LV time step, starting hourly at
    /// 1970-01-01. Active power is nominal power scaled with the configured
    /// factor for the time step's case and level; reactive power follows
    /// from the configured fixed power factors.
    pub fn set_worst_case(
        &mut self,
        topology: &Topology,
        config: &Config,
        cases: &[Case],
    ) -> GridResult<()> {
        let steps: Vec<WorstCase> = WorstCase::ALL
            .into_iter()
            .filter(|wc| cases.contains(&wc.case()))
            .collect();
        if steps.is_empty() {
            return Err(GridError::Validation(
                "At least one worst case must be given.".to_string(),
            ));
        }
        let start = NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| GridError::Other("invalid worst case start".to_string()))?;
        let index = date_range(start, steps.len(), Duration::hours(1));

        let factors = &config.worst_case_scale_factors;
        let mut loads = TimeSeriesFrame::new(index.clone());
        for load in topology.loads.values() {
            let values = steps
                .iter()
                .map(|wc| load.p_set * factors.get(wc.case(), wc.level()).load(load.kind, load.sector.as_deref()))
                .collect();
            loads.insert(load.name.clone(), values)?;
        }
        let mut generators = TimeSeriesFrame::new(index.clone());
        for generator in topology.generators.values() {
            let values = steps
                .iter()
                .map(|wc| generator.p_nom * factors.get(wc.case(), wc.level()).generator(&generator.kind))
                .collect();
            generators.insert(generator.name.clone(), values)?;
        }
        let mut storage = TimeSeriesFrame::new(index.clone());
        for unit in topology.storage_units.values() {
            let values = steps
                .iter()
                .map(|wc| unit.p_nom * factors.get(wc.case(), wc.level()).storage)
                .collect();
            storage.insert(unit.name.clone(), values)?;
        }

        self.timeindex = index.clone();
        self.loads_active_power = loads;
        self.generators_active_power = generators;
        self.storage_units_active_power = storage;
        self.loads_reactive_power = TimeSeriesFrame::new(index.clone());
        self.generators_reactive_power = TimeSeriesFrame::new(index.clone());
        self.storage_units_reactive_power = TimeSeriesFrame::new(index.clone());
        self.timeindex_worst_cases = steps
            .iter()
            .zip(&index)
            .map(|(wc, ts)| (wc.as_str().to_string(), *ts))
            .collect();

        self.fixed_cosphi(
            topology,
            config,
            &[
                ComponentClass::Generator,
                ComponentClass::ConventionalLoad,
                ComponentClass::ChargingPoint,
                ComponentClass::HeatPump,
                ComponentClass::StorageUnit,
            ],
            CosPhiSettings::default(),
        )?;
        info!(steps = steps.len(), "set worst case time series");
        Ok(())
    }

    fn require_profiles(&self, profiles: &TimeSeriesFrame) -> GridResult<TimeSeriesFrame> {
        if self.timeindex.is_empty() {
            return Err(GridError::Validation(
                "The time index must be set before predefined time series can be used."
                    .to_string(),
            ));
        }
        profiles.select_timesteps(&self.timeindex)
    }

    /// Active power of solar and wind generators from normalized profiles.
    ///
    /// A generator uses column `<type>_<weather_cell_id>` if present and
    /// column `<type>` otherwise.
    pub fn predefined_fluctuating_generators(
        &mut self,
        topology: &Topology,
        profiles: &TimeSeriesFrame,
    ) -> GridResult<()> {
        let profiles = self.require_profiles(profiles)?;
        for generator in topology.generators.values().filter(|g| g.is_fluctuating()) {
            let by_cell = generator
                .weather_cell_id
                .and_then(|cell| profiles.column(&format!("{}_{}", generator.kind, cell)));
            let profile = by_cell
                .or_else(|| profiles.column(&generator.kind))
                .ok_or_else(|| {
                    GridError::Validation(format!(
                        "No time series for generator type {} and weather cell {:?} given.",
                        generator.kind, generator.weather_cell_id
                    ))
                })?;
            let values = profile.iter().map(|v| v * generator.p_nom).collect();
            self.generators_active_power.index = self.timeindex.clone();
            self.generators_active_power.insert(generator.name.clone(), values)?;
        }
        Ok(())
    }

    /// Active power of all other generators from per-type profiles, falling
    /// back to column `other`.
    pub fn predefined_dispatchable_generators(
        &mut self,
        topology: &Topology,
        profiles: &TimeSeriesFrame,
    ) -> GridResult<()> {
        let profiles = self.require_profiles(profiles)?;
        for generator in topology.generators.values().filter(|g| !g.is_fluctuating()) {
            let profile = profiles
                .column(&generator.kind)
                .or_else(|| profiles.column("other"))
                .ok_or_else(|| {
                    GridError::Validation(format!(
                        "No time series for generator type {} given and no time series \
                         for type 'other' either.",
                        generator.kind
                    ))
                })?;
            let values = profile.iter().map(|v| v * generator.p_nom).collect();
            self.generators_active_power.index = self.timeindex.clone();
            self.generators_active_power.insert(generator.name.clone(), values)?;
        }
        Ok(())
    }

    /// Active power of conventional loads from per-sector profiles that are
    /// normalized to an annual consumption of 1 MWh.
    pub fn predefined_conventional_loads(
        &mut self,
        topology: &Topology,
        profiles: &TimeSeriesFrame,
    ) -> GridResult<()> {
        let profiles = self.require_profiles(profiles)?;
        let loads = topology
            .loads
            .values()
            .filter(|l| l.kind == gridplan_core::LoadKind::ConventionalLoad);
        for load in loads {
            let sector = load.sector.as_deref().unwrap_or("other");
            let profile = profiles.column(sector).ok_or_else(|| {
                GridError::Validation(format!("No load profile given for sector {}.", sector))
            })?;
            let values = profile.iter().map(|v| v * load.annual_consumption).collect();
            self.loads_active_power.index = self.timeindex.clone();
            self.loads_active_power.insert(load.name.clone(), values)?;
        }
        Ok(())
    }

    /// Active power of charging points from per-use-case profiles
    /// normalized to the charging point's nominal power.
    pub fn predefined_charging_points(
        &mut self,
        topology: &Topology,
        profiles: &TimeSeriesFrame,
    ) -> GridResult<()> {
        let profiles = self.require_profiles(profiles)?;
        let points = topology
            .loads
            .values()
            .filter(|l| l.kind == gridplan_core::LoadKind::ChargingPoint);
        for point in points {
            let use_case = point.sector.as_deref().unwrap_or("public");
            let profile = profiles.column(use_case).ok_or_else(|| {
                GridError::Validation(format!(
                    "No charging profile given for use case {}.",
                    use_case
                ))
            })?;
            let values = profile.iter().map(|v| v * point.p_set).collect();
            self.loads_active_power.index = self.timeindex.clone();
            self.loads_active_power.insert(point.name.clone(), values)?;
        }
        Ok(())
    }

    /// Reactive power from active power with a fixed power factor.
    ///
    /// Only components of the given classes that already have an active
    /// power time series are set.
    pub fn fixed_cosphi(
        &mut self,
        topology: &Topology,
        config: &Config,
        classes: &[ComponentClass],
        settings: CosPhiSettings,
    ) -> GridResult<()> {
        if let Some(pf) = settings.power_factor {
            if !(0.0..=1.0).contains(&pf) || pf == 0.0 {
                return Err(GridError::Validation(format!(
                    "Power factor must be in (0, 1], got {}.",
                    pf
                )));
            }
        }
        let q_factor = |bus: &str, class: ComponentClass| -> f64 {
            let level = topology.voltage_level(bus).unwrap_or(VoltageLevel::Mv);
            let pf = settings
                .power_factor
                .unwrap_or_else(|| config.reactive_power_factor.get(level, class));
            let mode = settings
                .mode
                .unwrap_or_else(|| config.reactive_power_mode.get(level, class));
            pf.acos().tan() * mode.q_sign(class)
        };

        let mut loads_q = Vec::new();
        for load in topology.loads.values() {
            let class = ComponentClass::from(load.kind);
            if !classes.contains(&class) {
                continue;
            }
            if let Some(p) = self.loads_active_power.column(&load.name) {
                let factor = q_factor(&load.bus, class);
                loads_q.push((load.name.clone(), p.iter().map(|v| v * factor).collect()));
            }
        }
        let mut generators_q = Vec::new();
        if classes.contains(&ComponentClass::Generator) {
            for generator in topology.generators.values() {
                if let Some(p) = self.generators_active_power.column(&generator.name) {
                    let factor = q_factor(&generator.bus, ComponentClass::Generator);
                    generators_q.push((generator.name.clone(), p.iter().map(|v| v * factor).collect()));
                }
            }
        }
        let mut storage_q = Vec::new();
        if classes.contains(&ComponentClass::StorageUnit) {
            for unit in topology.storage_units.values() {
                if let Some(p) = self.storage_units_active_power.column(&unit.name) {
                    let factor = q_factor(&unit.bus, ComponentClass::StorageUnit);
                    storage_q.push((unit.name.clone(), p.iter().map(|v| v * factor).collect()));
                }
            }
        }

        let index = self.timeindex.clone();
        for (frame, values) in [
            (&mut self.loads_reactive_power, loads_q),
            (&mut self.generators_reactive_power, generators_q),
            (&mut self.storage_units_reactive_power, storage_q),
        ] {
            if frame.index != index {
                *frame = frame.reindex(&index);
            }
            for (name, q) in values {
                frame.insert(name, q)?;
            }
        }
        Ok(())
    }

    /// Resample all time series and the time index to `freq`.
    pub fn resample(&mut self, method: ResampleMethod, freq: Duration) -> GridResult<()> {
        let new_index = resample_frame(&TimeSeriesFrame::new(self.timeindex.clone()), freq, method)?.index;
        for frame in self.frames_mut() {
            *frame = if frame.is_empty() {
                TimeSeriesFrame::new(new_index.clone())
            } else {
                resample_frame(frame, freq, method)?.reindex(&new_index)
            };
        }
        self.timeindex_worst_cases.retain(|_, ts| new_index.contains(ts));
        debug!(steps = new_index.len(), "resampled time series");
        self.timeindex = new_index;
        Ok(())
    }

    /// Total load minus generation and storage discharge per time step.
    pub fn residual_load(&self) -> Vec<f64> {
        (0..self.timeindex.len())
            .map(|row| {
                self.loads_active_power.sum_row(row)
                    - self.generators_active_power.sum_row(row)
                    - self.storage_units_active_power.sum_row(row)
            })
            .collect()
    }

    /// Case of each time step: worst-case steps keep their own case, other
    /// steps are a load case if the residual load is not negative.
    pub fn timesteps_load_feedin_case(&self) -> BTreeMap<NaiveDateTime, Case> {
        let worst: BTreeMap<NaiveDateTime, Case> = self
            .timeindex_worst_cases
            .iter()
            .filter_map(|(name, ts)| Case::parse(name).map(|c| (*ts, c)))
            .collect();
        self.timeindex
            .iter()
            .zip(self.residual_load())
            .map(|(ts, residual)| {
                let case = worst.get(ts).copied().unwrap_or(if residual >= 0.0 {
                    Case::LoadCase
                } else {
                    Case::FeedInCase
                });
                (*ts, case)
            })
            .collect()
    }

    /// Insert the active and reactive power series of one component.
    pub fn add_component_time_series(
        &mut self,
        table: ComponentTable,
        name: &str,
        active: Vec<f64>,
        reactive: Option<Vec<f64>>,
    ) -> GridResult<()> {
        let index = self.timeindex.clone();
        let (p, q) = self.frames_of_mut(table);
        p.index = index.clone();
        p.insert(name, active)?;
        if let Some(reactive) = reactive {
            q.index = index;
            q.insert(name, reactive)?;
        }
        Ok(())
    }

    /// Drop the time series of the named components.
    pub fn drop_component_time_series(&mut self, table: ComponentTable, names: &[String]) {
        let (p, q) = self.frames_of_mut(table);
        for name in names {
            p.remove(name);
            q.remove(name);
        }
    }

    /// Check that every component has active and reactive power time series,
    /// that no series belongs to an unknown component and that all values
    /// are finite.
    pub fn check_integrity(&self, topology: &Topology) -> Diagnostics {
        let mut diag = Diagnostics::new();
        let tables: [(ComponentTable, Vec<&str>); 3] = [
            (ComponentTable::Loads, topology.loads.keys().map(String::as_str).collect()),
            (
                ComponentTable::Generators,
                topology.generators.keys().map(String::as_str).collect(),
            ),
            (
                ComponentTable::StorageUnits,
                topology.storage_units.keys().map(String::as_str).collect(),
            ),
        ];
        for (table, names) in &tables {
            for (kind, frame) in [
                ("active", self.active_power(*table)),
                ("reactive", self.reactive_power(*table)),
            ] {
                let missing: Vec<&str> = names
                    .iter()
                    .copied()
                    .filter(|n| frame.column(n).is_none())
                    .collect();
                if !missing.is_empty() {
                    let message = format!(
                        "The following {} have missing {} power time series: {}.",
                        table.as_str(),
                        kind,
                        missing.join(", ")
                    );
                    diag.add_warning("missing_time_series", &message);
                }
                let unknown: Vec<&str> = frame
                    .column_names()
                    .filter(|c| !names.contains(c))
                    .collect();
                if !unknown.is_empty() {
                    let message = format!(
                        "The following {} {} power time series belong to components that \
                         are not in the topology: {}.",
                        table.as_str(),
                        kind,
                        unknown.join(", ")
                    );
                    diag.add_warning("unknown_time_series", &message);
                }
            }
        }
        for (name, frame) in self.frames() {
            if frame.is_empty() {
                continue;
            }
            if frame.index != self.timeindex {
                diag.add_error(
                    "time_index",
                    &format!("Time index of {} does not match the time index.", name),
                );
            }
            let invalid: Vec<&str> = frame
                .columns
                .iter()
                .filter(|(_, v)| v.iter().any(|x| !x.is_finite()))
                .map(|(k, _)| k.as_str())
                .collect();
            if !invalid.is_empty() {
                diag.add_error(
                    "invalid_values",
                    &format!("{} contains missing or infinite values for: {}.", name, invalid.join(", ")),
                );
            }
        }
        diag
    }

    /// Write every non-empty frame to `<dir>/<frame name>.csv`.
    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (name, frame) in self.frames() {
            if !frame.is_empty() {
                frame.to_csv(&dir.join(format!("{}.csv", name)))?;
            }
        }
        if !self.timeindex_worst_cases.is_empty() {
            let path = dir.join("timeindex_worst_cases.csv");
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            writer.write_record(["case", "timestamp"])?;
            for (case, ts) in &self.timeindex_worst_cases {
                writer.write_record([case.as_str(), &ts.format(TIMESTAMP_FORMAT).to_string()])?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    /// Read frames written by [`TimeSeries::to_csv`]. The time index is taken
    /// from the first frame found.
    pub fn from_csv(dir: &Path) -> Result<Self> {
        let mut ts = TimeSeries::new();
        let mut index: Option<TimeIndex> = None;
        for (name, frame) in FRAME_NAMES.iter().zip(ts.frames_mut()) {
            let path = dir.join(format!("{}.csv", name));
            if path.exists() {
                *frame = TimeSeriesFrame::from_csv(&path)?;
                index.get_or_insert_with(|| frame.index.clone());
            }
        }
        let index = index.unwrap_or_default();
        ts.set_timeindex(index);

        let path = dir.join("timeindex_worst_cases.csv");
        if path.exists() {
            let mut reader =
                csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
            for record in reader.records() {
                let record = record?;
                let case = record.get(0).unwrap_or_default().to_string();
                let raw = record.get(1).unwrap_or_default();
                ts.timeindex_worst_cases
                    .insert(case, crate::frame::parse_timestamp(raw)?);
            }
        }
        Ok(ts)
    }
}
