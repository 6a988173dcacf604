//! The [`GridStudy`] object.

use crate::generators::{import_generators, GeneratorImport, GeneratorRecord};
use crate::manifest::{load_manifest, write_manifest, Part, StudyManifest};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use gridplan_algo::{
    analyze, fifty_fifty_operation, integrate_storage, reinforce, AnalyzeOptions,
    ReinforceOptions, Results, StoragePosition,
};
use gridplan_core::{
    Case, ComponentClass, Config, Diagnostics, GridResult, Topology, TopologyGraph,
};
use gridplan_emob::{
    apply_charging_strategy, distribute_charging_demand, integrate_charging_parks,
    ChargingStrategy, DistributionMode, Electromobility,
};
use gridplan_io::{export_topology, import_topology};
use gridplan_ts::{
    ComponentTable, CosPhiSettings, HeatPumpData, OverlyingGrid, ResampleMethod, TimeIndex,
    TimeSeries, TimeSeriesFrame,
};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Normalized profiles for [`GridStudy::set_time_series_active_power_predefined`].
/// Unset profiles leave the respective time series untouched.
#[derive(Debug, Clone, Default)]
pub struct PredefinedProfiles {
    /// Per type (`solar`, `wind`) or type and weather cell (`solar_1122`)
    pub fluctuating_generators: Option<TimeSeriesFrame>,
    /// Per type with `other` as fallback
    pub dispatchable_generators: Option<TimeSeriesFrame>,
    /// Per sector, normalized to 1 MWh annual consumption
    pub conventional_loads: Option<TimeSeriesFrame>,
    /// Per use case
    pub charging_points: Option<TimeSeriesFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmobImportOptions {
    pub mode: DistributionMode,
    pub seed: u64,
}

impl Default for EmobImportOptions {
    fn default() -> Self {
        Self {
            mode: DistributionMode::UserFriendly,
            seed: 42,
        }
    }
}

/// A grid together with its time series, results and additional data.
#[derive(Debug, Clone, Default)]
pub struct GridStudy {
    pub topology: Topology,
    pub timeseries: TimeSeries,
    pub results: Results,
    pub electromobility: Option<Electromobility>,
    pub heat_pump: HeatPumpData,
    pub overlying_grid: OverlyingGrid,
    pub config: Config,
}

impl GridStudy {
    pub fn new(topology: Topology, config: Config) -> Self {
        Self {
            topology,
            config,
            ..Self::default()
        }
    }

    /// Study of the grid stored as CSV tables in `dir`. Integrity findings of
    /// the import are logged.
    pub fn from_csv_dir(dir: &Path, config: Config) -> Result<Self> {
        let imported = import_topology(dir, &config.integrity)?;
        for issue in &imported.diagnostics.issues {
            warn!("{}", issue);
        }
        Ok(Self::new(imported.topology, config))
    }

    pub fn set_timeindex(&mut self, index: TimeIndex) {
        self.timeseries.set_timeindex(index);
    }

    pub fn set_time_series_worst_case_analysis(&mut self, cases: &[Case]) -> GridResult<()> {
        self.timeseries
            .set_worst_case(&self.topology, &self.config, cases)
    }

    /// Active power from normalized profiles. Without a time index the index
    /// of the first given profile is used.
    pub fn set_time_series_active_power_predefined(
        &mut self,
        profiles: &PredefinedProfiles,
    ) -> GridResult<()> {
        if self.timeseries.timeindex.is_empty() {
            let first = [
                &profiles.fluctuating_generators,
                &profiles.dispatchable_generators,
                &profiles.conventional_loads,
                &profiles.charging_points,
            ]
            .into_iter()
            .flatten()
            .next();
            if let Some(frame) = first {
                self.timeseries.set_timeindex(frame.index.clone());
            }
        }
        let topo = &self.topology;
        if let Some(p) = &profiles.fluctuating_generators {
            self.timeseries.predefined_fluctuating_generators(topo, p)?;
        }
        if let Some(p) = &profiles.dispatchable_generators {
            self.timeseries.predefined_dispatchable_generators(topo, p)?;
        }
        if let Some(p) = &profiles.conventional_loads {
            self.timeseries.predefined_conventional_loads(topo, p)?;
        }
        if let Some(p) = &profiles.charging_points {
            self.timeseries.predefined_charging_points(topo, p)?;
        }
        Ok(())
    }

    /// Reactive power with fixed power factors. All component classes when
    /// `classes` is empty.
    pub fn set_time_series_reactive_power_control(
        &mut self,
        classes: &[ComponentClass],
        settings: CosPhiSettings,
    ) -> GridResult<()> {
        let all = [
            ComponentClass::Generator,
            ComponentClass::ConventionalLoad,
            ComponentClass::ChargingPoint,
            ComponentClass::HeatPump,
            ComponentClass::StorageUnit,
        ];
        let classes = if classes.is_empty() { &all[..] } else { classes };
        self.timeseries
            .fixed_cosphi(&self.topology, &self.config, classes, settings)
    }

    /// Resample time series, heat pump data and overlying grid to `freq`.
    pub fn resample_timeseries(&mut self, method: ResampleMethod, freq: Duration) -> GridResult<()> {
        self.timeseries.resample(method, freq)?;
        if !self.heat_pump.cop.is_empty() || !self.heat_pump.heat_demand.is_empty() {
            self.heat_pump.resample(method, freq)?;
        }
        if !self.overlying_grid.is_empty() {
            self.overlying_grid.resample(method, freq)?;
        }
        Ok(())
    }

    pub fn import_generators(
        &mut self,
        records: &[GeneratorRecord],
        remove_missing: bool,
    ) -> GridResult<GeneratorImport> {
        import_generators(
            &mut self.topology,
            &mut self.timeseries,
            records,
            remove_missing,
            &self.config.grid_connection,
        )
    }

    /// Import mobility data, allocate it to charging parks and connect the
    /// used parks to the grid.
    pub fn import_electromobility(
        &mut self,
        simbev_dir: &Path,
        tracbev_dir: &Path,
        options: EmobImportOptions,
    ) -> Result<Vec<String>> {
        let mut emob = gridplan_emob::import_electromobility(
            simbev_dir,
            tracbev_dir,
            &self.config.electromobility,
        )?;
        distribute_charging_demand(
            &mut emob,
            &self.topology,
            options.mode,
            options.seed,
            &self.config.electromobility,
        )?;
        let added =
            integrate_charging_parks(&mut emob, &mut self.topology, &self.config.grid_connection)?;
        self.electromobility = Some(emob);
        Ok(added)
    }

    /// Charging time series of all integrated charging parks. Reactive power
    /// is zero.
    pub fn apply_charging_strategy(&mut self, strategy: ChargingStrategy) -> GridResult<()> {
        let Some(emob) = &self.electromobility else {
            return Err(gridplan_core::GridError::Validation(
                "No electromobility data. Import electromobility first.".to_string(),
            ));
        };
        if self.timeseries.timeindex.is_empty() {
            return Err(gridplan_core::GridError::Validation(
                "The time index must be set before a charging strategy can be applied.".to_string(),
            ));
        }
        let charging_points: Vec<String> = emob.integrated_charging_parks.values().cloned().collect();
        self.timeseries
            .drop_component_time_series(ComponentTable::Loads, &charging_points);
        let residual = self.timeseries.residual_load();
        let frame = apply_charging_strategy(
            emob,
            strategy,
            &self.timeseries.timeindex,
            Some(residual.as_slice()),
            &self.config.electromobility,
        )?;
        for (name, values) in frame.columns {
            let zeros = vec![0.0; values.len()];
            self.timeseries
                .add_component_time_series(ComponentTable::Loads, &name, values, Some(zeros))?;
        }
        Ok(())
    }

    /// Add a storage unit. With time series set, it is operated to follow
    /// generation.
    pub fn integrate_storage(
        &mut self,
        position: StoragePosition,
        p_nom: f64,
        max_hours: f64,
    ) -> GridResult<String> {
        let name = integrate_storage(&mut self.topology, position, p_nom, max_hours, &self.config)?;
        if !self.timeseries.timeindex.is_empty() {
            fifty_fifty_operation(&self.topology, &mut self.timeseries, &name)?;
        }
        Ok(name)
    }

    pub fn analyze(&mut self, options: &AnalyzeOptions) -> GridResult<&Results> {
        let mut results = analyze(&self.topology, &self.timeseries, &self.config, options)?;
        // keep reinforcement results of an earlier run
        results.equipment_changes = std::mem::take(&mut self.results.equipment_changes);
        results.grid_expansion_costs = std::mem::take(&mut self.results.grid_expansion_costs);
        results.unresolved_issues = std::mem::take(&mut self.results.unresolved_issues);
        results.measures = std::mem::take(&mut self.results.measures);
        self.results = results;
        Ok(&self.results)
    }

    pub fn reinforce(&mut self, options: &ReinforceOptions) -> GridResult<&Results> {
        self.results = reinforce(&mut self.topology, &self.timeseries, &self.config, options)?;
        Ok(&self.results)
    }

    pub fn to_graph(&self) -> TopologyGraph {
        self.topology.to_graph()
    }

    /// Integrity of the topology and of the time series against it.
    pub fn check_integrity(&self) -> Diagnostics {
        let mut diagnostics = self.topology.check_integrity(&self.config.integrity);
        if !self.timeseries.timeindex.is_empty() {
            diagnostics.merge(self.timeseries.check_integrity(&self.topology));
        }
        diagnostics
    }

    /// Save `parts` (all when empty) to subdirectories of `dir`. Parts without
    /// data are skipped.
    pub fn save(&self, dir: &Path, parts: &[Part]) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let parts = if parts.is_empty() { &Part::ALL[..] } else { parts };
        let mut saved = Vec::new();
        for part in parts {
            let target = dir.join(part.dir_name());
            let written = match part {
                Part::Topology => {
                    export_topology(&self.topology, &target)?;
                    true
                }
                Part::Timeseries if !self.timeseries.timeindex.is_empty() => {
                    self.timeseries.to_csv(&target)?;
                    true
                }
                Part::Results if self.results.has_power_flow() || !self.results.equipment_changes.is_empty() => {
                    self.results.to_csv(&target)?;
                    true
                }
                Part::Electromobility => match &self.electromobility {
                    Some(emob) => {
                        emob.to_csv(&target)?;
                        true
                    }
                    None => false,
                },
                Part::HeatPump if !self.heat_pump.cop.is_empty() || !self.heat_pump.heat_demand.is_empty() => {
                    self.heat_pump.to_csv(&target)?;
                    true
                }
                Part::OverlyingGrid if !self.overlying_grid.is_empty() => {
                    self.overlying_grid.to_csv(&target)?;
                    true
                }
                _ => false,
            };
            if written {
                saved.push(*part);
            }
        }
        saved.sort();
        saved.dedup();
        write_manifest(
            dir,
            &StudyManifest {
                created_at: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                mv_grid_id: self.topology.mv_grid_id,
                parts: saved.clone(),
            },
        )?;
        info!(path = %dir.display(), parts = ?saved, "saved grid study");
        Ok(())
    }

    /// Load a study written by [`GridStudy::save`].
    pub fn load(dir: &Path, config: Config) -> Result<Self> {
        let manifest = load_manifest(dir)?;
        if !manifest.parts.contains(&Part::Topology) {
            anyhow::bail!("Saved study in {} has no topology.", dir.display());
        }
        let mut study = Self::from_csv_dir(&dir.join(Part::Topology.dir_name()), config)?;
        for part in &manifest.parts {
            let source = dir.join(part.dir_name());
            match part {
                Part::Topology => {}
                Part::Timeseries => study.timeseries = TimeSeries::from_csv(&source)?,
                Part::Results => study.results = Results::from_csv(&source)?,
                Part::Electromobility => {
                    study.electromobility = Some(Electromobility::from_csv(&source)?)
                }
                Part::HeatPump => study.heat_pump = HeatPumpData::from_csv(&source)?,
                Part::OverlyingGrid => study.overlying_grid = OverlyingGrid::from_csv(&source)?,
            }
        }
        info!(path = %dir.display(), parts = ?manifest.parts, "loaded grid study");
        Ok(study)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_algo::ChangeKind;
    use gridplan_core::synthetic;
    use gridplan_ts::date_range;
    use tempfile::tempdir;

    fn study() -> GridStudy {
        GridStudy::new(synthetic::example_topology(), Config::default())
    }

    #[test]
    fn worst_case_analysis_and_reinforcement() {
        let mut study = study();
        study
            .topology
            .loads
            .get_mut("Conventional_Load_LVGrid_1_residential_3")
            .unwrap()
            .p_set = 0.4;
        study
            .set_time_series_worst_case_analysis(&[Case::LoadCase, Case::FeedInCase])
            .unwrap();
        assert!(!study.check_integrity().has_errors());

        let results = study.reinforce(&ReinforceOptions::default()).unwrap();
        assert!(results
            .equipment_changes
            .iter()
            .any(|c| c.name == "Line_LVGrid_1_building_3" && c.change == ChangeKind::Added));
        assert!(study.results.total_costs() > 0.0);

        // analysis after reinforcement keeps the expansion results
        study.analyze(&AnalyzeOptions::default()).unwrap();
        assert!(!study.results.equipment_changes.is_empty());
    }

    #[test]
    fn predefined_profiles_set_the_time_index() {
        let mut study = study();
        let start = gridplan_ts::parse_timestamp("2011-01-01 00:00:00").unwrap();
        let index = date_range(start, 4, Duration::hours(1));
        let mut generation = TimeSeriesFrame::new(index.clone());
        generation.insert("solar", vec![0.0, 0.2, 0.6, 0.1]).unwrap();
        generation.insert("wind", vec![0.5, 0.4, 0.3, 0.2]).unwrap();

        study
            .set_time_series_active_power_predefined(&PredefinedProfiles {
                fluctuating_generators: Some(generation),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(study.timeseries.timeindex, index);
        let wind = study
            .timeseries
            .generators_active_power
            .column("Generator_MVGrid_1_wind_1")
            .unwrap();
        assert!((wind[0] - 0.75).abs() < 1e-12);

        study
            .set_time_series_reactive_power_control(&[], CosPhiSettings::default())
            .unwrap();
        assert!(study
            .timeseries
            .generators_reactive_power
            .column("Generator_MVGrid_1_wind_1")
            .is_some());

        study
            .resample_timeseries(ResampleMethod::Ffill, Duration::minutes(15))
            .unwrap();
        assert_eq!(study.timeseries.timeindex.len(), 16);
    }

    #[test]
    fn charging_strategy_needs_electromobility() {
        let mut study = study();
        assert!(study.apply_charging_strategy(ChargingStrategy::Dumb).is_err());
    }

    #[test]
    fn storage_follows_generation() {
        let mut study = study();
        study
            .set_time_series_worst_case_analysis(&[Case::FeedInCase])
            .unwrap();
        let name = study
            .integrate_storage(StoragePosition::HvMvSubstationBusbar, 0.5, 4.0)
            .unwrap();
        let p = study.timeseries.storage_units_active_power.column(&name).unwrap();
        assert!(p.iter().all(|v| v.abs() == 0.5));
    }

    #[test]
    fn save_and_load_selected_parts() {
        let mut study = study();
        study
            .set_time_series_worst_case_analysis(&[Case::LoadCase])
            .unwrap();
        study.analyze(&AnalyzeOptions::default()).unwrap();

        let dir = tempdir().unwrap();
        study
            .save(dir.path(), &[Part::Topology, Part::Results, Part::HeatPump])
            .unwrap();
        assert!(dir.path().join("results").is_dir());
        assert!(!dir.path().join("timeseries").exists());
        assert!(!dir.path().join("heat_pump").exists());

        let loaded = GridStudy::load(dir.path(), Config::default()).unwrap();
        assert_eq!(loaded.topology.buses, study.topology.buses);
        assert_eq!(loaded.results.timesteps(), study.results.timesteps());
        assert!(loaded.timeseries.timeindex.is_empty());
    }

    #[test]
    fn load_without_manifest_fails() {
        let dir = tempdir().unwrap();
        assert!(GridStudy::load(dir.path(), Config::default()).is_err());
    }
}
