//! Time series requested by the overlying grid.

use crate::frame::TimeSeriesFrame;
use crate::resample::{resample_frame, ResampleMethod};
use anyhow::{Context, Result};
use chrono::Duration;
use gridplan_core::GridResult;
use std::fs;
use std::path::Path;

/// Flexibility dispatch set by the overlying (transmission) grid.
///
/// Single series are frames with one column; per-area series (district
/// heating) have one column per area.
#[derive(Debug, Clone, Default)]
pub struct OverlyingGrid {
    pub renewables_curtailment: TimeSeriesFrame,
    pub storage_units_active_power: TimeSeriesFrame,
    pub dsm_active_power: TimeSeriesFrame,
    pub electromobility_active_power: TimeSeriesFrame,
    pub heat_pump_decentral_active_power: TimeSeriesFrame,
    pub heat_pump_central_active_power: TimeSeriesFrame,
    pub geothermal_energy_feedin_district_heating: TimeSeriesFrame,
    pub solarthermal_energy_feedin_district_heating: TimeSeriesFrame,
}

pub const ATTRIBUTES: [&str; 8] = [
    "renewables_curtailment",
    "storage_units_active_power",
    "dsm_active_power",
    "electromobility_active_power",
    "heat_pump_decentral_active_power",
    "heat_pump_central_active_power",
    "geothermal_energy_feedin_district_heating",
    "solarthermal_energy_feedin_district_heating",
];

impl OverlyingGrid {
    pub fn new() -> Self {
        Self::default()
    }

    fn attributes_mut(&mut self) -> [&mut TimeSeriesFrame; 8] {
        [
            &mut self.renewables_curtailment,
            &mut self.storage_units_active_power,
            &mut self.dsm_active_power,
            &mut self.electromobility_active_power,
            &mut self.heat_pump_decentral_active_power,
            &mut self.heat_pump_central_active_power,
            &mut self.geothermal_energy_feedin_district_heating,
            &mut self.solarthermal_energy_feedin_district_heating,
        ]
    }

    fn attributes(&self) -> [&TimeSeriesFrame; 8] {
        [
            &self.renewables_curtailment,
            &self.storage_units_active_power,
            &self.dsm_active_power,
            &self.electromobility_active_power,
            &self.heat_pump_decentral_active_power,
            &self.heat_pump_central_active_power,
            &self.geothermal_energy_feedin_district_heating,
            &self.solarthermal_energy_feedin_district_heating,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.attributes().iter().all(|f| f.is_empty())
    }

    /// Write each non-empty series to `<attribute>.csv`.
    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (name, frame) in ATTRIBUTES.iter().zip(self.attributes()) {
            if !frame.is_empty() {
                frame.to_csv(&dir.join(format!("{}.csv", name)))?;
            }
        }
        Ok(())
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        let mut grid = Self::new();
        for (name, frame) in ATTRIBUTES.iter().zip(grid.attributes_mut()) {
            let path = dir.join(format!("{}.csv", name));
            if path.exists() {
                *frame = TimeSeriesFrame::from_csv(&path)?;
            }
        }
        Ok(grid)
    }

    pub fn resample(&mut self, method: ResampleMethod, freq: Duration) -> GridResult<()> {
        for frame in self.attributes_mut() {
            if !frame.is_empty() {
                *frame = resample_frame(frame, freq, method)?;
            }
        }
        Ok(())
    }
}
