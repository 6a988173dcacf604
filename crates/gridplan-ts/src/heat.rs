//! Heat pump operation data.

use crate::frame::TimeSeriesFrame;
use crate::resample::{resample_frame, ResampleMethod};
use crate::timeseries::{ComponentTable, TimeSeries};
use anyhow::{Context, Result};
use chrono::Duration;
use gridplan_core::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Thermal storage attached to one heat pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalStorageUnit {
    /// Capacity in MWh
    pub capacity: f64,
    pub efficiency: f64,
    pub state_of_charge_initial: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThermalStorageRow {
    heat_pump: String,
    capacity: f64,
    efficiency: f64,
    state_of_charge_initial: f64,
}

/// COP and heat demand time series (columns are heat pump names) plus
/// thermal storage units.
#[derive(Debug, Clone, Default)]
pub struct HeatPumpData {
    pub cop: TimeSeriesFrame,
    /// Heat demand in MW
    pub heat_demand: TimeSeriesFrame,
    pub thermal_storage_units: BTreeMap<String, ThermalStorageUnit>,
}

impl HeatPumpData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set COP time series; every value must be positive.
    pub fn set_cop(&mut self, cop: TimeSeriesFrame) -> GridResult<()> {
        if let Some((name, _)) = cop
            .columns
            .iter()
            .find(|(_, v)| v.iter().any(|x| !(*x > 0.0)))
        {
            return Err(GridError::Validation(format!(
                "COP of heat pump {} must be positive.",
                name
            )));
        }
        self.cop = cop;
        Ok(())
    }

    pub fn set_heat_demand(&mut self, heat_demand: TimeSeriesFrame) -> GridResult<()> {
        if let Some((name, _)) = heat_demand
            .columns
            .iter()
            .find(|(_, v)| v.iter().any(|x| *x < 0.0))
        {
            return Err(GridError::Validation(format!(
                "Heat demand of heat pump {} must not be negative.",
                name
            )));
        }
        self.heat_demand = heat_demand;
        Ok(())
    }

    /// Electrical load of each heat pump with a heat demand, heat demand
    /// divided by COP.
    pub fn electrical_load(&self) -> GridResult<TimeSeriesFrame> {
        if self.heat_demand.index != self.cop.index && !self.heat_demand.is_empty() {
            return Err(GridError::Validation(
                "Heat demand and COP time series must share the time index.".to_string(),
            ));
        }
        let mut out = TimeSeriesFrame::new(self.heat_demand.index.clone());
        for (name, demand) in &self.heat_demand.columns {
            let cop = self.cop.column(name).ok_or_else(|| {
                GridError::Validation(format!("No COP time series given for heat pump {}.", name))
            })?;
            let load = demand.iter().zip(cop).map(|(d, c)| d / c).collect();
            out.insert(name.clone(), load)?;
        }
        Ok(out)
    }

    /// Write the electrical load of all heat pumps into the load time
    /// series, aligned with its time index.
    pub fn apply_to(&self, timeseries: &mut TimeSeries) -> GridResult<()> {
        let load = self.electrical_load()?.reindex(&timeseries.timeindex);
        for (name, values) in load.columns {
            timeseries.add_component_time_series(ComponentTable::Loads, &name, values, None)?;
        }
        Ok(())
    }

    pub fn resample(&mut self, method: ResampleMethod, freq: Duration) -> GridResult<()> {
        if !self.cop.is_empty() {
            self.cop = resample_frame(&self.cop, freq, method)?;
        }
        if !self.heat_demand.is_empty() {
            self.heat_demand = resample_frame(&self.heat_demand, freq, method)?;
        }
        Ok(())
    }

    /// Write `cop.csv`, `heat_demand.csv` and `thermal_storage_units.csv`
    /// for the non-empty parts.
    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        if !self.cop.is_empty() {
            self.cop.to_csv(&dir.join("cop.csv"))?;
        }
        if !self.heat_demand.is_empty() {
            self.heat_demand.to_csv(&dir.join("heat_demand.csv"))?;
        }
        if !self.thermal_storage_units.is_empty() {
            let path = dir.join("thermal_storage_units.csv");
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            for (heat_pump, unit) in &self.thermal_storage_units {
                writer.serialize(ThermalStorageRow {
                    heat_pump: heat_pump.clone(),
                    capacity: unit.capacity,
                    efficiency: unit.efficiency,
                    state_of_charge_initial: unit.state_of_charge_initial,
                })?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        let mut data = Self::new();
        let cop = dir.join("cop.csv");
        if cop.exists() {
            data.cop = TimeSeriesFrame::from_csv(&cop)?;
        }
        let demand = dir.join("heat_demand.csv");
        if demand.exists() {
            data.heat_demand = TimeSeriesFrame::from_csv(&demand)?;
        }
        let storage = dir.join("thermal_storage_units.csv");
        if storage.exists() {
            let mut reader = csv::Reader::from_path(&storage)
                .with_context(|| format!("opening {}", storage.display()))?;
            for row in reader.deserialize() {
                let row: ThermalStorageRow = row?;
                data.thermal_storage_units.insert(
                    row.heat_pump,
                    ThermalStorageUnit {
                        capacity: row.capacity,
                        efficiency: row.efficiency,
                        state_of_charge_initial: row.state_of_charge_initial,
                    },
                );
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{date_range, parse_timestamp};
    use tempfile::tempdir;

    fn data() -> HeatPumpData {
        let index = date_range(
            parse_timestamp("2011-01-01 00:00:00").unwrap(),
            2,
            Duration::hours(1),
        );
        let mut cop = TimeSeriesFrame::new(index.clone());
        cop.insert("Heat_Pump_LVGrid_1_1", vec![2.0, 4.0]).unwrap();
        let mut demand = TimeSeriesFrame::new(index);
        demand.insert("Heat_Pump_LVGrid_1_1", vec![0.01, 0.02]).unwrap();
        let mut data = HeatPumpData::new();
        data.set_cop(cop).unwrap();
        data.set_heat_demand(demand).unwrap();
        data
    }

    #[test]
    fn electrical_load_is_demand_over_cop() {
        let load = data().electrical_load().unwrap();
        assert_eq!(load.column("Heat_Pump_LVGrid_1_1").unwrap(), &[0.005, 0.005]);
    }

    #[test]
    fn missing_cop_is_an_error() {
        let mut data = data();
        data.cop.remove("Heat_Pump_LVGrid_1_1");
        assert!(data.electrical_load().is_err());
    }

    #[test]
    fn invalid_cop_rejected() {
        let mut data = data();
        let mut cop = data.cop.clone();
        cop.insert("Heat_Pump_LVGrid_1_1", vec![0.0, 3.0]).unwrap();
        assert!(data.set_cop(cop).is_err());
    }

    #[test]
    fn apply_to_time_series() {
        let data = data();
        let mut ts = TimeSeries::new();
        ts.set_timeindex(data.cop.index.clone());
        data.apply_to(&mut ts).unwrap();
        assert_eq!(
            ts.loads_active_power.column("Heat_Pump_LVGrid_1_1").unwrap(),
            &[0.005, 0.005]
        );
    }

    #[test]
    fn csv_roundtrip() {
        let mut data = data();
        data.thermal_storage_units.insert(
            "Heat_Pump_LVGrid_1_1".to_string(),
            ThermalStorageUnit {
                capacity: 0.05,
                efficiency: 0.9,
                state_of_charge_initial: 0.5,
            },
        );
        let dir = tempdir().unwrap();
        data.to_csv(dir.path()).unwrap();
        for file in ["cop.csv", "heat_demand.csv", "thermal_storage_units.csv"] {
            assert!(dir.path().join(file).exists(), "{} missing", file);
        }
        let read = HeatPumpData::from_csv(dir.path()).unwrap();
        assert_eq!(read.thermal_storage_units, data.thermal_storage_units);
        assert_eq!(read.cop.index, data.cop.index);
    }
}
