//! Time series for grid studies.
//!
//! [`TimeSeries`] holds active and reactive power of all loads, generators
//! and storage units on one time index. It can be filled with worst-case
//! time steps, from normalized profiles or from CSV files. [`HeatPumpData`]
//! and [`OverlyingGrid`] hold the time series of heat pumps and of the
//! overlying grid.

pub mod frame;
pub mod heat;
pub mod overlying_grid;
pub mod resample;
pub mod timeseries;

pub use frame::{date_range, parse_timestamp, TimeIndex, TimeSeriesFrame};
pub use heat::{HeatPumpData, ThermalStorageUnit};
pub use overlying_grid::OverlyingGrid;
pub use resample::{parse_frequency, resample_frame, ResampleMethod};
pub use timeseries::{ComponentTable, CosPhiSettings, TimeSeries, WorstCase};
