//! # gridplan-algo: Power Flow and Grid Reinforcement
//!
//! Algorithms on top of a [`gridplan_core::Topology`] and its
//! [`gridplan_ts::TimeSeries`].
//!
//! ## Power flow
//!
//! [`analyze`] builds a per-unit network for the chosen [`AnalyzeMode`] and
//! solves a Newton-Raphson power flow for every time step:
//!
//! | Mode | Network |
//! |------|---------|
//! | [`AnalyzeMode::Mv`] | MV grid, LV grids aggregated at the MV side of their station |
//! | [`AnalyzeMode::MvLv`] | MV grid and MV/LV stations, LV grids aggregated at the LV side |
//! | [`AnalyzeMode::Lv`] | One LV grid with its station as slack |
//! | [`AnalyzeMode::Full`] | Everything |
//!
//! Time steps are solved in parallel with rayon (feature `desktop`).
//!
//! ## Reinforcement
//!
//! [`checks`] finds overloaded lines and stations and buses outside their
//! voltage band, [`reinforce::measures`] fixes them and [`reinforce()`] loops
//! over both until the grid is within limits. [`costs`] prices the changes.
//!
//! ## Example
//!
//! ```rust
//! use gridplan_algo::{analyze, reinforce, AnalyzeOptions, ReinforceOptions};
//! use gridplan_core::{synthetic, Case, Config};
//! use gridplan_ts::TimeSeries;
//!
//! let mut topology = synthetic::example_topology();
//! let config = Config::default();
//! let mut timeseries = TimeSeries::new();
//! timeseries
//!     .set_worst_case(&topology, &config, &[Case::LoadCase, Case::FeedInCase])
//!     .unwrap();
//!
//! let results = analyze(&topology, &timeseries, &config, &AnalyzeOptions::default()).unwrap();
//! assert_eq!(results.timesteps().len(), 4);
//!
//! let results = reinforce(&mut topology, &timeseries, &config, &ReinforceOptions::default()).unwrap();
//! assert!(results.equipment_changes.is_empty());
//! ```

pub mod analyze;
pub mod checks;
pub mod costs;
pub mod network;
pub mod power_flow;
pub mod reinforce;
pub mod results;
pub mod storage;

pub use analyze::{analyze, AnalyzeOptions, Troubleshooting};
pub use checks::{check_all, LineOverload, StationOverload, Violations, VoltageIssue};
pub use costs::grid_expansion_costs;
pub use network::{AnalyzeMode, PfNetwork};
pub use power_flow::{BranchFlow, PowerFlowSolution, PowerFlowSolver};
pub use reinforce::{reinforce, ReinforceMode, ReinforceOptions, TimestepSelection};
pub use results::{ChangeKind, EquipmentChange, ExpansionCost, Results, UnresolvedIssue};
pub use storage::{fifty_fifty_operation, integrate_storage, StoragePosition};
