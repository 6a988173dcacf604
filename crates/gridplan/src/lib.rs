//! # gridplan
//!
//! Distribution grid studies in one object. A [`GridStudy`] holds the grid
//! topology, its time series, analysis and reinforcement results and optional
//! electromobility, heat pump and overlying grid data.
//!
//! ```rust
//! use gridplan::GridStudy;
//! use gridplan_algo::ReinforceOptions;
//! use gridplan_core::{synthetic, Case, Config};
//!
//! let mut study = GridStudy::new(synthetic::example_topology(), Config::default());
//! study.set_time_series_worst_case_analysis(&[Case::LoadCase, Case::FeedInCase])?;
//! let results = study.reinforce(&ReinforceOptions::default())?;
//! assert!(results.unresolved_issues.is_empty());
//! # Ok::<(), gridplan_core::GridError>(())
//! ```

pub mod generators;
pub mod manifest;
pub mod study;

pub use generators::{import_generators, GeneratorImport, GeneratorRecord};
pub use manifest::{load_manifest, write_manifest, Part, StudyManifest, MANIFEST_FILE};
pub use study::{EmobImportOptions, GridStudy, PredefinedProfiles};

// Re-exports so that studies can be set up from this crate alone
pub use gridplan_algo::{AnalyzeMode, AnalyzeOptions, ReinforceOptions, Results, StoragePosition};
pub use gridplan_core::{Case, ComponentClass, Config, GridError, GridResult, Topology};
pub use gridplan_emob::{ChargingStrategy, DistributionMode};
pub use gridplan_ts::{CosPhiSettings, ResampleMethod, TimeSeries, TimeSeriesFrame};
