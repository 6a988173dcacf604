//! # gridplan-io: Grid Data on Disk
//!
//! CSV import and export of grid topologies and equipment catalogues, and a
//! JSON summary of analysis results.
//!
//! ```rust,no_run
//! use gridplan_io::{export_topology, import_topology};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let imported = import_topology(Path::new("ding0_grid"), &Default::default())?;
//!     println!("{}", imported.stats);
//!     if imported.diagnostics.has_issues() {
//!         println!("{}", imported.diagnostics);
//!     }
//!     export_topology(&imported.topology, Path::new("copy"))?;
//!     Ok(())
//! }
//! ```

pub mod equipment;
pub mod export;
pub mod tables;
pub mod topology;

pub use equipment::{export_equipment, import_equipment};
pub use export::{ResultsExport, ResultsSummary};
pub use topology::{export_topology, import_topology, TopologyImport};
