//! # gridplan-core: Distribution Grid Topology
//!
//! Data model for an MV distribution grid and the LV grids below it.
//!
//! ## Design
//!
//! The topology is a set of name-keyed tables (buses, lines, transformers,
//! loads, generators, storage units, switches). Everything else is derived:
//! - **Grid views** ([`grids::Grid`]) filter the tables by MV / LV grid
//! - **Switches** are lines whose terminal moves between two buses
//! - **Graphs** ([`graph_utils::TopologyGraph`]) are built on demand with petgraph
//!
//! ## Quick Start
//!
//! ```rust
//! use gridplan_core::{synthetic, LoadKind};
//!
//! let mut topology = synthetic::example_topology();
//! let load = topology
//!     .add_load("BranchTee_LVGrid_1_1", 0.02, LoadKind::ConventionalLoad, 5.0, Some("cts"), Some(2))
//!     .unwrap();
//! assert_eq!(load, "Conventional_Load_LVGrid_1_cts_2");
//!
//! let diagnostics = topology.check_integrity(&Default::default());
//! assert!(!diagnostics.has_errors());
//! ```

pub mod components;
pub mod config;
pub mod diagnostics;
pub mod equipment;
pub mod error;
pub mod graph_utils;
pub mod grids;
pub mod switch;
pub mod synthetic;
pub mod topology;

pub use components::{
    Bus, Control, Generator, GridDistrict, Line, LineKind, Load, LoadKind, StorageUnit,
    SwitchRecord, Transformer, VoltageLevel,
};
pub use config::{Case, ComponentClass, Config};
pub use diagnostics::{DiagnosticIssue, Diagnostics, ImportStats, Severity};
pub use equipment::{EquipmentData, LineType, TransformerType};
pub use error::{GridError, GridResult};
pub use graph_utils::{GraphStats, TopologyGraph};
pub use grids::{Grid, GridKind, GridRef};
pub use switch::{Switch, SwitchState};
pub use topology::{ComponentSpec, ConnectedComponents, ConnectionRequest, LineParams, Topology};
