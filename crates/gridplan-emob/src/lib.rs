//! # gridplan-emob: Electromobility
//!
//! Charging demand from a mobility simulation and potential charging parks
//! are brought into a grid in four steps:
//!
//! 1. [`import_electromobility`] reads charging processes and parks
//! 2. [`distribute_charging_demand`] assigns processes to parks and charging
//!    points
//! 3. [`integrate_charging_parks`] connects used parks as charging point loads
//! 4. [`apply_charging_strategy`] turns the processes into load time series
//!
//! ```rust
//! use gridplan_emob::{determine_grid_connection_capacity, ChargingStrategy, UseCase};
//!
//! assert_eq!("dumb".parse::<ChargingStrategy>().unwrap(), ChargingStrategy::Dumb);
//! assert!(UseCase::Home.is_private());
//! // parks below 0.3 MW are connected at their full capacity
//! assert_eq!(determine_grid_connection_capacity(0.2, 0.3, 1.0, 0.45), 0.2);
//! ```

pub mod data;
pub mod distribute;
pub mod import;
pub mod integrate;
pub mod strategies;

pub use data::{
    determine_grid_connection_capacity, ChargingProcess, Electromobility, PotentialChargingPark,
    UseCase,
};
pub use distribute::{distribute_charging_demand, DistributionMode};
pub use import::import_electromobility;
pub use integrate::integrate_charging_parks;
pub use strategies::{apply_charging_strategy, flexibility_bands, ChargingStrategy, FlexibilityBands};
