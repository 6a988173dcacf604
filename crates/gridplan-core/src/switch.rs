//! Switch disconnectors.
//!
//! A switch is represented by a line (its branch). Opening the switch moves
//! the branch end from `bus_closed` to `bus_open`, closing moves it back.
//! The state is never stored; it is read from the branch's terminals.

use crate::components::SwitchRecord;
use crate::error::{GridError, GridResult};
use crate::grids::{Grid, GridKind};
use crate::topology::Topology;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Open,
    Closed,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Open => f.write_str("open"),
            SwitchState::Closed => f.write_str("closed"),
        }
    }
}

/// Which terminal of a line a bus sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Bus0,
    Bus1,
}

pub struct Switch<'a> {
    topology: &'a Topology,
    record: &'a SwitchRecord,
}

impl<'a> Switch<'a> {
    pub(crate) fn new(topology: &'a Topology, record: &'a SwitchRecord) -> Self {
        Self { topology, record }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn bus_open(&self) -> &str {
        &self.record.bus_open
    }

    pub fn bus_closed(&self) -> &str {
        &self.record.bus_closed
    }

    pub fn branch(&self) -> &str {
        &self.record.branch
    }

    pub fn state(&self) -> GridResult<SwitchState> {
        infer_state(self.topology, self.record)
    }

    /// Grid the switch is in, determined by `bus_closed`.
    pub fn grid(&self) -> Option<Grid<'a>> {
        let bus = self.topology.buses.get(&self.record.bus_closed)?;
        Some(match bus.lv_grid_id {
            Some(id) => Grid::new(self.topology, GridKind::Lv, id),
            None => self.topology.mv_grid(),
        })
    }
}

fn terminal_of(topology: &Topology, branch: &str, bus: &str) -> Option<Terminal> {
    let line = topology.lines.get(branch)?;
    if line.bus0 == bus {
        Some(Terminal::Bus0)
    } else if line.bus1 == bus {
        Some(Terminal::Bus1)
    } else {
        None
    }
}

fn infer_state(topology: &Topology, record: &SwitchRecord) -> GridResult<SwitchState> {
    let closed = terminal_of(topology, &record.branch, &record.bus_closed);
    let open = terminal_of(topology, &record.branch, &record.bus_open);
    match (closed, open) {
        (None, Some(_)) => Ok(SwitchState::Open),
        (Some(_), None) => Ok(SwitchState::Closed),
        _ => Err(GridError::Topology(
            "State of switch could not be determined.".to_string(),
        )),
    }
}

pub(crate) fn set_state(topology: &mut Topology, name: &str, target: SwitchState) -> GridResult<()> {
    let record = topology
        .switches
        .get(name)
        .cloned()
        .ok_or_else(|| GridError::NotFound(format!("Switch {} not in Topology.", name)))?;

    if infer_state(topology, &record)? == target {
        return Ok(());
    }

    let (from, to, verb) = match target {
        SwitchState::Open => (&record.bus_closed, &record.bus_open, "open"),
        SwitchState::Closed => (&record.bus_open, &record.bus_closed, "close"),
    };

    let terminal = terminal_of(topology, &record.branch, from).ok_or_else(|| {
        GridError::Topology(format!(
            "Could not {} switch {}. Specified branch {} of switch has no bus {}. \
             Please check the switch.",
            verb, name, record.branch, from
        ))
    })?;

    if let Some(line) = topology.lines.get_mut(&record.branch) {
        match terminal {
            Terminal::Bus0 => line.bus0 = to.clone(),
            Terminal::Bus1 => line.bus1 = to.clone(),
        }
    }
    tracing::debug!(switch = name, state = verb, "switch state changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn open_and_close() {
        let mut topo = synthetic::example_topology();
        assert_eq!(topo.switch_state("circuit_breaker_1").unwrap(), SwitchState::Open);

        topo.close_switch("circuit_breaker_1").unwrap();
        assert_eq!(topo.switch_state("circuit_breaker_1").unwrap(), SwitchState::Closed);
        assert!(topo.lines["Line_10006"].connects("BranchTee_MVGrid_1_2"));

        topo.open_switch("circuit_breaker_1").unwrap();
        assert_eq!(topo.switch_state("circuit_breaker_1").unwrap(), SwitchState::Open);
        assert!(topo.lines["Line_10006"].connects("virtual_BranchTee_MVGrid_1_2"));
    }

    #[test]
    fn closing_twice_is_noop() {
        let mut topo = synthetic::example_topology();
        topo.close_switch("circuit_breaker_1").unwrap();
        topo.close_switch("circuit_breaker_1").unwrap();
        assert_eq!(topo.switch_state("circuit_breaker_1").unwrap(), SwitchState::Closed);
    }

    #[test]
    fn undeterminable_state() {
        let mut topo = synthetic::example_topology();
        topo.switches.get_mut("circuit_breaker_1").unwrap().bus_open = "Bus_unknown".into();
        let err = topo.switch_state("circuit_breaker_1").unwrap_err();
        assert!(err.to_string().contains("State of switch could not be determined."));
    }

    #[test]
    fn switch_grid_is_mv() {
        let topo = synthetic::example_topology();
        let switch = topo.switch("circuit_breaker_1").unwrap();
        assert_eq!(switch.grid().unwrap().to_string(), "MVGrid_1");
        assert_eq!(switch.branch(), "Line_10006");
    }
}
