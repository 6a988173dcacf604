//! Power flow analysis over the time steps of a study.

use crate::network::{AnalyzeMode, Injections, PfNetwork};
use crate::power_flow::{PowerFlowSolution, PowerFlowSolver};
use crate::results::Results;
use chrono::NaiveDateTime;
use gridplan_core::{Config, GridError, GridResult, Topology};
use gridplan_ts::TimeSeries;
use tracing::{debug, info, warn};

/// What to do with time steps that do not converge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Troubleshooting {
    #[default]
    Off,
    /// Scale all injections from `start` up to 1.0 in `steps` steps, warm
    /// starting each step from the previous solution.
    Iteration { start: f64, steps: usize },
}

impl Troubleshooting {
    pub fn iteration() -> Self {
        Troubleshooting::Iteration {
            start: 0.1,
            steps: 10,
        }
    }

    fn factors(&self) -> Vec<f64> {
        match *self {
            Troubleshooting::Off => vec![1.0],
            Troubleshooting::Iteration { start, steps } => {
                let steps = steps.max(2);
                (0..steps)
                    .map(|k| start + (1.0 - start) * k as f64 / (steps - 1) as f64)
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub mode: AnalyzeMode,
    /// All time steps of the time series if not set
    pub timesteps: Option<Vec<NaiveDateTime>>,
    pub raise_not_converged: bool,
    pub troubleshooting: Troubleshooting,
    pub solver: PowerFlowSolver,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            mode: AnalyzeMode::Full,
            timesteps: None,
            raise_not_converged: true,
            troubleshooting: Troubleshooting::Off,
            solver: PowerFlowSolver::new(),
        }
    }
}

impl AnalyzeOptions {
    pub fn with_mode(mut self, mode: AnalyzeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timesteps(mut self, timesteps: Vec<NaiveDateTime>) -> Self {
        self.timesteps = Some(timesteps);
        self
    }
}

/// Slack voltage for `mode`: the HV/MV station offset applies to grids fed
/// from the HV/MV station only.
pub fn slack_voltage(mode: AnalyzeMode, config: &Config) -> f64 {
    match mode {
        AnalyzeMode::Lv(_) => 1.0,
        _ => 1.0 + config.grid_expansion_allowed_voltage_deviations.hv_mv_trafo_offset,
    }
}

/// Rows of the time series for the requested time steps.
pub(crate) fn timestep_rows(
    timeseries: &TimeSeries,
    timesteps: Option<&[NaiveDateTime]>,
) -> GridResult<Vec<(NaiveDateTime, usize)>> {
    let rows: Vec<(NaiveDateTime, usize)> = match timesteps {
        None => timeseries.timeindex.iter().copied().zip(0..).collect(),
        Some(steps) => steps
            .iter()
            .map(|ts| {
                timeseries
                    .timeindex
                    .iter()
                    .position(|t| t == ts)
                    .map(|row| (*ts, row))
                    .ok_or_else(|| {
                        GridError::Validation(format!("Time step {} is not in the time index.", ts))
                    })
            })
            .collect::<GridResult<_>>()?,
    };
    if rows.is_empty() {
        return Err(GridError::PowerFlow(
            "No time steps to analyze. Set the time index and time series first.".to_string(),
        ));
    }
    Ok(rows)
}

/// Run the power flow for all requested time steps and collect the results.
pub fn analyze(
    topology: &Topology,
    timeseries: &TimeSeries,
    config: &Config,
    options: &AnalyzeOptions,
) -> GridResult<Results> {
    let rows = timestep_rows(timeseries, options.timesteps.as_deref())?;
    let network = PfNetwork::build(topology, options.mode, slack_voltage(options.mode, config))?;
    info!(
        mode = %options.mode,
        buses = network.bus_count(),
        branches = network.branches.len(),
        timesteps = rows.len(),
        "running power flow analysis"
    );

    let injections: Vec<Injections> = rows
        .iter()
        .map(|(_, row)| network.injections(topology, timeseries, *row))
        .collect();
    let first_pass = options.solver.solve_timesteps(&network, &injections);

    let mut solved = Vec::with_capacity(rows.len());
    let mut not_converged = Vec::new();
    for (((ts, _), inj), outcome) in rows.iter().zip(&injections).zip(first_pass) {
        let outcome = match outcome {
            Ok(sol) if sol.converged => Some(sol),
            Ok(_) | Err(_) if options.troubleshooting != Troubleshooting::Off => {
                debug!(timestep = %ts, "retrying time step with stepwise scaled injections");
                solve_stepwise(&options.solver, &network, inj, options.troubleshooting)
            }
            Ok(_) => None,
            Err(e) => {
                debug!(timestep = %ts, error = %e, "power flow failed");
                None
            }
        };
        match outcome {
            Some(sol) => solved.push((*ts, sol)),
            None => not_converged.push(*ts),
        }
    }

    if !not_converged.is_empty() {
        let message = format!(
            "Power flow analysis did not converge for the following {} time steps: {}.",
            not_converged.len(),
            not_converged
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if options.raise_not_converged {
            return Err(GridError::PowerFlow(message));
        }
        warn!("{}", message);
    }

    let mut results = Results::new();
    fill_results(&mut results, &network, options.mode, &solved)?;
    results.not_converged = not_converged;
    Ok(results)
}

fn solve_stepwise(
    solver: &PowerFlowSolver,
    network: &PfNetwork,
    injections: &Injections,
    troubleshooting: Troubleshooting,
) -> Option<PowerFlowSolution> {
    let mut last: Option<PowerFlowSolution> = None;
    for factor in troubleshooting.factors() {
        let scaled = injections.scaled(factor);
        let initial = last.as_ref().map(|s| (s.v_mag.as_slice(), s.v_ang.as_slice()));
        match solver.solve(network, &scaled, initial) {
            Ok(sol) if sol.converged => last = Some(sol),
            _ => return None,
        }
    }
    last
}

fn fill_results(
    results: &mut Results,
    network: &PfNetwork,
    mode: AnalyzeMode,
    solved: &[(NaiveDateTime, PowerFlowSolution)],
) -> GridResult<()> {
    let index: Vec<NaiveDateTime> = solved.iter().map(|(ts, _)| *ts).collect();
    results.reset_power_flow(index, mode);

    for (i, bus) in network.buses.iter().enumerate() {
        results
            .v_res
            .insert(bus.name.clone(), solved.iter().map(|(_, s)| s.v_mag[i]).collect())?;
    }
    for (k, branch) in network.branches.iter().enumerate() {
        let flows = || solved.iter().map(move |(_, s)| s.branch_flows[k]);
        results.i_res.insert(branch.name.clone(), flows().map(|f| f.i).collect())?;
        results.pfa_p.insert(branch.name.clone(), flows().map(|f| f.p0).collect())?;
        results.pfa_q.insert(branch.name.clone(), flows().map(|f| f.q0).collect())?;
        results.s_res.insert(branch.name.clone(), flows().map(|f| f.s).collect())?;
    }
    results
        .grid_losses
        .insert("p", solved.iter().map(|(_, s)| s.losses_p).collect())?;
    results
        .grid_losses
        .insert("q", solved.iter().map(|(_, s)| s.losses_q).collect())?;
    results
        .pfa_slack
        .insert("p", solved.iter().map(|(_, s)| s.slack_p).collect())?;
    results
        .pfa_slack
        .insert("q", solved.iter().map(|(_, s)| s.slack_q).collect())?;
    Ok(())
}
