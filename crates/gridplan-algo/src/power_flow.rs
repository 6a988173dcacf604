//! # AC Power Flow with Newton-Raphson
//!
//! Polar-form Newton-Raphson on the bus-branch model of a [`PfNetwork`].
//! Distribution grids are radial or weakly meshed with a single infeed, so
//! there is exactly one slack bus (the station) and every other bus is PQ.
//!
//! ```text
//! ΔP_i = P_i,spec − Σ_j V_i V_j (G_ij cos θ_ij + B_ij sin θ_ij)
//! ΔQ_i = Q_i,spec − Σ_j V_i V_j (G_ij sin θ_ij − B_ij cos θ_ij)
//!
//! [ ∂P/∂θ  ∂P/∂V ] [Δθ]   [ΔP]
//! [ ∂Q/∂θ  ∂Q/∂V ] [ΔV] = [ΔQ]
//! ```
//!
//! The Jacobian is assembled densely from the non-zero admittance entries
//! and solved with faer's partial pivoting LU.

use crate::network::{BranchKind, Injections, PfNetwork};
use faer::prelude::SpSolver;
use faer::Mat;
use gridplan_core::{GridError, GridResult};
use num_complex::Complex64;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Flow over one branch. Powers in MW / Mvar / MVA, current in kA.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BranchFlow {
    pub p0: f64,
    pub q0: f64,
    pub p1: f64,
    pub q1: f64,
    /// Larger apparent power of both terminals
    pub s: f64,
    /// Current at the first terminal
    pub i: f64,
}

#[derive(Debug, Clone)]
pub struct PowerFlowSolution {
    pub converged: bool,
    pub iterations: usize,
    /// Largest power mismatch in p.u.
    pub max_mismatch: f64,
    /// Voltage magnitudes in p.u., indexed like the network buses
    pub v_mag: Vec<f64>,
    /// Voltage angles in rad
    pub v_ang: Vec<f64>,
    /// Indexed like the network branches
    pub branch_flows: Vec<BranchFlow>,
    pub slack_p: f64,
    pub slack_q: f64,
    pub losses_p: f64,
    pub losses_q: f64,
}

/// Newton-Raphson solver settings.
#[derive(Debug, Clone)]
pub struct PowerFlowSolver {
    /// Convergence tolerance for power mismatches in p.u.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PowerFlowSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerFlowSolver {
    pub fn new() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 30,
        }
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Solve one operating point.
    ///
    /// `initial` holds voltage magnitudes and angles to start from (warm
    /// start); otherwise the flat start is used. Returns a solution with
    /// `converged == false` if the iteration limit is reached and an error
    /// if the Jacobian is singular.
    pub fn solve(
        &self,
        network: &PfNetwork,
        injections: &Injections,
        initial: Option<(&[f64], &[f64])>,
    ) -> GridResult<PowerFlowSolution> {
        let n = network.bus_count();
        if n == 0 {
            return Err(GridError::PowerFlow("Network has no buses".to_string()));
        }
        if injections.p.len() != n || injections.q.len() != n {
            return Err(GridError::PowerFlow(format!(
                "Expected injections for {} buses, got {}.",
                n,
                injections.p.len()
            )));
        }

        let (mut v_mag, mut v_ang) = match initial {
            Some((mag, ang)) if mag.len() == n && ang.len() == n => (mag.to_vec(), ang.to_vec()),
            _ => (vec![1.0; n], vec![0.0; n]),
        };
        v_mag[network.slack] = network.slack_voltage;
        v_ang[network.slack] = 0.0;

        let p_spec: Vec<f64> = injections.p.iter().map(|p| p / network.base_mva).collect();
        let q_spec: Vec<f64> = injections.q.iter().map(|q| q / network.base_mva).collect();

        // position of each non-slack bus in the state vector
        let mut pos = vec![None; n];
        let mut m = 0;
        for (i, slot) in pos.iter_mut().enumerate() {
            if i != network.slack {
                *slot = Some(m);
                m += 1;
            }
        }

        let mut converged = false;
        let mut iterations = 0;
        let mut max_mismatch = f64::INFINITY;
        for iter in 0..=self.max_iterations {
            let (p_calc, q_calc) = compute_power(&network.y_bus, &v_mag, &v_ang);
            let mut mismatch = vec![0.0; 2 * m];
            max_mismatch = 0.0;
            for i in 0..n {
                if let Some(k) = pos[i] {
                    mismatch[k] = p_spec[i] - p_calc[i];
                    mismatch[m + k] = q_spec[i] - q_calc[i];
                    max_mismatch = max_mismatch
                        .max(mismatch[k].abs())
                        .max(mismatch[m + k].abs());
                }
            }
            iterations = iter;
            if max_mismatch < self.tolerance {
                converged = true;
                break;
            }
            if iter == self.max_iterations || !max_mismatch.is_finite() {
                break;
            }

            let jacobian = build_jacobian(&network.y_bus, &v_mag, &v_ang, &p_calc, &q_calc, &pos, m);
            let delta = solve_linear_system(jacobian, &mismatch)?;
            for i in 0..n {
                if let Some(k) = pos[i] {
                    v_ang[i] += delta[k];
                    v_mag[i] += delta[m + k];
                }
            }
        }

        let mut solution = PowerFlowSolution {
            converged,
            iterations,
            max_mismatch,
            v_mag,
            v_ang,
            branch_flows: Vec::new(),
            slack_p: 0.0,
            slack_q: 0.0,
            losses_p: 0.0,
            losses_q: 0.0,
        };
        if converged {
            fill_flows(network, &mut solution);
        }
        Ok(solution)
    }

    /// Solve many operating points of the same network, in parallel when
    /// the `rayon` feature is enabled.
    pub fn solve_timesteps(
        &self,
        network: &PfNetwork,
        injections: &[Injections],
    ) -> Vec<GridResult<PowerFlowSolution>> {
        #[cfg(feature = "rayon")]
        {
            injections
                .par_iter()
                .map(|inj| self.solve(network, inj, None))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            injections
                .iter()
                .map(|inj| self.solve(network, inj, None))
                .collect()
        }
    }
}

fn voltages(v_mag: &[f64], v_ang: &[f64]) -> Vec<Complex64> {
    v_mag
        .iter()
        .zip(v_ang)
        .map(|(m, a)| Complex64::from_polar(*m, *a))
        .collect()
}

/// P and Q injections from the current voltage state.
fn compute_power(
    y_bus: &[Vec<(usize, Complex64)>],
    v_mag: &[f64],
    v_ang: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let v = voltages(v_mag, v_ang);
    let mut p = vec![0.0; v.len()];
    let mut q = vec![0.0; v.len()];
    for (i, row) in y_bus.iter().enumerate() {
        let current: Complex64 = row.iter().map(|(j, y)| y * v[*j]).sum();
        let s = v[i] * current.conj();
        p[i] = s.re;
        q[i] = s.im;
    }
    (p, q)
}

fn build_jacobian(
    y_bus: &[Vec<(usize, Complex64)>],
    v_mag: &[f64],
    v_ang: &[f64],
    p_calc: &[f64],
    q_calc: &[f64],
    pos: &[Option<usize>],
    m: usize,
) -> Mat<f64> {
    let mut jac = Mat::zeros(2 * m, 2 * m);
    for (i, row) in y_bus.iter().enumerate() {
        let Some(r) = pos[i] else { continue };
        for &(j, y) in row {
            let (g, b) = (y.re, y.im);
            if i == j {
                let vi = v_mag[i];
                // ∂P_i/∂θ_i, ∂P_i/∂V_i, ∂Q_i/∂θ_i, ∂Q_i/∂V_i
                jac.write(r, r, -q_calc[i] - b * vi * vi);
                jac.write(r, m + r, p_calc[i] / vi + g * vi);
                jac.write(m + r, r, p_calc[i] - g * vi * vi);
                jac.write(m + r, m + r, q_calc[i] / vi - b * vi);
            } else if let Some(c) = pos[j] {
                let theta = v_ang[i] - v_ang[j];
                let (sin, cos) = theta.sin_cos();
                let vi = v_mag[i];
                let vj = v_mag[j];
                jac.write(r, c, vi * vj * (g * sin - b * cos));
                jac.write(r, m + c, vi * (g * cos + b * sin));
                jac.write(m + r, c, -vi * vj * (g * cos + b * sin));
                jac.write(m + r, m + c, vi * (g * sin - b * cos));
            }
        }
    }
    jac
}

fn solve_linear_system(a: Mat<f64>, b: &[f64]) -> GridResult<Vec<f64>> {
    let n = b.len();
    if n == 0 {
        return Ok(vec![]);
    }
    let mut rhs = Mat::zeros(n, 1);
    for (i, v) in b.iter().enumerate() {
        rhs.write(i, 0, *v);
    }
    let lu = a.partial_piv_lu();
    let solution = lu.solve(&rhs);
    let x: Vec<f64> = (0..n).map(|i| solution.read(i, 0)).collect();
    if x.iter().any(|v| !v.is_finite()) {
        return Err(GridError::PowerFlow("Singular Jacobian matrix".to_string()));
    }
    Ok(x)
}

fn fill_flows(network: &PfNetwork, solution: &mut PowerFlowSolution) {
    let v = voltages(&solution.v_mag, &solution.v_ang);
    let base = network.base_mva;
    let mut losses = Complex64::new(0.0, 0.0);
    solution.branch_flows = network
        .branches
        .iter()
        .map(|branch| {
            let (vf, vt) = (v[branch.from], v[branch.to]);
            let shunt = Complex64::new(0.0, branch.b_shunt / 2.0);
            let i_from = branch.y_series * (vf - vt) + shunt * vf;
            let i_to = branch.y_series * (vt - vf) + shunt * vt;
            let s_from = vf * i_from.conj() * base;
            let s_to = vt * i_to.conj() * base;
            losses += s_from + s_to;
            let v_nom = network.buses[branch.from].v_nom;
            let i_base = base / (3f64.sqrt() * v_nom);
            BranchFlow {
                p0: s_from.re,
                q0: s_from.im,
                p1: s_to.re,
                q1: s_to.im,
                s: s_from.norm().max(s_to.norm()),
                i: i_from.norm() * i_base,
            }
        })
        .collect();
    let slack = network.slack;
    let current: Complex64 = network.y_bus[slack].iter().map(|(j, y)| y * v[*j]).sum();
    let s_slack = v[slack] * current.conj() * base;
    solution.slack_p = s_slack.re;
    solution.slack_q = s_slack.im;
    solution.losses_p = losses.re;
    solution.losses_q = losses.im;
    tracing::trace!(
        transformers = network
            .branches
            .iter()
            .filter(|b| b.kind == BranchKind::Transformer)
            .count(),
        losses_p = losses.re,
        "power flow converged"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AnalyzeMode;
    use gridplan_core::synthetic;

    fn network() -> PfNetwork {
        PfNetwork::build(&synthetic::example_topology(), AnalyzeMode::Full, 1.0).unwrap()
    }

    #[test]
    fn no_load_gives_flat_voltages() {
        let net = network();
        let sol = PowerFlowSolver::new()
            .solve(&net, &Injections::zeros(net.bus_count()), None)
            .unwrap();
        assert!(sol.converged);
        // line charging lifts voltages marginally
        assert!(sol.v_mag.iter().all(|v| (v - 1.0).abs() < 1e-3));
    }

    #[test]
    fn load_causes_voltage_drop_and_slack_supply() {
        let net = network();
        let mut inj = Injections::zeros(net.bus_count());
        let far = net.bus_index("Bus_LVGrid_1_building_3").unwrap();
        inj.p[far] = -0.1;
        inj.q[far] = -0.02;
        let sol = PowerFlowSolver::new().solve(&net, &inj, None).unwrap();
        assert!(sol.converged);
        assert!(sol.v_mag[far] < 0.99);
        // slack supplies the load plus losses
        assert!(sol.slack_p > 0.1);
        assert!((sol.slack_p - 0.1 - sol.losses_p).abs() < 1e-6);
        assert!(sol.losses_p > 0.0);
    }

    #[test]
    fn generation_raises_voltage() {
        let net = network();
        let mut inj = Injections::zeros(net.bus_count());
        let bus = net.bus_index("BranchTee_MVGrid_1_1").unwrap();
        inj.p[bus] = 3.0;
        let sol = PowerFlowSolver::new().solve(&net, &inj, None).unwrap();
        assert!(sol.converged);
        assert!(sol.v_mag[bus] > 1.0);
        assert!(sol.slack_p < 0.0);

        let names = net.branch_names();
        let flow = sol.branch_flows[names["Line_10002"]];
        assert!(flow.s > 2.9);
        // 3 MW at 20 kV are roughly 87 A
        assert!((flow.i - 0.0866).abs() < 0.005);
    }

    #[test]
    fn iteration_limit_reports_non_convergence() {
        let net = network();
        let mut inj = Injections::zeros(net.bus_count());
        let far = net.bus_index("Bus_LVGrid_1_building_3").unwrap();
        inj.p[far] = -50.0;
        let sol = PowerFlowSolver::new()
            .with_max_iterations(3)
            .solve(&net, &inj, None);
        if let Ok(sol) = sol {
            assert!(!sol.converged);
        }
    }

    #[test]
    fn warm_start_converges_faster() {
        let net = network();
        let mut inj = Injections::zeros(net.bus_count());
        let far = net.bus_index("Bus_LVGrid_2_building_2").unwrap();
        inj.p[far] = -0.04;
        let solver = PowerFlowSolver::new();
        let cold = solver.solve(&net, &inj, None).unwrap();
        let warm = solver
            .solve(&net, &inj, Some((&cold.v_mag, &cold.v_ang)))
            .unwrap();
        assert!(warm.iterations <= 1);
    }

    #[test]
    fn parallel_time_steps() {
        let net = network();
        let far = net.bus_index("Bus_LVGrid_3_building_1").unwrap();
        let injections: Vec<Injections> = (0..4)
            .map(|k| {
                let mut inj = Injections::zeros(net.bus_count());
                inj.p[far] = -0.01 * k as f64;
                inj
            })
            .collect();
        let solutions = PowerFlowSolver::new().solve_timesteps(&net, &injections);
        assert_eq!(solutions.len(), 4);
        let v: Vec<f64> = solutions
            .iter()
            .map(|s| s.as_ref().unwrap().v_mag[far])
            .collect();
        assert!(v.windows(2).all(|w| w[1] < w[0]));
    }
}
