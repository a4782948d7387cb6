//! Risk-ratio maximization under a long-only, capped, fully-invested
//! constraint set.
//!
//! The optimizer maximizes `mean(p) / risk(p)` where `p` is the portfolio
//! return per retained month. Each local solve is a sequential quadratic
//! programming loop: the search direction comes from the QP
//!
//! ```text
//! minimize    1/2 d'Bd + g'd
//! subject to  sum(d) = 0
//!             -w <= d <= cap - w
//! ```
//!
//! solved with Clarabel, where `g` is a central finite-difference gradient
//! and `B` a damped BFGS approximation of the Hessian. Several starts are
//! run and the best objective is kept.

use crate::error::{AllocationError, Result};
use crate::types::{RatioMethod, RegimeLabel};
use crate::universe::SubMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// Risk denominator used when the risk statistic is undefined or zero.
pub const RISK_FLOOR: f64 = 1e-3;

/// Threshold below which a portfolio return counts as downside.
pub const SORTINO_TARGET: f64 = 0.0;

/// Weights above this are reported as used.
pub const ACTIVE_WEIGHT: f64 = 1e-6;

/// Allowed deviation of the weight sum from one.
pub const SUM_TOLERANCE: f64 = 1e-6;

const CAPACITY_SLACK: f64 = 1e-9;
const TIE_TOLERANCE: f64 = 1e-12;
const FD_STEP: f64 = 1e-6;
const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;
const BISECTION_STEPS: usize = 200;

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Per-asset weight cap.
    pub max_weight: f64,
    /// Objective evaluations allowed per local solve.
    pub max_evaluations: usize,
    /// Random starts in addition to the uniform start.
    pub restarts: usize,
    /// Seed for the random starts; `None` draws from entropy.
    pub rng_seed: Option<u64>,
    /// Step and relative objective change below which a solve stops.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_weight: 0.25,
            max_evaluations: 20_000,
            restarts: 8,
            rng_seed: None,
            tolerance: 1e-9,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
            return Err(AllocationError::ConfigError(format!(
                "max_weight must be in (0, 1], got {}",
                self.max_weight
            )));
        }
        if self.max_evaluations == 0 {
            return Err(AllocationError::ConfigError(
                "max_evaluations must be positive".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(AllocationError::ConfigError(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Whether the best local solve met its stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    /// At least one start stopped before converging, usually on the
    /// evaluation budget; weights are the best feasible iterate.
    Approximate,
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "converged"),
            SolveStatus::Approximate => write!(f, "approximate"),
        }
    }
}

/// Optimal weights for one (regime, method) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAllocation {
    pub regime: RegimeLabel,
    pub method: RatioMethod,
    /// Weight per candidate asset, zeros included.
    pub weights: BTreeMap<String, f64>,
    /// Mean monthly portfolio return.
    pub expected_return: f64,
    /// Risk denominator; [`RISK_FLOOR`] when the statistic is undefined.
    pub risk: f64,
    pub risk_ratio: f64,
    pub observation_count: usize,
    pub assets_used: BTreeSet<String>,
    pub status: SolveStatus,
    /// Objective evaluations of the winning local solve.
    pub evaluations: usize,
}

impl RegimeAllocation {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Reject allocations that stopped on the evaluation budget.
    pub fn require_converged(self) -> Result<Self> {
        match self.status {
            SolveStatus::Converged => Ok(self),
            SolveStatus::Approximate => Err(AllocationError::OptimizationDidNotConverge {
                evaluations: self.evaluations,
            }),
        }
    }

    pub fn weight(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Return, risk and ratio of a weighted portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub expected_return: f64,
    pub risk: f64,
    pub risk_ratio: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Sample standard deviation of the returns strictly below `target`.
///
/// Returns `None` when fewer than two returns fall below it.
pub fn downside_deviation(returns: &[f64], target: f64) -> Option<f64> {
    let below: Vec<f64> = returns.iter().copied().filter(|r| *r < target).collect();
    sample_std(&below)
}

/// Metrics of the portfolio `weights` over the rows of `sub`.
pub fn portfolio_metrics(sub: &SubMatrix, weights: &[f64], method: RatioMethod) -> PortfolioMetrics {
    let p = sub.portfolio_returns(weights);
    let expected_return = mean(&p);
    let risk = match method {
        RatioMethod::Sharpe => sample_std(&p),
        RatioMethod::Sortino => downside_deviation(&p, SORTINO_TARGET),
    }
    .filter(|r| *r > 0.0)
    .unwrap_or(RISK_FLOOR);
    PortfolioMetrics {
        expected_return,
        risk,
        risk_ratio: expected_return / risk,
    }
}

/// Euclidean projection onto `{w : sum(w) = 1, 0 <= w_i <= cap}`.
pub fn project_to_capped_simplex(v: &[f64], cap: f64) -> Result<Vec<f64>> {
    let n = v.len();
    let capacity = n as f64 * cap;
    if n == 0 || capacity < 1.0 - CAPACITY_SLACK {
        return Err(AllocationError::InfeasibleConstraint {
            candidates: n,
            max_weight: cap,
        });
    }
    if capacity <= 1.0 + CAPACITY_SLACK {
        return Ok(vec![cap; n]);
    }

    let clamped_sum =
        |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(0.0, cap)).sum() };

    // clamped_sum is non-increasing in tau: n*cap at `lo`, zero at `hi`.
    let mut lo = v.iter().copied().fold(f64::INFINITY, f64::min) - cap;
    let mut hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if clamped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            break;
        }
    }
    let tau = 0.5 * (lo + hi);
    let mut w: Vec<f64> = v.iter().map(|x| (x - tau).clamp(0.0, cap)).collect();

    // Put the rounding residue on the coordinate with the most room.
    let residual = 1.0 - w.iter().sum::<f64>();
    let target = if residual >= 0.0 {
        w.iter()
            .enumerate()
            .max_by(|a, b| (cap - a.1).total_cmp(&(cap - b.1)))
            .map(|(i, _)| i)
    } else {
        w.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    };
    if let Some(i) = target {
        w[i] = (w[i] + residual).clamp(0.0, cap);
    }
    Ok(w)
}

/// Outcome of one local SQP solve.
#[derive(Debug, Clone)]
struct LocalSolve {
    weights: Vec<f64>,
    objective: f64,
    evaluations: usize,
    converged: bool,
}

/// Objective wrapper that counts evaluations.
struct Objective<'a> {
    sub: &'a SubMatrix,
    method: RatioMethod,
    evaluations: usize,
}

impl<'a> Objective<'a> {
    fn new(sub: &'a SubMatrix, method: RatioMethod) -> Self {
        Self {
            sub,
            method,
            evaluations: 0,
        }
    }

    /// Negated ratio, so the solver minimizes.
    fn value(&mut self, w: &[f64]) -> f64 {
        self.evaluations += 1;
        -portfolio_metrics(self.sub, w, self.method).risk_ratio
    }

    fn gradient(&mut self, w: &[f64]) -> Vec<f64> {
        let mut probe = w.to_vec();
        (0..w.len())
            .map(|i| {
                probe[i] = w[i] + FD_STEP;
                let up = self.value(&probe);
                probe[i] = w[i] - FD_STEP;
                let down = self.value(&probe);
                probe[i] = w[i];
                (up - down) / (2.0 * FD_STEP)
            })
            .collect()
    }
}

/// Maximizes the Sharpe or Sortino ratio of a regime sub-matrix.
#[derive(Debug, Clone)]
pub struct RiskRatioOptimizer {
    config: OptimizerConfig,
}

impl RiskRatioOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize weights over every asset of `sub`.
    pub fn optimize(
        &self,
        regime: RegimeLabel,
        sub: &SubMatrix,
        method: RatioMethod,
    ) -> Result<RegimeAllocation> {
        let n = sub.n_assets();
        let cap = self.config.max_weight;
        if n < 2 {
            return Err(AllocationError::TooFewCandidates { candidates: n });
        }
        if sub.n_dates() < 2 {
            return Err(AllocationError::InsufficientObservations {
                observed: sub.n_dates(),
                required: 2,
            });
        }
        let capacity = n as f64 * cap;
        if capacity < 1.0 - CAPACITY_SLACK {
            return Err(AllocationError::InfeasibleConstraint {
                candidates: n,
                max_weight: cap,
            });
        }
        if capacity <= 1.0 + CAPACITY_SLACK {
            debug!("{} / {}: only allocation is {} per asset", regime, method, cap);
            return Ok(self.build_allocation(regime, sub, method, vec![cap; n], SolveStatus::Converged, 0));
        }

        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut starts = Vec::with_capacity(self.config.restarts + 1);
        starts.push(vec![1.0 / n as f64; n]);
        for _ in 0..self.config.restarts {
            let draws: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(Exp1)).collect();
            let total: f64 = draws.iter().sum();
            let point: Vec<f64> = draws.iter().map(|d| d / total).collect();
            starts.push(project_to_capped_simplex(&point, cap)?);
        }

        let mut best: Option<LocalSolve> = None;
        let mut unconverged = 0;
        for (idx, start) in starts.into_iter().enumerate() {
            let run = self.local_solve(sub, method, start)?;
            if !run.converged {
                unconverged += 1;
            }
            trace!(
                "{} / {} start {}: ratio {:.6}, {} evaluations, converged {}",
                regime,
                method,
                idx,
                -run.objective,
                run.evaluations,
                run.converged
            );
            let better = match &best {
                None => true,
                Some(b) => run.objective < b.objective - TIE_TOLERANCE,
            };
            if better {
                best = Some(run);
            }
        }

        let best = best.ok_or_else(|| {
            AllocationError::OptimizationError("no starting point was evaluated".to_string())
        })?;
        let status = if unconverged == 0 {
            SolveStatus::Converged
        } else {
            warn!(
                "{} / {}: {} of {} starts stopped before converging (budget {}), keeping best iterate",
                regime,
                method,
                unconverged,
                self.config.restarts + 1,
                self.config.max_evaluations
            );
            SolveStatus::Approximate
        };
        let weights = project_to_capped_simplex(&best.weights, cap)?;
        Ok(self.build_allocation(regime, sub, method, weights, status, best.evaluations))
    }

    fn build_allocation(
        &self,
        regime: RegimeLabel,
        sub: &SubMatrix,
        method: RatioMethod,
        weights: Vec<f64>,
        status: SolveStatus,
        evaluations: usize,
    ) -> RegimeAllocation {
        let metrics = portfolio_metrics(sub, &weights, method);
        let assets_used = sub
            .assets()
            .iter()
            .zip(&weights)
            .filter(|(_, w)| **w > ACTIVE_WEIGHT)
            .map(|(a, _)| a.clone())
            .collect();
        RegimeAllocation {
            regime,
            method,
            weights: sub.assets().iter().cloned().zip(weights).collect(),
            expected_return: metrics.expected_return,
            risk: metrics.risk,
            risk_ratio: metrics.risk_ratio,
            observation_count: sub.n_dates(),
            assets_used,
            status,
            evaluations,
        }
    }

    fn local_solve(&self, sub: &SubMatrix, method: RatioMethod, start: Vec<f64>) -> Result<LocalSolve> {
        let cap = self.config.max_weight;
        let tol = self.config.tolerance;
        let budget = self.config.max_evaluations;
        let n = start.len();

        let mut objective = Objective::new(sub, method);
        let mut w = start;
        let mut f = objective.value(&w);
        let mut g = objective.gradient(&w);
        let mut hessian = identity(n);
        let mut scaled = false;
        let mut converged = false;

        while objective.evaluations < budget {
            let d = match solve_direction(&hessian, &g, &w, cap) {
                Ok(d) => d,
                Err(e) => {
                    debug!("Stopping local solve: {}", e);
                    break;
                }
            };
            let step_norm = d.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
            let slope: f64 = g.iter().zip(&d).map(|(a, b)| a * b).sum();
            if step_norm < tol || slope >= 0.0 {
                converged = true;
                break;
            }

            // Armijo backtracking; iterates are re-projected to absorb
            // interior-point slack on the bounds.
            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                if objective.evaluations >= budget {
                    break;
                }
                let trial: Vec<f64> = w.iter().zip(&d).map(|(wi, di)| wi + alpha * di).collect();
                let trial = project_to_capped_simplex(&trial, cap)?;
                let f_trial = objective.value(&trial);
                if f_trial <= f + ARMIJO_C * alpha * slope {
                    accepted = Some((trial, f_trial));
                    break;
                }
                alpha *= 0.5;
            }
            let Some((w_new, f_new)) = accepted else {
                // No descent at machine resolution along d.
                converged = objective.evaluations < budget;
                break;
            };

            let g_new = objective.gradient(&w_new);
            let s: Vec<f64> = w_new.iter().zip(&w).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            if !scaled {
                let sy = dot(&s, &y);
                let yy = dot(&y, &y);
                if sy > 0.0 && yy > 0.0 {
                    hessian = scaled_identity(n, yy / sy);
                }
                scaled = true;
            }
            damped_bfgs_update(&mut hessian, &s, &y);

            let relative_change = (f - f_new).abs() / f.abs().max(1.0);
            let moved = s.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
            w = w_new;
            f = f_new;
            g = g_new;
            if relative_change < tol || moved < tol {
                converged = true;
                break;
            }
        }

        Ok(LocalSolve {
            weights: w,
            objective: f,
            evaluations: objective.evaluations,
            converged,
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    scaled_identity(n, 1.0)
}

fn scaled_identity(n: usize, scale: f64) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { scale } else { 0.0 }).collect())
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Powell-damped BFGS update, keeping `b` positive definite.
fn damped_bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) {
    let bs = mat_vec(b, s);
    let sbs = dot(s, &bs);
    if sbs <= 1e-16 {
        return;
    }
    let sy = dot(s, y);
    let theta = if sy >= 0.2 * sbs {
        1.0
    } else {
        0.8 * sbs / (sbs - sy)
    };
    let r: Vec<f64> = y
        .iter()
        .zip(&bs)
        .map(|(yi, bsi)| theta * yi + (1.0 - theta) * bsi)
        .collect();
    let sr = dot(s, &r);
    if sr <= 1e-16 {
        return;
    }
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            b[i][j] += r[i] * r[j] / sr - bs[i] * bs[j] / sbs;
        }
    }
}

/// Solve the SQP direction-finding QP with Clarabel.
fn solve_direction(b: &[Vec<f64>], g: &[f64], w: &[f64], cap: f64) -> Result<Vec<f64>> {
    use clarabel::algebra::*;
    use clarabel::solver::*;

    let n = w.len();

    // P: upper triangle of the symmetrized Hessian approximation.
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
        for i in 0..=j {
            let val = 0.5 * (b[i][j] + b[j][i]);
            if val.abs() > 1e-14 || i == j {
                p_data.push(val);
                p_indices.push(i);
            }
        }
        p_indptr.push(p_data.len());
    }
    let p = CscMatrix::new(n, n, p_indptr, p_indices, p_data);

    // Rows: sum(d) = 0; d_j <= cap - w_j; -d_j <= w_j.
    let mut a_data = Vec::with_capacity(3 * n);
    let mut a_indices = Vec::with_capacity(3 * n);
    let mut a_indptr = vec![0];
    for j in 0..n {
        a_data.push(1.0);
        a_indices.push(0);
        a_data.push(1.0);
        a_indices.push(1 + j);
        a_data.push(-1.0);
        a_indices.push(1 + n + j);
        a_indptr.push(a_data.len());
    }
    let a = CscMatrix::new(1 + 2 * n, n, a_indptr, a_indices, a_data);

    let mut rhs = vec![0.0];
    rhs.extend(w.iter().map(|wi| (cap - wi).max(0.0)));
    rhs.extend(w.iter().map(|wi| wi.max(0.0)));

    let cones = [ZeroConeT(1), NonnegativeConeT(2 * n)];

    let settings = DefaultSettingsBuilder::default()
        .max_iter(100)
        .verbose(false)
        .build()
        .map_err(|e| AllocationError::OptimizationError(format!("Failed to build settings: {}", e)))?;

    let mut solver = DefaultSolver::new(&p, g, &a, &rhs, &cones, settings).map_err(|e| {
        AllocationError::OptimizationError(format!("Failed to create solver: {:?}", e))
    })?;

    solver.solve();

    if !matches!(
        solver.solution.status,
        SolverStatus::Solved | SolverStatus::AlmostSolved
    ) {
        return Err(AllocationError::OptimizationError(format!(
            "QP subproblem failed with status: {:?}",
            solver.solution.status
        )));
    }

    Ok(solver.solution.x.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ASSET{}", i)).collect()
    }

    fn optimizer(max_weight: f64, seed: u64) -> RiskRatioOptimizer {
        RiskRatioOptimizer::new(OptimizerConfig {
            max_weight,
            restarts: 4,
            rng_seed: Some(seed),
            ..Default::default()
        })
        .unwrap()
    }

    /// Four assets with distinct risk/return profiles over 24 months.
    fn four_assets() -> SubMatrix {
        let base = [
            0.012, -0.004, 0.021, 0.007, -0.011, 0.015, 0.003, 0.018, -0.006, 0.010, 0.004, 0.009,
            -0.002, 0.016, 0.006, -0.009, 0.013, 0.002, 0.011, -0.005, 0.019, 0.001, 0.008, 0.014,
        ];
        let columns = vec![
            base.to_vec(),
            base.iter().enumerate().map(|(i, r)| 0.5 * r + if i % 3 == 0 { 0.006 } else { 0.002 }).collect(),
            base.iter().enumerate().map(|(i, r)| -0.3 * r + if i % 2 == 0 { 0.012 } else { -0.004 }).collect(),
            base.iter().enumerate().map(|(i, _)| if i % 4 == 0 { -0.01 } else { 0.009 }).collect(),
        ];
        SubMatrix::from_columns(names(4), columns).unwrap()
    }

    fn assert_feasible(allocation: &RegimeAllocation, cap: f64) {
        assert!((allocation.weight_sum() - 1.0).abs() < SUM_TOLERANCE);
        for w in allocation.weights.values() {
            assert!(*w >= 0.0 && *w <= cap + 1e-12, "weight {} outside [0, {}]", w, cap);
        }
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    #[test]
    fn test_sharpe_uses_sample_std() {
        let sub = SubMatrix::from_columns(names(2), vec![vec![0.01, 0.03], vec![0.01, 0.03]]).unwrap();
        let m = portfolio_metrics(&sub, &[0.5, 0.5], RatioMethod::Sharpe);
        let expected_std = (2.0 * 0.01_f64.powi(2)).sqrt();
        assert!((m.expected_return - 0.02).abs() < 1e-12);
        assert!((m.risk - expected_std).abs() < 1e-12);
        assert!((m.risk_ratio - 0.02 / expected_std).abs() < 1e-9);
    }

    #[test]
    fn test_sortino_floor_without_downside() {
        let sub = SubMatrix::from_columns(names(2), vec![vec![0.01, 0.02, 0.03], vec![0.02, 0.01, 0.04]])
            .unwrap();
        let m = portfolio_metrics(&sub, &[0.5, 0.5], RatioMethod::Sortino);
        assert_eq!(m.risk, RISK_FLOOR);
        assert!((m.risk_ratio - m.expected_return / RISK_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn test_low_volatility_risk_is_not_floored() {
        let r = vec![0.0031, 0.0033, 0.0029, 0.0032, 0.0030, 0.0031];
        let sub = SubMatrix::from_columns(names(2), vec![r.clone(), r.clone()]).unwrap();
        let std = sample_std(&r).unwrap();
        let m = mean(&r);
        assert!(std < RISK_FLOOR);

        let metrics = portfolio_metrics(&sub, &[0.5, 0.5], RatioMethod::Sharpe);
        assert!((metrics.risk - std).abs() < 1e-12);
        assert!((metrics.risk_ratio - m / std).abs() < 1e-6);

        let allocation = optimizer(1.0, 3)
            .optimize(RegimeLabel::RisingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
            .unwrap();
        assert!(allocation.risk < RISK_FLOOR);
        assert!((allocation.risk_ratio - m / std).abs() < 1e-6);
    }

    #[test]
    fn test_zero_volatility_uses_floor() {
        let sub = SubMatrix::from_columns(names(2), vec![vec![0.5; 4], vec![0.5; 4]]).unwrap();
        let m = portfolio_metrics(&sub, &[0.5, 0.5], RatioMethod::Sharpe);
        assert_eq!(m.risk, RISK_FLOOR);
    }

    #[test]
    fn test_sortino_downside_subset() {
        let returns = [0.02, -0.01, 0.03, -0.03];
        let dd = downside_deviation(&returns, SORTINO_TARGET).unwrap();
        let expected = (2.0 * 0.01_f64.powi(2)).sqrt();
        assert!((dd - expected).abs() < 1e-12);
        assert!(downside_deviation(&[0.01, -0.02], SORTINO_TARGET).is_none());
    }

    // ========================================================================
    // Projection
    // ========================================================================

    #[test]
    fn test_projection_respects_bounds() {
        let w = project_to_capped_simplex(&[0.9, 0.05, 0.03, 0.02], 0.4).unwrap();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((w[0] - 0.4).abs() < 1e-9);
        assert!(w.iter().all(|x| *x >= 0.0 && *x <= 0.4));
    }

    #[test]
    fn test_projection_keeps_feasible_point() {
        let v = [0.3, 0.2, 0.25, 0.25];
        let w = project_to_capped_simplex(&v, 0.5).unwrap();
        for (a, b) in v.iter().zip(&w) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_projection_infeasible() {
        assert!(matches!(
            project_to_capped_simplex(&[0.5, 0.5, 0.5], 0.25),
            Err(AllocationError::InfeasibleConstraint { candidates: 3, .. })
        ));
    }

    // ========================================================================
    // Optimization
    // ========================================================================

    #[test]
    fn test_infeasible_cap() {
        let sub = SubMatrix::from_columns(
            names(3),
            vec![vec![0.01, 0.02, 0.03], vec![0.02, 0.0, 0.01], vec![0.0, 0.01, 0.02]],
        )
        .unwrap();
        let result = optimizer(0.25, 1).optimize(
            RegimeLabel::RisingGrowthFallingInflation,
            &sub,
            RatioMethod::Sharpe,
        );
        assert!(matches!(
            result,
            Err(AllocationError::InfeasibleConstraint { candidates: 3, .. })
        ));
    }

    #[test]
    fn test_degenerate_cap_returns_unique_allocation() {
        let sub = four_assets();
        let allocation = optimizer(0.25, 1)
            .optimize(RegimeLabel::SlowingGrowthRisingInflation, &sub, RatioMethod::Sortino)
            .unwrap();
        assert_eq!(allocation.evaluations, 0);
        assert!(allocation.is_converged());
        for w in allocation.weights.values() {
            assert!((w - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_identical_pair_split_evenly() {
        let r = vec![0.02, -0.01, 0.03, 0.01, -0.005, 0.025];
        let worse: Vec<f64> = r.iter().map(|x| x - 0.01).collect();
        let sub = SubMatrix::from_columns(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec![r.clone(), r, worse],
        )
        .unwrap();

        for method in RatioMethod::ALL {
            let allocation = optimizer(0.5, 7)
                .optimize(RegimeLabel::RisingGrowthRisingInflation, &sub, method)
                .unwrap();
            assert_feasible(&allocation, 0.5);
            assert!((allocation.weight("A") - 0.5).abs() < 1e-4, "{:?}", allocation.weights);
            assert!((allocation.weight("B") - 0.5).abs() < 1e-4, "{:?}", allocation.weights);
            assert!(allocation.weight("C").abs() < 1e-4, "{:?}", allocation.weights);
            assert!(!allocation.assets_used.contains("C"));
        }
    }

    #[test]
    fn test_weights_feasible_for_both_methods() {
        let sub = four_assets();
        for method in RatioMethod::ALL {
            let allocation = optimizer(0.4, 3)
                .optimize(RegimeLabel::RisingGrowthFallingInflation, &sub, method)
                .unwrap();
            assert_feasible(&allocation, 0.4);
            assert_eq!(allocation.weights.len(), 4);
            assert_eq!(allocation.observation_count, 24);
            let uniform = portfolio_metrics(&sub, &[0.25; 4], method);
            assert!(allocation.risk_ratio >= uniform.risk_ratio - 1e-9);
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let sub = four_assets();
        let a = optimizer(0.6, 11)
            .optimize(RegimeLabel::SlowingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
            .unwrap();
        let b = optimizer(0.6, 11)
            .optimize(RegimeLabel::SlowingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
            .unwrap();
        for (asset, w) in &a.weights {
            assert!((w - b.weight(asset)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_looser_cap_never_lowers_sharpe() {
        let sub = four_assets();
        let mut previous = f64::NEG_INFINITY;
        for cap in [0.3, 0.5, 1.0] {
            let allocation = optimizer(cap, 5)
                .optimize(RegimeLabel::RisingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
                .unwrap();
            assert_feasible(&allocation, cap);
            assert!(allocation.risk_ratio >= previous - 1e-5);
            previous = allocation.risk_ratio;
        }
    }

    #[test]
    fn test_evaluation_budget_marks_approximate() {
        let sub = four_assets();
        let optimizer = RiskRatioOptimizer::new(OptimizerConfig {
            max_weight: 0.5,
            max_evaluations: 5,
            restarts: 1,
            rng_seed: Some(2),
            ..Default::default()
        })
        .unwrap();
        let allocation = optimizer
            .optimize(RegimeLabel::RisingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
            .unwrap();
        assert_eq!(allocation.status, SolveStatus::Approximate);
        assert_feasible(&allocation, 0.5);
        assert!(matches!(
            allocation.require_converged(),
            Err(AllocationError::OptimizationDidNotConverge { .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        assert!(RiskRatioOptimizer::new(OptimizerConfig {
            max_weight: 0.0,
            ..Default::default()
        })
        .is_err());
        assert!(RiskRatioOptimizer::new(OptimizerConfig {
            max_weight: 1.2,
            ..Default::default()
        })
        .is_err());
        assert!(RiskRatioOptimizer::new(OptimizerConfig {
            tolerance: 0.0,
            ..Default::default()
        })
        .is_err());
    }
}
