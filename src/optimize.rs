/// optimize.rs — Numerical minimisation behind a swappable interface
///
/// The likelihood maximisation is derivative-free Nelder-Mead (argmin).
/// The `Optimizer` trait keeps the estimation algorithm swappable and lets
/// tests substitute a deterministic mock.
use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use crate::error::{EngineError, Result};

pub trait Optimizer {
    /// Minimise `cost` starting from `initial`. Fails with
    /// `FitConvergence` when no converged minimum is reached within the
    /// iteration budget — a partially-converged point is never returned.
    fn minimize(
        &self,
        cost: &(dyn Fn(&[f64]) -> f64 + Sync),
        initial: &[f64],
    ) -> Result<Vec<f64>>;
}

struct FnCost<'a> {
    f: &'a (dyn Fn(&[f64]) -> f64 + Sync),
}

impl CostFunction for FnCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok((self.f)(theta))
    }
}

#[derive(Debug, Clone)]
pub struct NelderMeadOptimizer {
    pub max_iters: u64,
    pub sd_tolerance: f64,
}

impl Default for NelderMeadOptimizer {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            sd_tolerance: 1e-8,
        }
    }
}

impl NelderMeadOptimizer {
    pub fn new(max_iters: u64) -> Self {
        Self {
            max_iters,
            ..Self::default()
        }
    }

    /// Initial simplex: the start point plus one vertex per dimension
    /// with that coordinate nudged.
    fn simplex(initial: &[f64]) -> Vec<Vec<f64>> {
        let mut vertices = vec![initial.to_vec()];
        for i in 0..initial.len() {
            let mut v = initial.to_vec();
            v[i] = if v[i].abs() > 1e-12 {
                v[i] * 1.05
            } else {
                1e-4
            };
            vertices.push(v);
        }
        vertices
    }
}

impl Optimizer for NelderMeadOptimizer {
    fn minimize(
        &self,
        cost: &(dyn Fn(&[f64]) -> f64 + Sync),
        initial: &[f64],
    ) -> Result<Vec<f64>> {
        let solver = NelderMead::new(Self::simplex(initial))
            .with_sd_tolerance(self.sd_tolerance)
            .map_err(|e| EngineError::FitConvergence(e.to_string()))?;

        let result = Executor::new(FnCost { f: cost }, solver)
            .configure(|state| state.max_iters(self.max_iters))
            .run()
            .map_err(|e| EngineError::FitConvergence(e.to_string()))?;

        let state = result.state();
        match state.get_termination_status() {
            TerminationStatus::Terminated(TerminationReason::SolverConverged) => {}
            other => {
                return Err(EngineError::FitConvergence(format!(
                    "optimizer stopped without convergence: {other:?}"
                )));
            }
        }

        state
            .get_best_param()
            .cloned()
            .ok_or_else(|| EngineError::FitConvergence("optimizer produced no parameters".into()))
    }
}
