// models/garch.rs — GARCH(p,q) estimation and multi-step forecasting
//
// ─────────────────────────────────────────────────────────────────────────
// MATHEMATICAL SPECIFICATION
// ─────────────────────────────────────────────────────────────────────────
//
// GARCH(p,q): Bollerslev (1986), zero-mean form
//
//   Residual:            ε_t = r_t          (returns are mean-adjusted noise)
//   Conditional variance:
//
//       σ²_t = ω + Σᵢ₌₁..p αᵢ·ε²_{t−i} + Σⱼ₌₁..q βⱼ·σ²_{t−j}
//
//   Constraints (covariance stationarity):
//     ω > 0,  αᵢ ≥ 0,  βⱼ ≥ 0,  Σα + Σβ < 1
//
//   Estimation: maximise the Gaussian quasi-likelihood
//
//       −L = Σ_t [ ½·ln(2π) + ½·ln(σ²_t) + ½·ε²_t/σ²_t ]
//
//   over θ = [ω, α₁..α_p, β₁..β_q] via derivative-free Nelder-Mead; the
//   variance recursion is seeded with the sample variance of the series
//   for the first max(p,q) steps.
//
//   Multi-step forecast: within the observed window the recursion uses
//   realised ε² and σ²; beyond it no residual is known, so the forecast
//   variance substitutes for both (E[ε²_{t+h}] = σ²_{t+h}).
// ─────────────────────────────────────────────────────────────────────────
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::optimize::Optimizer;

const SMALL_POS: f64 = 1e-12;
const LARGE_NUMBER: f64 = 1e12;
const LN_2PI: f64 = 1.8378770664093453;

/// Fitted GARCH(p,q) parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchParams {
    /// ω: constant variance term
    pub omega: f64,
    /// α₁..α_p: ARCH (shock) coefficients
    pub alpha: Vec<f64>,
    /// β₁..β_q: GARCH (persistence) coefficients
    pub beta: Vec<f64>,
}

impl GarchParams {
    pub fn p(&self) -> usize {
        self.alpha.len()
    }

    pub fn q(&self) -> usize {
        self.beta.len()
    }

    /// Σα + Σβ — must stay below 1 for covariance stationarity.
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    pub fn is_valid(&self) -> bool {
        self.omega > 0.0
            && self.alpha.iter().all(|a| *a >= 0.0)
            && self.beta.iter().all(|b| *b >= 0.0)
            && self.persistence() < 1.0
    }

    fn from_theta(theta: &[f64], p: usize, q: usize) -> Self {
        Self {
            omega: theta[0],
            alpha: theta[1..1 + p].to_vec(),
            beta: theta[1 + p..1 + p + q].to_vec(),
        }
    }
}

/// A fitted model snapshot: everything needed to forecast and to survive a
/// process restart. Immutable once written; a later fit supersedes it with
/// a new snapshot rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub ticker: String,
    pub p: usize,
    pub q: usize,
    pub params: GarchParams,
    /// Training residuals (the return series, zero-mean assumption)
    pub residuals: Vec<f64>,
    /// Realised conditional-variance path over the training window
    pub sigma2: Vec<f64>,
    /// Last observed bar date — forecast keys advance business days from here
    pub last_date: NaiveDate,
    pub fitted_at: DateTime<Utc>,
}

impl FittedModel {
    /// h-step-ahead variance forecasts.
    pub fn forecast_variances(&self, horizon: usize) -> Vec<f64> {
        forecast_variances(&self.params, &self.residuals, &self.sigma2, horizon)
    }
}

/// Estimation output: parameters plus the realised variance path the
/// forecaster seeds from.
#[derive(Debug, Clone)]
pub struct GarchEstimate {
    pub params: GarchParams,
    pub sigma2: Vec<f64>,
}

fn sample_variance(x: &[f64]) -> f64 {
    if x.len() <= 1 {
        return SMALL_POS;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (x.len() - 1) as f64).max(SMALL_POS)
}

/// Run the variance recursion over `returns`. The first max(p,q) entries
/// are seeded with the sample variance.
pub fn variance_path(params: &GarchParams, returns: &[f64]) -> Vec<f64> {
    let (p, q) = (params.p(), params.q());
    let m = p.max(q);
    let n = returns.len();
    let seed = sample_variance(returns);

    let mut sigma2 = vec![seed; n.min(m)];
    sigma2.reserve(n.saturating_sub(m));
    for t in m..n {
        let mut v = params.omega;
        for i in 1..=p {
            v += params.alpha[i - 1] * returns[t - i].powi(2);
        }
        for j in 1..=q {
            v += params.beta[j - 1] * sigma2[t - j];
        }
        sigma2.push(v);
    }
    sigma2
}

/// Gaussian quasi-likelihood cost (negated, to be minimised). Constraint
/// violations map to a large penalty so the simplex stays in the feasible
/// region.
pub fn negative_log_likelihood(theta: &[f64], returns: &[f64], p: usize, q: usize) -> f64 {
    let params = GarchParams::from_theta(theta, p, q);
    if !params.is_valid() {
        return LARGE_NUMBER;
    }

    let sigma2 = variance_path(&params, returns);
    let m = p.max(q);
    let mut nll = 0.0;
    for t in m..returns.len() {
        if sigma2[t] <= 0.0 {
            return LARGE_NUMBER;
        }
        nll += 0.5 * (LN_2PI + sigma2[t].ln() + returns[t].powi(2) / sigma2[t]);
    }
    nll
}

/// Minimum observations to identify ω plus p ARCH and q GARCH terms.
fn required_observations(p: usize, q: usize) -> usize {
    10 * (p + q + 1)
}

/// Fit a GARCH(p,q) model to a return series by quasi-likelihood
/// maximisation.
///
/// Fails with `ModelUnderdetermined` when the order is invalid or the
/// series cannot identify p+q+1 free parameters, and with
/// `FitConvergence` when the optimizer stops without a converged,
/// stationary parameter vector.
pub fn fit(
    returns: &[f64],
    p: usize,
    q: usize,
    optimizer: &dyn Optimizer,
) -> Result<GarchEstimate> {
    if p < 1 || q < 1 {
        return Err(EngineError::ModelUnderdetermined(format!(
            "order must satisfy p >= 1 and q >= 1, got p={p}, q={q}"
        )));
    }
    let needed = required_observations(p, q);
    if returns.len() < needed {
        return Err(EngineError::ModelUnderdetermined(format!(
            "GARCH({p},{q}) needs at least {needed} returns, got {}",
            returns.len()
        )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(EngineError::InvalidInput(
            "return series contains non-finite values".into(),
        ));
    }

    // Initial guess: mild shock sensitivity, high persistence, ω scaled
    // to the sample variance. Coefficient mass is split evenly across lags.
    let var0 = sample_variance(returns);
    let mut theta0 = Vec::with_capacity(1 + p + q);
    theta0.push(0.1 * var0);
    theta0.extend(std::iter::repeat(0.05 / p as f64).take(p));
    theta0.extend(std::iter::repeat(0.90 / q as f64).take(q));

    let cost = move |theta: &[f64]| negative_log_likelihood(theta, returns, p, q);
    let theta_hat = optimizer.minimize(&cost, &theta0)?;

    let params = GarchParams::from_theta(&theta_hat, p, q);
    if !params.is_valid() {
        return Err(EngineError::FitConvergence(format!(
            "optimizer returned non-stationary parameters: ω={:.6e}, Σα+Σβ={:.6}",
            params.omega,
            params.persistence()
        )));
    }

    let sigma2 = variance_path(&params, returns);
    Ok(GarchEstimate { params, sigma2 })
}

/// Multi-step variance forecast recursion.
///
/// Lags that still fall inside the observed window use realised values;
/// lags beyond it substitute the already-forecast variance for both ε²
/// and σ², since E[ε²_{t+h}] = σ²_{t+h} under the model.
pub fn forecast_variances(
    params: &GarchParams,
    residuals: &[f64],
    sigma2: &[f64],
    horizon: usize,
) -> Vec<f64> {
    let (p, q) = (params.p(), params.q());
    let mut eps2: Vec<f64> = residuals.iter().map(|r| r.powi(2)).collect();
    let mut sig2 = sigma2.to_vec();

    let mut out = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let t = eps2.len();
        let mut v = params.omega;
        for i in 1..=p {
            v += params.alpha[i - 1] * eps2[t - i];
        }
        for j in 1..=q {
            v += params.beta[j - 1] * sig2[t - j];
        }
        eps2.push(v);
        sig2.push(v);
        out.push(v);
    }
    out
}

/// Deterministic return series with volatility clustering: a GARCH-type
/// variance recursion driven by bounded pseudo-noise. Shared across the
/// crate's test modules.
#[cfg(test)]
pub(crate) fn synthetic_returns(n: usize) -> Vec<f64> {
    let mut returns = Vec::with_capacity(n);
    let (omega, alpha, beta) = (0.05, 0.10, 0.85);
    let mut var = omega / (1.0 - alpha - beta);
    let mut prev = 0.0f64;
    for i in 0..n {
        var = omega + alpha * prev * prev + beta * var;
        // uniform-ish noise in [-1, 1), scaled to unit variance
        let z = (((i as u64).wrapping_mul(2654435761) % 10_000) as f64 / 5_000.0 - 1.0)
            * 3.0f64.sqrt();
        prev = z * var.sqrt();
        returns.push(prev);
    }
    returns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::NelderMeadOptimizer;

    /// Deterministic optimizer for exercising the fit plumbing without
    /// running a real minimisation.
    struct FixedOptimizer(Vec<f64>);

    impl Optimizer for FixedOptimizer {
        fn minimize(
            &self,
            _cost: &(dyn Fn(&[f64]) -> f64 + Sync),
            _initial: &[f64],
        ) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    struct StalledOptimizer;

    impl Optimizer for StalledOptimizer {
        fn minimize(
            &self,
            _cost: &(dyn Fn(&[f64]) -> f64 + Sync),
            _initial: &[f64],
        ) -> Result<Vec<f64>> {
            Err(EngineError::FitConvergence("iteration cap reached".into()))
        }
    }

    #[test]
    fn nll_penalises_constraint_violations() {
        let returns = synthetic_returns(100);
        // Σα + Σβ ≥ 1
        assert_eq!(
            negative_log_likelihood(&[0.1, 0.3, 0.8], &returns, 1, 1),
            LARGE_NUMBER
        );
        // ω ≤ 0
        assert_eq!(
            negative_log_likelihood(&[0.0, 0.1, 0.8], &returns, 1, 1),
            LARGE_NUMBER
        );
        // feasible point scores finite
        let nll = negative_log_likelihood(&[0.05, 0.1, 0.85], &returns, 1, 1);
        assert!(nll < LARGE_NUMBER);
    }

    #[test]
    fn variance_path_is_seeded_and_positive() {
        let returns = synthetic_returns(50);
        let params = GarchParams {
            omega: 0.05,
            alpha: vec![0.10],
            beta: vec![0.85],
        };
        let path = variance_path(&params, &returns);
        assert_eq!(path.len(), returns.len());
        assert_eq!(path[0], sample_variance(&returns));
        assert!(path.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn fit_rejects_invalid_order_and_short_series() {
        let returns = synthetic_returns(300);
        let opt = FixedOptimizer(vec![0.05, 0.1, 0.85]);
        assert!(matches!(
            fit(&returns, 0, 1, &opt),
            Err(EngineError::ModelUnderdetermined(_))
        ));
        assert!(matches!(
            fit(&returns[..20], 1, 1, &opt),
            Err(EngineError::ModelUnderdetermined(_))
        ));
    }

    #[test]
    fn fit_surfaces_optimizer_failure() {
        let returns = synthetic_returns(300);
        assert!(matches!(
            fit(&returns, 1, 1, &StalledOptimizer),
            Err(EngineError::FitConvergence(_))
        ));
    }

    #[test]
    fn fit_rejects_non_stationary_result() {
        let returns = synthetic_returns(300);
        let opt = FixedOptimizer(vec![0.05, 0.5, 0.6]);
        assert!(matches!(
            fit(&returns, 1, 1, &opt),
            Err(EngineError::FitConvergence(_))
        ));
    }

    #[test]
    fn fit_garch_11_on_synthetic_series() {
        let returns = synthetic_returns(300);
        let est = fit(&returns, 1, 1, &NelderMeadOptimizer::default()).unwrap();
        assert!(est.params.is_valid());
        assert_eq!(est.sigma2.len(), returns.len());

        let forecast = forecast_variances(&est.params, &returns, &est.sigma2, 1);
        assert_eq!(forecast.len(), 1);
        assert!(forecast[0] > 0.0);
    }

    #[test]
    fn multi_step_forecast_has_requested_length_and_positivity() {
        let returns = synthetic_returns(200);
        let params = GarchParams {
            omega: 0.05,
            alpha: vec![0.10],
            beta: vec![0.85],
        };
        let sigma2 = variance_path(&params, &returns);
        let forecast = forecast_variances(&params, &returns, &sigma2, 10);
        assert_eq!(forecast.len(), 10);
        assert!(forecast.iter().all(|v| *v > 0.0));
        // With persistence < 1 the forecast approaches the long-run level
        let longrun = params.omega / (1.0 - params.persistence());
        let d_first = (forecast[0] - longrun).abs();
        let d_last = (forecast[9] - longrun).abs();
        assert!(d_last <= d_first);
    }

    #[test]
    fn higher_order_forecast_uses_all_lags() {
        let returns = synthetic_returns(200);
        let params = GarchParams {
            omega: 0.05,
            alpha: vec![0.08, 0.04],
            beta: vec![0.60, 0.20],
        };
        let sigma2 = variance_path(&params, &returns);
        let forecast = forecast_variances(&params, &returns, &sigma2, 5);
        assert_eq!(forecast.len(), 5);
        assert!(forecast.iter().all(|v| *v > 0.0));
    }
}
