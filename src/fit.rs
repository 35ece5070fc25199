//! # Weighted Logistic Regression via Penalized IRLS
//!
//! Fits the binary classifier by iteratively reweighted least squares with
//! mgcv-style step halving. Each iteration linearizes the logit link around
//! the current coefficients, solves a weighted least-squares problem for the
//! working response, and halves the step until the penalized deviance stops
//! increasing. A small ridge penalty on the non-intercept coefficients keeps
//! the solve well posed when columns are collinear or classes are nearly
//! separated.
//!
//! Observation weights are multiplicative priors: class-balancing weights
//! enter both the iterative weights and the deviance, so the fitted intercept
//! reflects the reweighted class ratio rather than the raw one.

use nalgebra::{DMatrix, DVector, SVD};
use ndarray::{s, Array1, Array2, Zip};
use thiserror::Error;

/// Floor for the iterative weights, preventing division blow-ups when a
/// fitted probability saturates.
const MIN_WEIGHT: f64 = 1e-6;
/// Fitted probabilities are clamped to `[PROB_EPS, 1 - PROB_EPS]`.
const PROB_EPS: f64 = 1e-8;
/// Linear predictors beyond this magnitude saturate the sigmoid anyway.
const ETA_LIMIT: f64 = 700.0;
/// Upper bound on step halvings within a single iteration.
const MAX_STEP_HALVINGS: usize = 30;
/// The deviance barely moves on the first iterations from a zero start;
/// requiring a few full steps guards against declaring convergence there.
const MIN_ITERATIONS: usize = 3;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("training labels contain a single class; a classifier cannot be fitted")]
    SingleClass,

    #[error("weighted least squares solve failed to produce finite coefficients")]
    SolveFailed,

    #[error("step halving failed to find a deviance-reducing step after {attempts} attempts")]
    StepHalvingFailed { attempts: usize },

    #[error(
        "IRLS did not converge within {max_iterations} iterations (last deviance change: {last_change:.3e})"
    )]
    DidNotConverge {
        max_iterations: usize,
        last_change: f64,
    },
}

/// Knobs for the IRLS loop. The defaults are what training uses.
#[derive(Debug, Clone, Copy)]
pub struct IrlsOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Ridge strength applied to every coefficient except the intercept.
    pub ridge: f64,
}

impl Default for IrlsOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-8,
            ridge: 1e-8,
        }
    }
}

/// A converged fit on the encoded feature matrix.
#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    /// Final unpenalized deviance.
    pub deviance: f64,
    pub iterations: usize,
}

/// Per-observation weights that equalize the total weight of each class:
/// `n / (2 * n_class)`, so a minority "yes" counts for as much in aggregate
/// as the majority "no".
pub fn balanced_class_weights(labels: &Array1<f64>) -> Result<Array1<f64>, FitError> {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&y| y == 1.0).count() as f64;
    let negatives = n - positives;
    if positives == 0.0 || negatives == 0.0 {
        return Err(FitError::SingleClass);
    }
    let positive_weight = n / (2.0 * positives);
    let negative_weight = n / (2.0 * negatives);
    Ok(labels.mapv(|y| if y == 1.0 { positive_weight } else { negative_weight }))
}

/// Fits intercept + coefficients for `features` (one row per observation,
/// no intercept column) against 0/1 `labels` under `prior_weights`.
pub fn fit_logistic(
    features: &Array2<f64>,
    labels: &Array1<f64>,
    prior_weights: &Array1<f64>,
    options: &IrlsOptions,
) -> Result<LogisticFit, FitError> {
    let n = features.nrows();
    let p = features.ncols() + 1;

    let mut design = Array2::ones((n, p));
    design.slice_mut(s![.., 1..]).assign(features);

    let mut beta = Array1::<f64>::zeros(p);
    let mut eta = design.dot(&beta);
    let (initial_mu, mut weights, mut z) = update_working_response(labels, &eta, prior_weights);
    let mut last_deviance = weighted_deviance(labels, &initial_mu, prior_weights);
    let mut penalized_deviance_current = last_deviance + ridge_penalty(&beta, options.ridge);
    let mut last_change = f64::INFINITY;

    for iteration in 1..=options.max_iterations {
        let proposal = solve_weighted_least_squares(&design, &z, &weights, options.ridge)?;

        // Evaluate the full step first.
        let mut beta_trial = proposal;
        let mut eta_trial = design.dot(&beta_trial);
        let (mut mu_trial, _, _) = update_working_response(labels, &eta_trial, prior_weights);
        let mut deviance_trial = weighted_deviance(labels, &mu_trial, prior_weights);
        let mut penalized_deviance_trial =
            deviance_trial + ridge_penalty(&beta_trial, options.ridge);

        let mut valid_eta = eta_trial.iter().all(|v| v.is_finite());
        let mut deviance_decreased = penalized_deviance_trial <= penalized_deviance_current;

        // mgcv-style step halving: walk the trial back toward the current
        // coefficients until the penalized deviance is finite and no worse.
        let mut step_halving_count = 0;
        while (!valid_eta || !deviance_trial.is_finite() || !deviance_decreased)
            && step_halving_count < MAX_STEP_HALVINGS
        {
            beta_trial = &beta + 0.5 * (&beta_trial - &beta);
            eta_trial = design.dot(&beta_trial);
            (mu_trial, _, _) = update_working_response(labels, &eta_trial, prior_weights);
            deviance_trial = weighted_deviance(labels, &mu_trial, prior_weights);
            penalized_deviance_trial = deviance_trial + ridge_penalty(&beta_trial, options.ridge);

            valid_eta = eta_trial.iter().all(|v| v.is_finite());
            deviance_decreased = penalized_deviance_trial <= penalized_deviance_current;
            step_halving_count += 1;
        }
        if !valid_eta || !deviance_trial.is_finite() || !deviance_decreased {
            return Err(FitError::StepHalvingFailed {
                attempts: step_halving_count,
            });
        }

        beta = beta_trial;
        eta = eta_trial;
        last_deviance = deviance_trial;
        (_, weights, z) = update_working_response(labels, &eta, prior_weights);

        // Tolerance is scaled by the deviance magnitude so it does not
        // collapse when the deviance is small.
        let convergence_scale = 1.0 + penalized_deviance_trial.abs();
        last_change = (penalized_deviance_current - penalized_deviance_trial).abs();

        log::debug!(
            "IRLS iteration #{:<2} | penalized deviance: {:<13.7} | change: {:>12.6e}{}",
            iteration,
            penalized_deviance_trial,
            last_change,
            if step_halving_count > 0 {
                format!(" | step halving: {step_halving_count} attempts")
            } else {
                String::new()
            }
        );

        if last_change < options.tolerance * (0.1 + convergence_scale) {
            // The deviance has flattened; also require a small gradient
            // before declaring convergence.
            let working_residual = &eta - &z;
            let deviance_gradient = design.t().dot(&(&weights * &working_residual));
            let mut penalty_gradient = &beta * options.ridge;
            penalty_gradient[0] = 0.0;
            let gradient_norm = deviance_gradient
                .iter()
                .zip(penalty_gradient.iter())
                .map(|(d, g)| (2.0 * d + 2.0 * g).abs())
                .fold(0.0, f64::max);
            let gradient_tolerance = options.tolerance * (0.1 + convergence_scale);

            if gradient_norm < gradient_tolerance && iteration >= MIN_ITERATIONS {
                log::debug!(
                    "IRLS converged after {iteration} iterations with deviance change {last_change:.2e} and gradient norm {gradient_norm:.2e}"
                );
                return Ok(LogisticFit {
                    intercept: beta[0],
                    coefficients: beta.slice(s![1..]).to_owned(),
                    deviance: last_deviance,
                    iterations: iteration,
                });
            }
        }

        penalized_deviance_current = penalized_deviance_trial;
    }

    Err(FitError::DidNotConverge {
        max_iterations: options.max_iterations,
        last_change,
    })
}

/// Recomputes the GLM working quantities at `eta`: fitted probabilities,
/// iterative weights (prior times the floored binomial variance), and the
/// working response `z`.
fn update_working_response(
    labels: &Array1<f64>,
    eta: &Array1<f64>,
    prior_weights: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let eta_clamped = eta.mapv(|e| e.clamp(-ETA_LIMIT, ETA_LIMIT));
    let mu = eta_clamped.mapv(|e| (1.0 / (1.0 + (-e).exp())).clamp(PROB_EPS, 1.0 - PROB_EPS));
    let variance = mu.mapv(|m| (m * (1.0 - m)).max(MIN_WEIGHT));
    let weights = prior_weights * &variance;
    let z = &eta_clamped + &((labels - &mu) / &variance);
    (mu, weights, z)
}

/// Binomial deviance under prior weights, with 0/1 labels contributing a
/// single log term each.
fn weighted_deviance(labels: &Array1<f64>, mu: &Array1<f64>, prior_weights: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-8;
    let total = Zip::from(labels)
        .and(mu)
        .and(prior_weights)
        .fold(0.0, |acc, &yi, &mui, &wi| {
            let mui = mui.clamp(EPS, 1.0 - EPS);
            let term1 = if yi > EPS { yi * (yi / mui).ln() } else { 0.0 };
            let term2 = if yi < 1.0 - EPS {
                (1.0 - yi) * ((1.0 - yi) / (1.0 - mui)).ln()
            } else {
                0.0
            };
            acc + wi * (term1 + term2)
        });
    2.0 * total
}

fn ridge_penalty(beta: &Array1<f64>, ridge: f64) -> f64 {
    // The intercept is never shrunk.
    ridge * beta.slice(s![1..]).iter().map(|b| b * b).sum::<f64>()
}

/// Solves `argmin_beta sum_i w_i (z_i - x_i beta)^2 + ridge * |beta[1..]|^2`
/// by SVD on the square-root-weighted design, with penalty rows appended for
/// every column except the intercept.
///
/// The SVD is attempted with progressively looser singular-value cutoffs; a
/// near-rank-deficient design falls back to a smaller effective rank instead
/// of failing outright.
fn solve_weighted_least_squares(
    design: &Array2<f64>,
    z: &Array1<f64>,
    weights: &Array1<f64>,
    ridge: f64,
) -> Result<Array1<f64>, FitError> {
    let n = design.nrows();
    let p = design.ncols();
    let extra = if ridge > 0.0 { p - 1 } else { 0 };

    let mut a = DMatrix::<f64>::zeros(n + extra, p);
    let mut b = DVector::<f64>::zeros(n + extra);
    for i in 0..n {
        let root_weight = weights[i].sqrt();
        for j in 0..p {
            a[(i, j)] = root_weight * design[[i, j]];
        }
        b[i] = root_weight * z[i];
    }
    if ridge > 0.0 {
        let root_ridge = ridge.sqrt();
        for k in 0..extra {
            a[(n + k, k + 1)] = root_ridge;
        }
    }

    let svd = SVD::new(a, true, true);
    for tolerance in [1e-10, 1e-8, 1e-6] {
        if let Ok(solution) = svd.solve(&b, tolerance) {
            if solution.iter().all(|v| v.is_finite()) {
                return Ok(Array1::from_iter(solution.iter().copied()));
            }
        }
    }
    Err(FitError::SolveFailed)
}
