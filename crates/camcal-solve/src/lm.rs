//! Dense Levenberg-Marquardt minimizer with a forward-difference Jacobian.
//!
//! The calibration problem is small (tens of parameters, thousands of
//! residuals), so dense normal equations with multiplicative damping are
//! entirely adequate. Convergence triggers on relative cost decrease or on
//! the step norm; the iteration cap bounds runtime on ill-conditioned input.

use nalgebra::{DMatrix, DVector};

#[derive(Clone, Copy, Debug)]
pub struct LmOptions {
    pub max_iters: usize,
    /// Relative cost-decrease tolerance.
    pub ftol: f64,
    /// Step-norm tolerance, relative to the parameter norm.
    pub xtol: f64,
    pub init_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iters: 60,
            ftol: 1e-12,
            xtol: 1e-12,
            init_lambda: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LmReport {
    pub iterations: usize,
    pub final_cost: f64,
    pub converged: bool,
}

fn numeric_jacobian<F>(f: &F, x: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let mut jac = DMatrix::<f64>::zeros(r0.len(), x.len());
    let mut xp = x.clone();

    for col in 0..x.len() {
        let eps = 1e-6 * (1.0 + x[col].abs());
        xp[col] = x[col] + eps;
        let r = f(&xp);
        xp[col] = x[col];

        for row in 0..r0.len() {
            jac[(row, col)] = (r[row] - r0[row]) / eps;
        }
    }
    jac
}

/// Minimize `0.5 * ||f(x)||^2` starting from `x0`.
pub fn minimize<F>(f: F, x0: DVector<f64>, opts: &LmOptions) -> (DVector<f64>, LmReport)
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let mut x = x0;
    let mut r = f(&x);
    let mut cost = 0.5 * r.norm_squared();
    let mut lambda = opts.init_lambda;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..opts.max_iters {
        iterations = iter + 1;

        let jac = numeric_jacobian(&f, &x, &r);
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * &r;

        let mut accepted = false;
        while lambda < 1e12 {
            // (J^T J + lambda * diag(J^T J)) delta = -g
            let mut damped = jtj.clone();
            for i in 0..damped.nrows() {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }

            let Some(delta) = damped.lu().solve(&(-&g)) else {
                lambda *= 10.0;
                continue;
            };

            let x_trial = &x + &delta;
            let r_trial = f(&x_trial);
            let cost_trial = 0.5 * r_trial.norm_squared();

            if cost_trial < cost {
                let decrease = cost - cost_trial;
                let step = delta.norm();

                x = x_trial;
                r = r_trial;
                cost = cost_trial;
                lambda = (lambda * 0.1).max(1e-12);
                accepted = true;

                if decrease <= opts.ftol * cost.max(1e-300) || step <= opts.xtol * (x.norm() + opts.xtol)
                {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            // No damping level improves the cost: local minimum (or stall).
            converged = true;
            break;
        }
        if converged {
            break;
        }
    }

    (
        x,
        LmReport {
            iterations,
            final_cost: cost,
            converged,
        },
    )
}
