//! Bracketed scalar root finding shared by the equilibrium solvers.
//!
//! All outer loops in this crate reduce to a single residual in one unknown
//! (temperature, pressure, or phase fraction) with physically derivable
//! bounds. The solver keeps a sign-changing bracket at all times and refines
//! it with secant steps whenever they land inside the bracket, falling back
//! to bisection otherwise.

use crate::errors::{PhaseqError, PhaseqResult};
use crate::Verbosity;

/// Minimum relative bracket width; below this the bracket has collapsed onto
/// the root and the residual tolerance cannot be tightened further.
const MIN_BRACKET_WIDTH: f64 = 1e-14;

/// Find a root of `f` inside `[lower, upper]`.
///
/// The residual must have opposite signs at the bracket ends; same signs are
/// reported as an infeasible specification since the root provably does not
/// exist inside the physical bounds.
pub(crate) fn brent_hybrid<F>(
    name: &str,
    mut f: F,
    lower: f64,
    upper: f64,
    max_iter: usize,
    tol: f64,
    verbosity: Verbosity,
) -> PhaseqResult<f64>
where
    F: FnMut(f64) -> PhaseqResult<f64>,
{
    let mut a = lower;
    let mut b = upper;
    let mut fa = f(a)?;
    if fa.abs() < tol {
        return Ok(a);
    }
    let fb = f(b)?;
    if fb.abs() < tol {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(PhaseqError::InfeasibleSpecification(format!(
            "`{name}`: no root in [{a:.8e}, {b:.8e}], residuals {fa:.4e} and {fb:.4e}"
        )));
    }

    log_iter!(verbosity, " iter |        x       |    residual    | secant");
    log_iter!(verbosity, "{:-<48}", "");

    let mut x = 0.5 * (a + b);
    let (mut x_prev, mut fx_prev) = (a, fa);
    for k in 1..=max_iter {
        let fx = f(x)?;
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {:14.8e} |",
            k,
            x,
            fx
        );
        if fx.abs() < tol {
            log_result!(verbosity, "`{}`: converged in {} step(s)\n", name, k);
            return Ok(x);
        }
        if fx.signum() == fa.signum() {
            (a, fa) = (x, fx);
        } else {
            b = x;
        }
        if (b - a).abs() < MIN_BRACKET_WIDTH * b.abs().max(1.0) {
            log_result!(verbosity, "`{}`: bracket collapsed in {} step(s)\n", name, k);
            return Ok(0.5 * (a + b));
        }

        // secant step from the last two evaluations, bisection whenever the
        // step leaves the bracket
        let secant = x - fx * (x - x_prev) / (fx - fx_prev);
        (x_prev, fx_prev) = (x, fx);
        x = if secant.is_finite() && secant > a.min(b) && secant < a.max(b) {
            log_iter!(verbosity, "      |                |                | *");
            secant
        } else {
            0.5 * (a + b)
        };
    }
    Err(PhaseqError::not_converged(
        name,
        max_iter,
        fx_prev,
        &[x_prev],
    ))
}

/// Expand a bracket geometrically around `x0` until the residual changes
/// sign. Used where only a point estimate of the root is available, e.g. the
/// Raoult estimate of a bubble pressure.
pub(crate) fn expand_bracket<F>(
    name: &str,
    mut f: F,
    x0: f64,
    factor: f64,
    max_expand: usize,
) -> PhaseqResult<(f64, f64)>
where
    F: FnMut(f64) -> PhaseqResult<f64>,
{
    let f0 = f(x0)?;
    if f0 == 0.0 {
        return Ok((x0, x0));
    }
    let (mut lo, mut hi) = (x0, x0);
    let (mut flo, mut fhi) = (f0, f0);
    for _ in 0..max_expand {
        if flo.signum() != f0.signum() {
            return Ok((lo, x0.min(hi)));
        }
        if fhi.signum() != f0.signum() {
            return Ok((x0.max(lo), hi));
        }
        lo /= factor;
        hi *= factor;
        flo = f(lo)?;
        fhi = f(hi)?;
    }
    Err(PhaseqError::InfeasibleSpecification(format!(
        "`{name}`: no sign change within [{lo:.8e}, {hi:.8e}]"
    )))
}
