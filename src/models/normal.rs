//! Gaussian primitives: CDF via erf, PDFs, and adaptive quadrature of a
//! Gaussian density between two bounds.

use statrs::function::erf::erf;
use std::f64::consts::{PI, SQRT_2};

/// Absolute tolerance for adaptive Simpson integration.
const QUAD_TOLERANCE: f64 = 1.49e-8;
/// Recursion depth cap for adaptive Simpson (bounds the work per call).
const QUAD_MAX_DEPTH: u32 = 50;

/// Standard normal CDF, Φ(x).
#[inline]
pub fn std_normal_cdf(x: f64) -> f64 {
    (1.0 + erf(x / SQRT_2)) / 2.0
}

/// Gaussian CDF with the given center and standard deviation.
#[inline]
pub fn normal_cdf(center: f64, point: f64, stdev: f64) -> f64 {
    (1.0 + erf((point - center) / (stdev * SQRT_2))) / 2.0
}

/// Standard normal density.
#[inline]
pub fn std_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Gaussian density N(mu, sigma^2) at x.
#[inline]
pub fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let always = 1.0 / (2.0 * PI * sigma * sigma).sqrt();
    always * (-((x - mu) * (x - mu)) / (2.0 * sigma * sigma)).exp()
}

/// Standard normal density evaluated over an ordered sequence of points.
pub fn std_normal_pdf_vec(xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| std_normal_pdf(x)).collect()
}

/// Gaussian density evaluated over an ordered sequence of points.
pub fn normal_pdf_vec(xs: &[f64], mu: f64, sigma: f64) -> Vec<f64> {
    xs.iter().map(|&x| normal_pdf(x, mu, sigma)).collect()
}

/// `num` evenly spaced points over [start, stop], endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + i as f64 * step })
                .collect()
        }
    }
}

/// Result of a numerical integration: value and estimated absolute error.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Quadrature {
    pub value: f64,
    pub abs_error: f64,
}

/// Integrate the standard normal density over [low, point].
/// There is no minus infinity here; use a low limit around -3.5 or below.
pub fn std_normal_integral(low: f64, point: f64) -> Quadrature {
    adaptive_simpson(std_normal_pdf, low, point)
}

/// Integrate N(mu, sigma^2) density over [low, point].
pub fn normal_integral(mu: f64, sigma: f64, low: f64, point: f64) -> Quadrature {
    adaptive_simpson(|z| normal_pdf(z, mu, sigma), low, point)
}

/// Adaptive Simpson quadrature with Richardson error estimate.
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64) -> Quadrature
where
    F: Fn(f64) -> f64,
{
    if a == b {
        return Quadrature { value: 0.0, abs_error: 0.0 };
    }
    let fa = f(a);
    let fb = f(b);
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
    let mut abs_error = 0.0;
    let value = simpson_step(&f, a, b, fa, fm, fb, whole, QUAD_TOLERANCE, QUAD_MAX_DEPTH, &mut abs_error);
    Quadrature { value, abs_error }
}

#[allow(clippy::too_many_arguments)]
fn simpson_step<F>(
    f: &F,
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tol: f64,
    depth: u32,
    abs_error: &mut f64,
) -> f64
where
    F: Fn(f64) -> f64,
{
    let m = 0.5 * (a + b);
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = f(lm);
    let frm = f(rm);
    let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
    let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
    let delta = left + right - whole;

    if depth == 0 || delta.abs() <= 15.0 * tol {
        *abs_error += delta.abs() / 15.0;
        return left + right + delta / 15.0;
    }

    simpson_step(f, a, m, fa, flm, fm, left, tol / 2.0, depth - 1, abs_error)
        + simpson_step(f, m, b, fm, frm, fb, right, tol / 2.0, depth - 1, abs_error)
}
