//! Shared numeric kernels: dense matrix helpers, the box-simplex
//! projection, a small Gaussian-elimination solve, and the projected
//! gradient mean-variance solver. Problems here are tiny (tens of
//! assets), so plain `Vec<f64>` math beats pulling in a linear algebra
//! stack.

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row-major `n x n` matrix times vector.
pub(crate) fn mat_vec(m: &[f64], v: &[f64]) -> Vec<f64> {
    let n = v.len();
    (0..n).map(|i| dot(&m[i * n..(i + 1) * n], v)).collect()
}

pub(crate) fn quad_form(m: &[f64], v: &[f64]) -> f64 {
    dot(v, &mat_vec(m, v))
}

/// Largest absolute row sum; a cheap upper bound on the spectral norm.
pub(crate) fn inf_norm(m: &[f64], n: usize) -> f64 {
    (0..n)
        .map(|i| m[i * n..(i + 1) * n].iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Euclidean projection of `v` onto `{ w : sum(w) = 1, lo <= w <= hi }`.
///
/// The projection is `clamp(v - tau, lo, hi)` for the shift `tau` that
/// makes the weights sum to one; the sum is monotone decreasing in `tau`,
/// so bisection finds it. Callers must ensure the box admits a point on
/// the simplex (`sum(lo) <= 1 <= sum(hi)`).
pub fn project_box_simplex(v: &[f64], lo: &[f64], hi: &[f64]) -> Vec<f64> {
    let clamp_sum = |tau: f64| -> f64 {
        v.iter()
            .zip(lo.iter().zip(hi))
            .map(|(x, (l, h))| (x - tau).clamp(*l, *h))
            .sum()
    };

    let mut left = v
        .iter()
        .zip(hi)
        .map(|(x, h)| x - h)
        .fold(f64::INFINITY, f64::min)
        - 1.0;
    let mut right = v
        .iter()
        .zip(lo)
        .map(|(x, l)| x - l)
        .fold(f64::NEG_INFINITY, f64::max)
        + 1.0;

    for _ in 0..100 {
        let mid = 0.5 * (left + right);
        if clamp_sum(mid) > 1.0 {
            left = mid;
        } else {
            right = mid;
        }
    }
    let tau = 0.5 * (left + right);
    v.iter()
        .zip(lo.iter().zip(hi))
        .map(|(x, (l, h))| (x - tau).clamp(*l, *h))
        .collect()
}

/// Solve `A x = b` for a small dense system with partial pivoting.
/// Returns `None` when the matrix is numerically singular.
pub(crate) fn solve_linear(mut a: Vec<f64>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    debug_assert_eq!(a.len(), n * n);
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[i * n + col]
                    .abs()
                    .total_cmp(&a[j * n + col].abs())
            })?;
        if a[pivot * n + col].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail = dot(&a[row * n + row + 1..(row + 1) * n], &x[row + 1..]);
        x[row] = (b[row] - tail) / a[row * n + row];
    }
    Some(x)
}

/// Maximize `mu . w - risk_aversion * w' Sigma w` over the box-simplex by
/// projected gradient ascent. Returns the weights, the iterations used and
/// whether the iterate converged before the cap.
pub fn mean_variance(
    mu: &[f64],
    cov: &[f64],
    lo: &[f64],
    hi: &[f64],
    risk_aversion: f64,
    start: &[f64],
    max_iterations: usize,
    tol: f64,
) -> (Vec<f64>, usize, bool) {
    let n = mu.len();
    let lipschitz = (2.0 * risk_aversion * inf_norm(cov, n)).max(1e-6);
    let step = 1.0 / lipschitz;

    let mut w = project_box_simplex(start, lo, hi);
    for iter in 0..max_iterations {
        let sigma_w = mat_vec(cov, &w);
        let candidate: Vec<f64> = w
            .iter()
            .enumerate()
            .map(|(i, wi)| wi + step * (mu[i] - 2.0 * risk_aversion * sigma_w[i]))
            .collect();
        let next = project_box_simplex(&candidate, lo, hi);
        let shift = w
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        w = next;
        if shift < tol {
            return (w, iter + 1, true);
        }
    }
    (w, max_iterations, false)
}
