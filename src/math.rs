//! Small dense linear-algebra and interpolation kernels used by the models
//! and the distribution mapper.
//!
//! Kept in-crate: the matrices involved are tiny (feature-count sized), and
//! the monotone cubic interpolator has no counterpart in the dependency set.

use ndarray::{Array1, Array2};

use crate::error::PredageError;

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, PredageError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(PredageError::ShapeMismatch(format!(
            "cholesky requires a square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(PredageError::Numeric(
                        "matrix is not positive definite".to_string(),
                    ));
                }
                l[(i, j)] = sum.sqrt();
            } else {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }
    Ok(l)
}

/// Solve `A x = b` given the lower Cholesky factor of `A`.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // forward substitution: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * z[k];
        }
        z[i] = sum / l[(i, i)];
    }
    // back substitution: L^T x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[(k, i)] * x[k];
        }
        x[i] = sum / l[(i, i)];
    }
    x
}

/// Solve `L z = b` (forward substitution only).
pub fn solve_lower(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * z[k];
        }
        z[i] = sum / l[(i, i)];
    }
    z
}

/// Inverse of `A` from its lower Cholesky factor, one unit-vector solve per
/// column.
pub fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut e = Array1::<f64>::zeros(n);
        e[j] = 1.0;
        let col = cholesky_solve(l, &e);
        inv.column_mut(j).assign(&col);
    }
    inv
}

/// Monotone cubic (PCHIP) interpolator after Fritsch and Carlson.
///
/// Knot abscissae must be strictly increasing. Evaluation outside the knot
/// range extrapolates with the boundary segment's cubic, matching the
/// behavior expected when inverting a CDF slightly beyond its sampled
/// support.
#[derive(Debug, Clone)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    d: Vec<f64>,
}

impl Pchip {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, PredageError> {
        if x.len() != y.len() {
            return Err(PredageError::LengthMismatch {
                expected: x.len(),
                got: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(PredageError::Numeric(
                "pchip requires at least two knots".to_string(),
            ));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PredageError::Numeric(
                "pchip knots must be strictly increasing".to_string(),
            ));
        }

        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

        let mut d = vec![0.0; n];
        for i in 1..n - 1 {
            if delta[i - 1] * delta[i] <= 0.0 {
                d[i] = 0.0;
            } else {
                let w1 = 2.0 * h[i] + h[i - 1];
                let w2 = h[i] + 2.0 * h[i - 1];
                d[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
            }
        }
        d[0] = edge_slope(h[0], h.get(1).copied().unwrap_or(h[0]), delta[0], *delta.get(1).unwrap_or(&delta[0]));
        d[n - 1] = edge_slope(
            h[n - 2],
            if n > 2 { h[n - 3] } else { h[n - 2] },
            delta[n - 2],
            if n > 2 { delta[n - 3] } else { delta[n - 2] },
        );

        Ok(Pchip { x, y, d })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        // clamp to the boundary segment; the cubic itself extrapolates
        let seg = match self.x.partition_point(|&v| v <= t) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };
        let h = self.x[seg + 1] - self.x[seg];
        let s = (t - self.x[seg]) / h;
        let (y0, y1) = (self.y[seg], self.y[seg + 1]);
        let (d0, d1) = (self.d[seg], self.d[seg + 1]);
        let h00 = (1.0 + 2.0 * s) * (1.0 - s) * (1.0 - s);
        let h10 = s * (1.0 - s) * (1.0 - s);
        let h01 = s * s * (3.0 - 2.0 * s);
        let h11 = s * s * (s - 1.0);
        h00 * y0 + h10 * h * d0 + h01 * y1 + h11 * h * d1
    }
}

/// One-sided three-point end slope with the usual shape-preserving clamps.
fn edge_slope(h0: f64, h1: f64, delta0: f64, delta1: f64) -> f64 {
    let mut d = ((2.0 * h0 + h1) * delta0 - h0 * delta1) / (h0 + h1);
    if d * delta0 <= 0.0 {
        d = 0.0;
    } else if delta0 * delta1 < 0.0 && d.abs() > 3.0 * delta0.abs() {
        d = 3.0 * delta0;
    }
    d
}

/// Piecewise-linear interpolation of `v` on the table `(xs, ys)`, with
/// linear extrapolation from the end segments.
pub fn interp_linear(xs: &[f64], ys: &[f64], v: f64) -> Result<f64, PredageError> {
    if xs.len() != ys.len() {
        return Err(PredageError::LengthMismatch {
            expected: xs.len(),
            got: ys.len(),
        });
    }
    if xs.len() < 2 {
        return Err(PredageError::Numeric(
            "interpolation requires at least two points".to_string(),
        ));
    }
    let n = xs.len();
    let seg = match xs.partition_point(|&x| x <= v) {
        0 => 0,
        p if p >= n => n - 2,
        p => p - 1,
    };
    let (x0, x1) = (xs[seg], xs[seg + 1]);
    let (y0, y1) = (ys[seg], ys[seg + 1]);
    if x1 == x0 {
        return Ok(0.5 * (y0 + y1));
    }
    Ok(y0 + (v - x0) / (x1 - x0) * (y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn cholesky_solves_a_known_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let l = cholesky(&a).unwrap();
        let x = cholesky_solve(&l, &b);
        let back = a.dot(&x);
        assert_relative_eq!(back[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(back[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn cholesky_inverse_times_matrix_is_identity() {
        let a = array![[5.0, 1.0, 0.5], [1.0, 4.0, 0.2], [0.5, 0.2, 3.0]];
        let l = cholesky(&a).unwrap();
        let inv = cholesky_inverse(&l);
        let eye = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(eye[(i, j)], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(&a).is_err());
    }

    #[test]
    fn pchip_interpolates_through_knots_monotonically() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 1.0, 4.0, 9.0];
        let ip = Pchip::new(x.clone(), y.clone()).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_relative_eq!(ip.eval(*xi), *yi, epsilon = 1e-12);
        }
        // monotone data stays monotone between knots
        let mut prev = ip.eval(0.0);
        for step in 1..=60 {
            let t = 3.0 * step as f64 / 60.0;
            let v = ip.eval(t);
            assert!(v >= prev - 1e-12);
            prev = v;
        }
    }

    #[test]
    fn linear_interp_with_extrapolation() {
        let xs = vec![0.0, 1.0, 2.0];
        let ys = vec![0.0, 2.0, 4.0];
        assert_relative_eq!(interp_linear(&xs, &ys, 0.5).unwrap(), 1.0);
        assert_relative_eq!(interp_linear(&xs, &ys, 3.0).unwrap(), 6.0);
        assert_relative_eq!(interp_linear(&xs, &ys, -1.0).unwrap(), -2.0);
    }
}
