//! Natural cubic spline interpolation.
//!
//! Second derivatives at the knots solve a tridiagonal system (Thomas
//! algorithm); both end conditions are `S'' = 0`.

/// Interpolating natural cubic spline through strictly increasing knots.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    second: Vec<f64>,
}

impl CubicSpline {
    /// Minimum number of distinct knots.
    pub const MIN_POINTS: usize = 3;

    /// Fit through `(xs[i], ys[i])`.
    ///
    /// Points are sorted; non-finite points and repeated `x` values (first
    /// wins) are dropped. Returns `None` with fewer than
    /// [`MIN_POINTS`](Self::MIN_POINTS) usable points.
    pub fn natural(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let mut points: Vec<(f64, f64)> = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| (x, y))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|b, a| a.0 == b.0);
        if points.len() < Self::MIN_POINTS {
            return None;
        }

        let (xs, ys): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        let second = second_derivatives(&xs, &ys);
        Some(Self { xs, ys, second })
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Value at `x`; outside the knots the end polynomials are extended.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let k = self.xs.partition_point(|&xi| xi <= x).clamp(1, n - 1) - 1;
        let (x0, x1) = (self.xs[k], self.xs[k + 1]);
        let h = x1 - x0;
        let (a, b) = (x1 - x, x - x0);
        let (m0, m1) = (self.second[k], self.second[k + 1]);
        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (self.ys[k] / h - m0 * h / 6.0) * a
            + (self.ys[k + 1] / h - m1 * h / 6.0) * b
    }

    /// Value at `x` wrapped into the knot domain, treating the curve as
    /// periodic with period `max - min`.
    pub fn eval_periodic(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let period = hi - lo;
        self.eval(lo + (x - lo).rem_euclid(period))
    }
}

fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut second = vec![0.0; n];
    let inner = n - 2;
    if inner == 0 {
        return second;
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    // Forward sweep over the interior knots 1..n-1.
    let mut diag = vec![0.0; inner];
    let mut rhs = vec![0.0; inner];
    for j in 0..inner {
        let i = j + 1;
        diag[j] = 2.0 * (h[i - 1] + h[i]);
        rhs[j] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
        if j > 0 {
            let w = h[i - 1] / diag[j - 1];
            diag[j] -= w * h[i - 1];
            rhs[j] -= w * rhs[j - 1];
        }
    }
    // Back substitution.
    for j in (0..inner).rev() {
        let upper = if j + 1 < inner { h[j + 1] * second[j + 2] } else { 0.0 };
        second[j + 1] = (rhs[j] - upper) / diag[j];
    }
    second
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn too_few_points() {
        assert!(CubicSpline::natural(&[0.0, 1.0], &[1.0, 2.0]).is_none());
        // duplicates and NaN do not count
        assert!(CubicSpline::natural(&[0.0, 0.0, 1.0, 2.0], &[1.0, 1.0, 2.0, f64::NAN]).is_none());
    }

    #[test]
    fn reproduces_knots() {
        let xs = [0.0, 0.1, 0.35, 0.6, 1.0];
        let ys = [1.0, -2.0, 0.5, 3.0, 1.0];
        let spline = CubicSpline::natural(&xs, &ys).unwrap();
        for (x, y) in xs.iter().zip(ys) {
            assert_relative_eq!(spline.eval(*x), y, epsilon = 1e-12);
        }
    }

    #[test]
    fn linear_data_stays_linear() {
        let xs = [0.5, 0.0, 0.25, 1.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
        let spline = CubicSpline::natural(&xs, &ys).unwrap();
        assert_relative_eq!(spline.eval(0.37), 1.74, epsilon = 1e-12);
        assert_relative_eq!(spline.eval(0.9), 2.8, epsilon = 1e-12);
    }

    #[test]
    fn approximates_smooth_curve() {
        let xs: Vec<f64> = (0..=40).map(|i| i as f64 / 40.0).collect();
        let ys: Vec<f64> = xs.iter().map(|x| (std::f64::consts::TAU * x).sin()).collect();
        let spline = CubicSpline::natural(&xs, &ys).unwrap();
        assert_relative_eq!(spline.eval(0.3), (std::f64::consts::TAU * 0.3).sin(), epsilon = 1e-3);
    }

    #[test]
    fn periodic_evaluation_wraps() {
        let xs = [0.0, 0.25, 0.5, 0.75, 1.0];
        let ys = [0.0, 1.0, 0.0, -1.0, 0.0];
        let spline = CubicSpline::natural(&xs, &ys).unwrap();
        assert_relative_eq!(spline.eval_periodic(1.25), 1.0, epsilon = 1e-12);
        assert_relative_eq!(spline.eval_periodic(-0.25), -1.0, epsilon = 1e-12);
        assert_relative_eq!(spline.eval_periodic(0.6), spline.eval(0.6), epsilon = 1e-12);
    }
}
