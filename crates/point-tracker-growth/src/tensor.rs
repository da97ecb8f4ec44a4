//! Growth tensor estimation from two point clouds.
//!
//! The deformation between the clouds is fitted as a linear map, split into
//! rotation and stretch by polar decomposition, and turned into a rate tensor
//! `(S - I) / dt + W` where `W` is the vorticity. Principal rates can be
//! corrected from linear to exponential growth.

use nalgebra::{DMatrix, Matrix2, Point2, Vector2};
use point_tracker_core::geometry::centroid;
use serde::{Deserialize, Serialize};

/// Fits whose centred point set is worse conditioned than this are rejected.
pub const MAX_CONDITION: f64 = 1e15;

/// Least-squares linear map `M` with `q - q̄ ≈ M (p - p̄)`.
///
/// Returns `None` for mismatched or too small inputs and for degenerate
/// (collinear, coincident) point sets.
pub fn fit_affine(before: &[Point2<f64>], after: &[Point2<f64>]) -> Option<Matrix2<f64>> {
    if before.len() != after.len() || before.len() < 2 {
        return None;
    }
    let cp = centroid(before)?;
    let cq = centroid(after)?;
    // Rows of P and Q are the centred points; P Mᵀ = Q in the least-squares sense.
    let n = before.len();
    let p = DMatrix::from_fn(n, 2, |i, j| before[i][j] - cp[j]);
    let q = DMatrix::from_fn(n, 2, |i, j| after[i][j] - cq[j]);
    let svd = p.svd(true, true);
    let (hi, lo) = (svd.singular_values.max(), svd.singular_values.min());
    if !(lo > 0.0) || hi / lo > MAX_CONDITION {
        return None;
    }
    let mt = svd.solve(&q, 0.0).ok()?;
    Some(Matrix2::new(mt[(0, 0)], mt[(1, 0)], mt[(0, 1)], mt[(1, 1)]))
}

/// `M = R S` (stretch first) or `M = S R` (rotation first).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolarDecomposition {
    /// Symmetric stretch.
    pub stretch: Matrix2<f64>,
    /// Proper rotation, `det = +1`.
    pub rotation: Matrix2<f64>,
}

/// Polar decomposition through the SVD `M = W Σ Vᵀ`.
///
/// With `at_start` the stretch is expressed before the rotation
/// (`S = V Σ Vᵀ`, `M = R S`), otherwise after it (`S = W Σ Wᵀ`, `M = S R`).
/// If `W Vᵀ` is a reflection the last singular value and the last column of
/// `V` change sign so that `R` is a proper rotation; `S` then carries the
/// reflection.
pub fn polar_decompose(m: &Matrix2<f64>, at_start: bool) -> Option<PolarDecomposition> {
    let svd = m.svd(true, true);
    let w = svd.u?;
    let mut v = svd.v_t?.transpose();
    let mut s = svd.singular_values;
    if (w * v.transpose()).determinant() < 0.0 {
        s[1] = -s[1];
        let flipped = -v.column(1).into_owned();
        v.set_column(1, &flipped);
    }
    let rotation = w * v.transpose();
    let sigma = Matrix2::from_diagonal(&s);
    let stretch = if at_start {
        v * sigma * v.transpose()
    } else {
        w * sigma * w.transpose()
    };
    Some(PolarDecomposition { stretch, rotation })
}

/// Rotation angle of `r` and the matching vorticity rate tensor.
pub fn rotation_to_vorticity(r: &Matrix2<f64>, dt: f64) -> (f64, Matrix2<f64>) {
    let angle = r[(1, 0)].atan2(r[(0, 0)]);
    (angle, Matrix2::new(0.0, -angle, angle, 0.0) / dt)
}

/// Exponential rate equivalent to a linear rate over `dt`.
#[inline]
pub fn linear_to_exponential(rate: f64, dt: f64) -> f64 {
    (rate * dt).ln_1p() / dt
}

/// Linear rate equivalent to an exponential rate over `dt`.
#[inline]
pub fn exponential_to_linear(rate: f64, dt: f64) -> f64 {
    (rate * dt).exp_m1() / dt
}

/// Apply `f` to the eigenvalues of a symmetric tensor.
pub fn map_eigenvalues(t: &Matrix2<f64>, f: impl Fn(f64) -> f64) -> Matrix2<f64> {
    let eig = t.symmetric_eigen();
    let mapped = Matrix2::from_diagonal(&eig.eigenvalues.map(f));
    eig.eigenvectors * mapped * eig.eigenvectors.transpose()
}

/// Interpretable form of a growth tensor.
///
/// `theta` (radians) is the direction of the principal axis of `kmaj`, in
/// `[π/2, 3π/2)`. Serialised with `theta` in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "GrowthRecord", from = "GrowthRecord")]
pub struct GrowthParameters {
    /// Principal rate with the larger magnitude.
    pub kmaj: f64,
    /// Principal rate with the smaller magnitude.
    pub kmin: f64,
    pub theta: f64,
    /// Antisymmetric entry `T[0, 1]`.
    pub psi: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct GrowthRecord {
    kmaj: f64,
    kmin: f64,
    /// Degrees.
    theta: f64,
    psi: f64,
}

impl From<GrowthParameters> for GrowthRecord {
    fn from(p: GrowthParameters) -> Self {
        Self {
            kmaj: p.kmaj,
            kmin: p.kmin,
            theta: p.theta.to_degrees(),
            psi: p.psi,
        }
    }
}

impl From<GrowthRecord> for GrowthParameters {
    fn from(r: GrowthRecord) -> Self {
        Self {
            kmaj: r.kmaj,
            kmin: r.kmin,
            theta: r.theta.to_radians(),
            psi: r.psi,
        }
    }
}

impl GrowthParameters {
    pub fn theta_degrees(&self) -> f64 {
        self.theta.to_degrees()
    }

    /// Relative areal growth rate, the trace of the tensor.
    pub fn areal_rate(&self) -> f64 {
        self.kmaj + self.kmin
    }
}

/// Split a growth tensor into principal rates, orientation and vorticity.
pub fn tensor_to_params(t: &Matrix2<f64>) -> GrowthParameters {
    let sym = (t + t.transpose()) * 0.5;
    let anti = (t - t.transpose()) * 0.5;
    let eig = sym.symmetric_eigen();
    let (minor, major) = if eig.eigenvalues[0].abs() <= eig.eigenvalues[1].abs() {
        (0, 1)
    } else {
        (1, 0)
    };
    let axis = canonical_direction(eig.eigenvectors.column(major).into_owned());
    let mut theta = axis.y.atan2(axis.x);
    if theta < std::f64::consts::FRAC_PI_2 {
        theta += std::f64::consts::PI;
    } else if theta > std::f64::consts::FRAC_PI_2 {
        theta -= std::f64::consts::PI;
    }
    GrowthParameters {
        kmaj: eig.eigenvalues[major],
        kmin: eig.eigenvalues[minor],
        theta,
        psi: anti[(0, 1)],
    }
}

/// Rebuild the tensor described by `p`.
pub fn params_to_tensor(p: &GrowthParameters) -> Matrix2<f64> {
    let (s, c) = p.theta.sin_cos();
    let major = Vector2::new(c, s);
    let minor = Vector2::new(-s, c);
    let sym = major * major.transpose() * p.kmaj + minor * minor.transpose() * p.kmin;
    sym + Matrix2::new(0.0, p.psi, -p.psi, 0.0)
}

/// Sign convention for eigenvectors: `x > 0`, or `y > 0` when `x == 0`.
fn canonical_direction(v: Vector2<f64>) -> Vector2<f64> {
    if v.x < 0.0 || (v.x == 0.0 && v.y < 0.0) {
        -v
    } else {
        v
    }
}

/// Growth rate tensor of the deformation from `before` to `after` over `dt`.
pub fn growth_tensor(
    before: &[Point2<f64>],
    after: &[Point2<f64>],
    dt: f64,
    exp_correction: bool,
    at_start: bool,
) -> Option<Matrix2<f64>> {
    let m = fit_affine(before, after)?;
    let polar = polar_decompose(&m, at_start)?;
    let (_, vorticity) = rotation_to_vorticity(&polar.rotation, dt);
    let mut strain = (polar.stretch - Matrix2::identity()) / dt;
    if exp_correction {
        strain = map_eigenvalues(&strain, |rate| linear_to_exponential(rate, dt));
    }
    Some(strain + vorticity)
}

/// [`growth_tensor`] reduced to [`GrowthParameters`].
pub fn growth_params(
    before: &[Point2<f64>],
    after: &[Point2<f64>],
    dt: f64,
    exp_correction: bool,
    at_start: bool,
) -> Option<GrowthParameters> {
    growth_tensor(before, after, dt, exp_correction, at_start).map(|t| tensor_to_params(&t))
}
