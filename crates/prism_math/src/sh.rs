//! Order-2 spherical harmonics for diffuse ambient lighting.
//!
//! Two representations are used:
//!
//! - [`ShCoefficients`]: radiance projected onto the orthonormal real SH
//!   basis, ordered by band `(l, m)` with `m = -l..=l`. This is what a cubemap
//!   projection produces and what gets rotated.
//! - [`ShIrradiance`]: nine RGBA vectors laid out as the polynomial the
//!   pixel program evaluates, `[1, x, y, z, xz, yz, xy, 3z²-1, x²-y²]`.
//!   Directional and ambient lights accumulate here, and
//!   [`ShIrradiance::finalize`] folds the zonal term into `z²` for upload.

use std::f32::consts::PI;

use glam::{Mat3, Vec3, Vec4};

/// Number of coefficients in an order-2 SH set.
pub const SH_COEFFICIENT_COUNT: usize = 9;

const Y00: f32 = 0.282_095;
const Y1: f32 = 0.488_603;
const Y2_CROSS: f32 = 1.092_548;
const Y20: f32 = 0.315_392;
const Y22: f32 = 0.546_274;

// Cosine-lobe convolution constants for a directional light.
const LIGHT_C1: f32 = 4.0 / 17.0;
const LIGHT_C2: f32 = 8.0 / 17.0;
const LIGHT_C3: f32 = 15.0 / 17.0;
const LIGHT_C4: f32 = 5.0 / 68.0;
const LIGHT_C5: f32 = 15.0 / 68.0;

fn band1_basis(d: Vec3) -> [f32; 3] {
    [Y1 * d.y, Y1 * d.z, Y1 * d.x]
}

fn band2_basis(d: Vec3) -> [f32; 5] {
    [
        Y2_CROSS * d.x * d.y,
        Y2_CROSS * d.y * d.z,
        Y20 * (3.0 * d.z * d.z - 1.0),
        Y2_CROSS * d.x * d.z,
        Y22 * (d.x * d.x - d.y * d.y),
    ]
}

/// Evaluate the nine orthonormal basis functions for a unit direction.
pub fn eval_basis(direction: Vec3) -> [f32; SH_COEFFICIENT_COUNT] {
    let b1 = band1_basis(direction);
    let b2 = band2_basis(direction);
    [Y00, b1[0], b1[1], b1[2], b2[0], b2[1], b2[2], b2[3], b2[4]]
}

// Band 2 needs five directions whose basis matrix is invertible.
const BAND1_SAMPLES: [Vec3; 3] = [Vec3::X, Vec3::Y, Vec3::Z];
const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
const BAND2_SAMPLES: [Vec3; 5] = [
    Vec3::X,
    Vec3::Z,
    Vec3::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0),
    Vec3::new(FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2),
    Vec3::new(0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2),
];

/// Radiance projected onto the orthonormal SH basis, one RGB vector per term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShCoefficients {
    pub coeffs: [Vec3; SH_COEFFICIENT_COUNT],
}

impl ShCoefficients {
    pub const ZERO: ShCoefficients = ShCoefficients {
        coeffs: [Vec3::ZERO; SH_COEFFICIENT_COUNT],
    };

    /// Accumulate one radiance sample arriving from `direction` with a
    /// solid-angle `weight`.
    pub fn add_sample(&mut self, direction: Vec3, radiance: Vec3, weight: f32) {
        for (coeff, basis) in self.coeffs.iter_mut().zip(eval_basis(direction)) {
            *coeff += radiance * (basis * weight);
        }
    }

    /// Multiply every coefficient by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        for coeff in &mut self.coeffs {
            *coeff *= factor;
        }
        self
    }

    /// Reconstruct the band-limited radiance arriving from `direction`.
    pub fn evaluate(&self, direction: Vec3) -> Vec3 {
        self.coeffs
            .iter()
            .zip(eval_basis(direction))
            .fold(Vec3::ZERO, |acc, (c, b)| acc + *c * b)
    }

    /// Rotate the represented function so that radiance arriving from `d`
    /// now arrives from `rotation * d`. `rotation` must be orthonormal.
    ///
    /// Each band is solved independently from its values at fixed sample
    /// directions.
    pub fn rotate(&self, rotation: Mat3) -> Self {
        let inverse = rotation.transpose();
        let mut out = *self;

        let band1 = [self.coeffs[1], self.coeffs[2], self.coeffs[3]];
        let band1 = rotate_band(&band1, &BAND1_SAMPLES, band1_basis, inverse);
        out.coeffs[1..4].copy_from_slice(&band1);

        let band2 = [
            self.coeffs[4],
            self.coeffs[5],
            self.coeffs[6],
            self.coeffs[7],
            self.coeffs[8],
        ];
        let band2 = rotate_band(&band2, &BAND2_SAMPLES, band2_basis, inverse);
        out.coeffs[4..9].copy_from_slice(&band2);

        out
    }

    /// Convolve with the clamped cosine lobe and rearrange into the pixel
    /// program's polynomial layout. The result is irradiance divided by pi,
    /// so a uniform environment of radiance `L` evaluates to `L`.
    pub fn to_irradiance(&self) -> ShIrradiance {
        let band0 = Y00;
        let band1 = Y1 * (2.0 / 3.0);
        let band2 = 0.25;
        let c = &self.coeffs;

        let terms = [
            c[0] * band0,
            c[3] * band1,
            c[1] * band1,
            c[2] * band1,
            c[7] * (band2 * Y2_CROSS),
            c[5] * (band2 * Y2_CROSS),
            c[4] * (band2 * Y2_CROSS),
            c[6] * (band2 * Y20),
            c[8] * (band2 * Y22),
        ];

        ShIrradiance {
            coeffs: terms.map(|t| t.extend(1.0)),
        }
    }
}

impl Default for ShCoefficients {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::ops::Add for ShCoefficients {
    type Output = ShCoefficients;

    fn add(mut self, rhs: ShCoefficients) -> ShCoefficients {
        for (a, b) in self.coeffs.iter_mut().zip(rhs.coeffs) {
            *a += b;
        }
        self
    }
}

fn rotate_band<const N: usize>(
    coeffs: &[Vec3; N],
    samples: &[Vec3; N],
    basis: fn(Vec3) -> [f32; N],
    inverse: Mat3,
) -> [Vec3; N] {
    let mut matrix = [[0.0; N]; N];
    let mut rhs = [Vec3::ZERO; N];

    for (i, &direction) in samples.iter().enumerate() {
        matrix[i] = basis(direction);
        rhs[i] = basis(inverse * direction)
            .iter()
            .zip(coeffs)
            .fold(Vec3::ZERO, |acc, (b, c)| acc + *c * *b);
    }

    solve_linear(matrix, rhs)
}

/// Gaussian elimination with partial pivoting. The sample matrices are fixed
/// and well conditioned.
fn solve_linear<const N: usize>(mut a: [[f32; N]; N], mut b: [Vec3; N]) -> [Vec3; N] {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = a[col];
        let pivot_rhs = b[col];
        for row in (col + 1)..N {
            let factor = a[row][col] / pivot_row[col];
            for (k, value) in pivot_row.iter().enumerate().skip(col) {
                a[row][k] -= factor * value;
            }
            b[row] -= pivot_rhs * factor;
        }
    }

    let mut x = [Vec3::ZERO; N];
    for row in (0..N).rev() {
        let mut sum = b[row];
        for k in (row + 1)..N {
            sum -= x[k] * a[row][k];
        }
        x[row] = sum / a[row][row];
    }
    x
}

/// Irradiance in the polynomial layout, still open for light accumulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShIrradiance {
    pub coeffs: [Vec4; SH_COEFFICIENT_COUNT],
}

impl ShIrradiance {
    pub const ZERO: ShIrradiance = ShIrradiance {
        coeffs: [Vec4::ZERO; SH_COEFFICIENT_COUNT],
    };

    pub fn from_coefficients(coeffs: [Vec4; SH_COEFFICIENT_COUNT]) -> Self {
        Self { coeffs }
    }

    /// Add a directional light shining from `direction` (towards the light).
    pub fn add_light(&mut self, color: Vec4, direction: Vec3) {
        let d = direction.normalize_or_zero();
        let sh = &mut self.coeffs;

        sh[0] += color * LIGHT_C1;
        sh[1] += color * (LIGHT_C2 * d.x);
        sh[2] += color * (LIGHT_C2 * d.y);
        sh[3] += color * (LIGHT_C2 * d.z);
        sh[4] += color * (LIGHT_C3 * d.x * d.z);
        sh[5] += color * (LIGHT_C3 * d.z * d.y);
        sh[6] += color * (LIGHT_C3 * d.y * d.x);
        sh[7] += color * (LIGHT_C4 * (3.0 * d.z * d.z - 1.0));
        sh[8] += color * (LIGHT_C5 * (d.x * d.x - d.y * d.y));
    }

    /// Add a constant ambient term.
    pub fn add_ambient(&mut self, color: Vec4) {
        self.coeffs[0] += color;
    }

    /// Evaluate the polynomial for a unit normal.
    pub fn evaluate(&self, n: Vec3) -> Vec4 {
        let sh = &self.coeffs;
        sh[0]
            + sh[1] * n.x
            + sh[2] * n.y
            + sh[3] * n.z
            + sh[4] * (n.x * n.z)
            + sh[5] * (n.z * n.y)
            + sh[6] * (n.y * n.x)
            + sh[7] * (3.0 * n.z * n.z - 1.0)
            + sh[8] * (n.x * n.x - n.y * n.y)
    }

    /// Fold the `3z²-1` term into a bare `z²` term. Consumes the set, so no
    /// light can be accumulated afterwards.
    ///
    /// ```compile_fail
    /// use prism_math::{ShIrradiance, Vec3, Vec4};
    ///
    /// let done = ShIrradiance::ZERO.finalize();
    /// done.add_light(Vec4::ONE, Vec3::Z);
    /// ```
    pub fn finalize(self) -> FinalizedSh {
        let mut coeffs = self.coeffs;
        coeffs[0] -= coeffs[7];
        coeffs[7] *= 3.0;
        FinalizedSh { coeffs }
    }
}

impl Default for ShIrradiance {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Finalized irradiance ready for upload as nine pixel-program constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinalizedSh {
    coeffs: [Vec4; SH_COEFFICIENT_COUNT],
}

impl FinalizedSh {
    pub fn coefficients(&self) -> &[Vec4; SH_COEFFICIENT_COUNT] {
        &self.coeffs
    }

    /// Evaluate the uploaded form: `sh7` multiplies `z²` directly.
    pub fn evaluate(&self, n: Vec3) -> Vec4 {
        let sh = &self.coeffs;
        sh[0]
            + sh[1] * n.x
            + sh[2] * n.y
            + sh[3] * n.z
            + sh[4] * (n.x * n.z)
            + sh[5] * (n.z * n.y)
            + sh[6] * (n.y * n.x)
            + sh[7] * (n.z * n.z)
            + sh[8] * (n.x * n.x - n.y * n.y)
    }

    pub fn to_registers(&self) -> [[f32; 4]; SH_COEFFICIENT_COUNT] {
        self.coeffs.map(|c| c.to_array())
    }
}

/// Solid angle subtended by a cube-face texel centered at `(u, v)` in
/// `[-1, 1]` face coordinates on a face `size` texels wide.
pub fn texel_solid_angle(u: f32, v: f32, size: u32) -> f32 {
    let texel = 2.0 / size as f32;
    let r2 = 1.0 + u * u + v * v;
    texel * texel / (r2 * r2.sqrt())
}

/// Total solid angle of the unit sphere.
pub const FULL_SPHERE: f32 = 4.0 * PI;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3, eps: f32) {
        assert!((a - b).abs().max_element() < eps, "{a:?} != {b:?}");
    }

    fn assert_vec4_near(a: Vec4, b: Vec4, eps: f32) {
        assert!((a - b).abs().max_element() < eps, "{a:?} != {b:?}");
    }

    fn single_direction(direction: Vec3, color: Vec3) -> ShCoefficients {
        let mut sh = ShCoefficients::ZERO;
        sh.add_sample(direction, color, 1.0);
        sh
    }

    #[test]
    fn test_basis_is_orthonormal_under_quadrature() {
        // Integrate products of basis functions over a fine cube sampling
        let size = 32;
        let mut gram = [[0.0f32; 9]; 9];
        for face in 0..6 {
            for y in 0..size {
                for x in 0..size {
                    let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
                    let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
                    let dir = match face {
                        0 => Vec3::new(1.0, -v, -u),
                        1 => Vec3::new(-1.0, -v, u),
                        2 => Vec3::new(u, 1.0, v),
                        3 => Vec3::new(u, -1.0, -v),
                        4 => Vec3::new(u, -v, 1.0),
                        _ => Vec3::new(-u, -v, -1.0),
                    }
                    .normalize();
                    let w = texel_solid_angle(u, v, size);
                    let basis = eval_basis(dir);
                    for i in 0..9 {
                        for j in 0..9 {
                            gram[i][j] += basis[i] * basis[j] * w;
                        }
                    }
                }
            }
        }

        for (i, row) in gram.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((value - expected).abs() < 0.01, "gram[{i}][{j}] = {value}");
            }
        }
    }

    #[test]
    fn test_rotate_identity() {
        let sh = single_direction(Vec3::new(0.3, -0.5, 0.8).normalize(), Vec3::new(1.0, 0.5, 0.25));
        let rotated = sh.rotate(Mat3::IDENTITY);

        for (a, b) in sh.coeffs.iter().zip(rotated.coeffs) {
            assert_vec3_near(*a, b, 1e-4);
        }
    }

    #[test]
    fn test_rotate_moves_direction() {
        let rotation = Mat3::from_rotation_x(0.7) * Mat3::from_rotation_z(-1.2);
        let direction = Vec3::new(0.2, 0.9, -0.4).normalize();
        let color = Vec3::new(2.0, 1.0, 0.5);

        let rotated = single_direction(direction, color).rotate(rotation);
        let expected = single_direction(rotation * direction, color);

        for (a, b) in rotated.coeffs.iter().zip(expected.coeffs) {
            assert_vec3_near(*a, b, 1e-3);
        }
    }

    #[test]
    fn test_uniform_radiance_irradiance() {
        // A uniform environment only has a DC term of L * Y00 * 4pi
        let radiance = Vec3::new(0.5, 0.25, 1.0);
        let mut sh = ShCoefficients::ZERO;
        sh.coeffs[0] = radiance * (Y00 * FULL_SPHERE);

        let irradiance = sh.to_irradiance();
        assert_vec4_near(irradiance.coeffs[0], radiance.extend(1.0), 1e-3);
        for n in [Vec3::X, Vec3::NEG_Y, Vec3::Z] {
            let rgb = irradiance.evaluate(n).truncate();
            assert_vec3_near(rgb, radiance, 1e-3);
        }
    }

    #[test]
    fn test_add_light_constants() {
        let mut sh = ShIrradiance::ZERO;
        sh.add_light(Vec4::ONE, Vec3::Z);

        assert!((sh.coeffs[0].x - 4.0 / 17.0).abs() < 1e-6);
        assert!((sh.coeffs[3].x - 8.0 / 17.0).abs() < 1e-6);
        assert!((sh.coeffs[7].x - 2.0 * 5.0 / 68.0).abs() < 1e-6);
        assert!(sh.coeffs[1].x.abs() < 1e-6);
        assert!((sh.coeffs[8].x).abs() < 1e-6);
    }

    #[test]
    fn test_light_brightest_facing_light() {
        let mut sh = ShIrradiance::ZERO;
        sh.add_light(Vec4::ONE, Vec3::X);

        let facing = sh.evaluate(Vec3::X).x;
        let away = sh.evaluate(Vec3::NEG_X).x;
        assert!(facing > away);
    }

    #[test]
    fn test_finalize_transforms_terms_0_and_7() {
        let mut sh = ShIrradiance::ZERO;
        sh.coeffs[0] = Vec4::new(1.0, 2.0, 3.0, 1.0);
        sh.coeffs[7] = Vec4::new(0.5, 0.25, 0.125, 0.0);

        let finalized = sh.finalize();
        let c = finalized.coefficients();
        assert_vec4_near(c[0], Vec4::new(0.5, 1.75, 2.875, 1.0), 1e-6);
        assert_vec4_near(c[7], Vec4::new(1.5, 0.75, 0.375, 0.0), 1e-6);
    }

    #[test]
    fn test_finalize_preserves_evaluation() {
        let mut sh = ShIrradiance::ZERO;
        sh.add_ambient(Vec4::new(0.1, 0.1, 0.1, 0.0));
        sh.add_light(Vec4::new(1.0, 0.8, 0.6, 1.0), Vec3::new(0.3, -0.4, 0.8));

        let finalized = sh.finalize();
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(-0.6, 0.0, 0.8)] {
            assert_vec4_near(sh.evaluate(n), finalized.evaluate(n), 1e-5);
        }
    }

    #[test]
    fn test_light_before_finalize_changes_result() {
        let base = ShIrradiance::ZERO;
        let mut lit = base;
        lit.add_light(Vec4::ONE, Vec3::Y);

        assert_ne!(base.finalize(), lit.finalize());
    }

    #[test]
    fn test_texel_solid_angle_sums_to_sphere() {
        let size = 16;
        let mut total = 0.0;
        for y in 0..size {
            for x in 0..size {
                let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
                let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
                total += texel_solid_angle(u, v, size);
            }
        }
        assert!((total * 6.0 - FULL_SPHERE).abs() < 0.05);
    }
}
