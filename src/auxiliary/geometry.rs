//! Geometrical constants and rotations.

use anyhow::{self, ensure};
use nalgebra::{Matrix3, Rotation3, Vector3};

#[cfg(test)]
#[path = "geometry_tests.rs"]
mod geometry_tests;

/// Conversion factor from Ångström to bohr.
pub const ANGSTROM_TO_BOHR: f64 = 1.0 / 0.52917721092;

/// Returns the azimuthal angle $`\alpha \in [0, 360)`$ and the polar angle
/// $`\beta \in [0, 180]`$, both in degrees, of a direction.
///
/// # Arguments
///
/// * `uvec` - The direction, not necessarily normalised.
///
/// # Returns
///
/// The pair $`(\alpha, \beta)`$, or an error if `uvec` has a vanishing norm.
pub fn direction_angles(uvec: &Vector3<f64>) -> Result<(f64, f64), anyhow::Error> {
    ensure!(
        uvec.norm() > 1e-12,
        "The direction vector must have a non-vanishing norm."
    );
    let u = uvec.normalize();
    let alpha = if u[1] >= 0.0 {
        u[1].atan2(u[0]).to_degrees()
    } else {
        360.0 + u[1].atan2(u[0]).to_degrees()
    };
    let beta = u[2].clamp(-1.0, 1.0).acos().to_degrees();
    Ok((alpha, beta))
}

/// Returns the $`zyz`$ Euler rotation matrix
/// $`R_z(\alpha) R_y(\beta) R_z(\gamma)`$ with all angles in degrees.
///
/// With $`(\alpha, \beta)`$ given by [`direction_angles`] of a direction $`\hat{u}`$, this
/// matrix maps the $`z`$-axis onto $`\hat{u}`$, and $`\gamma`$ rolls the frame about
/// $`\hat{u}`$.
pub fn euler_zyz(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let rz_alpha = Rotation3::from_axis_angle(&Vector3::z_axis(), alpha.to_radians());
    let ry_beta = Rotation3::from_axis_angle(&Vector3::y_axis(), beta.to_radians());
    let rz_gamma = Rotation3::from_axis_angle(&Vector3::z_axis(), gamma.to_radians());
    (rz_alpha * ry_beta * rz_gamma).into_inner()
}
