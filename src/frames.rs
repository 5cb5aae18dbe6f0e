//! # Mars reference frames
//!
//! The telemetry positions are planet-fixed (IAU_MARS). When the inertial view is requested, the
//! transformer needs the rotation from the fixed frame to the inertial frame at every sample
//! instant. That data comes from a [`FrameTransformProvider`]: it is asked to `preload` an
//! interval, and readiness is tested by trying the transform and checking that an answer comes
//! back.
//!
//! [`IauMarsFrames`] computes the rotation from the IAU 2000 rotational elements of Mars:
//!
//! ```text
//! α0 = 317.68143 − 0.1061 T
//! δ0 =  52.88650 − 0.0609 T
//! W  = 176.630 + 350.89198226 d
//! ```
//!
//! with `d` the TDB days and `T` the Julian centuries since J2000.
use hifitime::Epoch;
use nalgebra::{Matrix3, Rotation3, Vector3};
use parking_lot::RwLock;

use crate::constants::{
    Degree, Meter, Radian, DAYS_PER_JULIAN_CENTURY, J2000_JDE, MARS_RADIUS_METERS, RADEG,
};

/// Source of the planet-fixed → inertial rotation.
pub trait FrameTransformProvider: Send + Sync {
    /// Make the transform available over `[start, end]`. May complete asynchronously.
    fn preload(&self, start: Epoch, end: Epoch);

    /// Rotation taking planet-fixed vectors to the inertial frame, if known at `epoch`.
    fn fixed_to_inertial(&self, epoch: &Epoch) -> Option<Matrix3<f64>>;
}

/// Active rotation matrix of angle `alpha` about the X, Y or Z axis.
///
/// Arguments
/// ---------
/// * `alpha`: angle in radians, positive counter-clockwise
/// * `axis`: the rotation axis
pub fn axis_rotation(alpha: Radian, axis: &nalgebra::Unit<Vector3<f64>>) -> Matrix3<f64> {
    Rotation3::from_axis_angle(axis, alpha).into()
}

/// Planet-fixed position of a point given in degrees at `height` above the Mars sphere.
pub fn sphere_position(latitude: Degree, longitude: Degree, height: Meter) -> Vector3<f64> {
    let (lat, lng) = (latitude * RADEG, longitude * RADEG);
    (MARS_RADIUS_METERS + height)
        * Vector3::new(lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin())
}

/// Latitude and longitude, in degrees, of a planet-fixed position.
pub fn sphere_lat_lng(position: &Vector3<f64>) -> (Degree, Degree) {
    let horizontal = position.x.hypot(position.y);
    (
        position.z.atan2(horizontal) / RADEG,
        position.y.atan2(position.x) / RADEG,
    )
}

/// IAU 2000 rotational elements of Mars at `epoch`.
///
/// Return
/// ------
/// * `(α0, δ0, W)` in degrees: right ascension and declination of the north pole, prime
///   meridian angle
pub fn mars_rotational_elements(epoch: &Epoch) -> (Degree, Degree, Degree) {
    let d = epoch.to_jde_tdb_days() - J2000_JDE;
    let t = d / DAYS_PER_JULIAN_CENTURY;

    let alpha0 = 317.68143 - 0.1061 * t;
    let delta0 = 52.88650 - 0.0609 * t;
    let w = (176.630 + 350.891_982_26 * d).rem_euclid(360.0);
    (alpha0, delta0, w)
}

/// Rotation from IAU_MARS to the inertial (ICRF) frame at `epoch`.
pub fn iau_mars_to_inertial(epoch: &Epoch) -> Matrix3<f64> {
    let (alpha0, delta0, w) = mars_rotational_elements(epoch);
    axis_rotation((90.0 + alpha0) * RADEG, &Vector3::z_axis())
        * axis_rotation((90.0 - delta0) * RADEG, &Vector3::x_axis())
        * axis_rotation(w * RADEG, &Vector3::z_axis())
}

/// Analytical IAU_MARS frames, served only inside the preloaded intervals.
#[derive(Debug, Default)]
pub struct IauMarsFrames {
    loaded: RwLock<Vec<(Epoch, Epoch)>>,
}

impl IauMarsFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, epoch: &Epoch) -> bool {
        self.loaded
            .read()
            .iter()
            .any(|(start, end)| start <= epoch && epoch <= end)
    }
}

impl FrameTransformProvider for IauMarsFrames {
    fn preload(&self, start: Epoch, end: Epoch) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.loaded.write().push((start, end));
    }

    fn fixed_to_inertial(&self, epoch: &Epoch) -> Option<Matrix3<f64>> {
        self.is_loaded(epoch).then(|| iau_mars_to_inertial(epoch))
    }
}
