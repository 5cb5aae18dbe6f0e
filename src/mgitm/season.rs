//! # M-GITM seasons and catalogue
//!
//! The model was run for four Mars seasons only, each on a single date. The subsolar point of
//! those dates is not part of the dataset and is tabulated here:
//!
//! | Ls  | model date             | subsolar latitude | subsolar longitude |
//! |-----|------------------------|-------------------|--------------------|
//! | 0   | 2002-04-17 20:00:00 UT | 0°                | 26.40° E           |
//! | 90  | 2002-11-01 02:00:00 UT | 25.19°            | 11.75° E           |
//! | 180 | 2003-05-06 02:00:00 UT | 0°                | 26.40° E           |
//! | 270 | 2003-09-30 00:00:00 UT | −25.19°           | 8.06° E            |
//!
//! At the equinoxes the subsolar latitude is 0, at the solstices it is ± the Mars axial tilt.
use std::fmt;

use crate::{
    constants::{Degree, Kilometer},
    maven_errors::MavenError,
};

/// Seasons (solar longitude, degrees) covered by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MgitmSolarLongitude {
    /// Northern spring equinox
    Ls0,
    /// Northern summer solstice
    Ls90,
    /// Northern autumn equinox
    Ls180,
    /// Northern winter solstice
    Ls270,
}

impl MgitmSolarLongitude {
    pub const ALL: [MgitmSolarLongitude; 4] = [
        MgitmSolarLongitude::Ls0,
        MgitmSolarLongitude::Ls90,
        MgitmSolarLongitude::Ls180,
        MgitmSolarLongitude::Ls270,
    ];

    pub fn degrees(&self) -> Degree {
        match self {
            MgitmSolarLongitude::Ls0 => 0.0,
            MgitmSolarLongitude::Ls90 => 90.0,
            MgitmSolarLongitude::Ls180 => 180.0,
            MgitmSolarLongitude::Ls270 => 270.0,
        }
    }

    /// Exact modelled season, [`MavenError::UnexpectedSolarLongitude`] otherwise.
    pub fn from_degrees(ls: Degree) -> Result<Self, MavenError> {
        Self::ALL
            .into_iter()
            .find(|season| season.degrees() == ls)
            .ok_or(MavenError::UnexpectedSolarLongitude(ls))
    }

    /// Modelled season closest to a solar longitude in `[0, 360)`.
    ///
    /// Return
    /// ------
    /// * [`MavenError::ImpossibleSeasonAngle`] for NaN or values outside `[0, 360)`
    pub fn nearest(ls: Degree) -> Result<Self, MavenError> {
        match ls {
            x if (315.0..360.0).contains(&x) || (0.0..45.0).contains(&x) => {
                Ok(MgitmSolarLongitude::Ls0)
            }
            x if (45.0..135.0).contains(&x) => Ok(MgitmSolarLongitude::Ls90),
            x if (135.0..225.0).contains(&x) => Ok(MgitmSolarLongitude::Ls180),
            x if (225.0..315.0).contains(&x) => Ok(MgitmSolarLongitude::Ls270),
            x => Err(MavenError::ImpossibleSeasonAngle(x)),
        }
    }

    /// Subsolar `(latitude, longitude)` at the model date of this season.
    pub fn subsolar_point(&self) -> (Degree, Degree) {
        match self {
            MgitmSolarLongitude::Ls0 => (0.0, 26.4),
            MgitmSolarLongitude::Ls90 => (25.19, 11.75),
            MgitmSolarLongitude::Ls180 => (0.0, 26.4),
            MgitmSolarLongitude::Ls270 => (-25.19, 8.06),
        }
    }
}

impl fmt::Display for MgitmSolarLongitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// Subsolar point of the model run for solar longitude `ls`.
pub fn mgitm_subsolar_point(ls: Degree) -> Result<(Degree, Degree), MavenError> {
    MgitmSolarLongitude::from_degrees(ls).map(|season| season.subsolar_point())
}

/// Inclusive `min..=max` grid of the values found in the dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        ValueRange { min, max, step }
    }

    pub fn values(&self) -> Vec<f64> {
        let count = ((self.max - self.min) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| self.min + i as f64 * self.step)
            .collect()
    }
}

/// Model altitudes, in km
pub const DISTINCT_ALTITUDES: ValueRange = ValueRange::new(98.75, 251.25, 2.5);
pub const DISTINCT_LATITUDES: ValueRange = ValueRange::new(-87.5, 87.5, 5.0);
pub const DISTINCT_LONGITUDES: ValueRange = ValueRange::new(2.5, 357.5, 5.0);

/// Solar 10.7 cm flux of the model runs, in solar flux units
pub const DISTINCT_SOLAR_FLUXES: [f64; 3] = [70.0, 130.0, 200.0];

/// Altitude in km closest to `altitude` among [`DISTINCT_ALTITUDES`].
pub fn nearest_altitude(altitude: Kilometer) -> Kilometer {
    let range = DISTINCT_ALTITUDES;
    let steps = ((altitude - range.min) / range.step).round();
    (range.min + steps * range.step).clamp(range.min, range.max)
}
