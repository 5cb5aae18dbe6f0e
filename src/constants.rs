//! # Constants and type definitions for maven3d
//!
//! This module centralizes the **physical constants**, **dataset identifiers**, and **common
//! type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Mars geometry and unit conversions (AU ↔ m, km ↔ m, degrees ↔ radians)
//! - LaTiS dataset names for the KP telemetry and the M-GITM model
//! - Parameter catalogues offered to the UI (orbit colors, whiskers, M-GITM quantities)
//! - Core type aliases shared by the providers and transformers

use nalgebra::{UnitQuaternion, Vector3};

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Mean Mars radius in meters (MARSIAU2000 sphere)
pub const MARS_RADIUS_METERS: f64 = 3_396_000.0;

/// Mars circumference in meters
pub const MARS_CIRCUMFERENCE_METERS: f64 = 21_330_000.0;

/// Upper bound of the Mars-Sun distance in meters
pub const MAX_MARS_SUN_DISTANCE_METERS: f64 = 2.5e11;

/// Astronomical Unit in meters, as used by the KP `spice_mars_sun_distance` column
pub const METERS_IN_AU: f64 = 1.4960e11;

/// Kilometers → meters
pub const METERS_IN_KM: f64 = 1000.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Julian date of the J2000.0 epoch (TDB)
pub const J2000_JDE: f64 = 2_451_545.0;

/// Number of days in a Julian century
pub const DAYS_PER_JULIAN_CENTURY: f64 = 36_525.0;

/// Height kept between the ground track and the surface
pub const GROUND_TRACK_HEIGHT_METERS: f64 = 10.0;

/// Height kept between the subsolar track and the surface (above the ground track)
pub const SUBSOLAR_TRACK_HEIGHT_METERS: f64 = 11.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Distance in meters
pub type Meter = f64;

/// Requirement fragment contributed by one consumer
pub type Fragment = serde_json::Map<String, serde_json::Value>;

// -------------------------------------------------------------------------------------------------
// Datasets
// -------------------------------------------------------------------------------------------------

/// KP in-situ telemetry dataset
pub const KP_DATASET: &str = "in_situ_kp";

/// KP dataset used for the overall available date range
pub const KP_DATES_DATASET: &str = "in_situ_kp_data";

/// KP parameter description dataset
pub const KP_QUERY_PARAMETERS_DATASET: &str = "in_situ_kp_query_parameters";

/// M-GITM atmospheric model dataset
pub const MGITM_DATASET: &str = "mgitm";

/// Name of the time column in the KP datasets
pub const KP_TIME_COLUMN: &str = "timetag";

/// Sentinel used by the UI for "no parameter selected"
pub const NONE_PARAM: &str = "none";

// -------------------------------------------------------------------------------------------------
// Parameter catalogues
// -------------------------------------------------------------------------------------------------

/// 1-D KP parameters that can be mapped onto the orbit path colors
pub const ORBIT_COLOR_PARAMETERS: [&str; 4] = [
    "ngims_ar_density",
    "ngims_co2_density",
    "ngims_co_density",
    "ngims_he_density",
];

/// 3-D KP parameters that can be drawn as whiskers, keyed by display name.
/// Each entry is the base name of an `_x/_y/_z` triple in the MSO frame.
pub const ORBIT_WHISKER_PARAMETERS: [(&str, &str); 5] = [
    ("Magnetic Field", "mag_magnetic_field_mso"),
    ("SWIA H+ Flow Velocity", "swia_hplus_flow_velocity_mso"),
    ("STATIC O2+ Flow Velocity", "static_o2plus_flow_velocity_mso"),
    (
        "STATIC H+ Characteristic Direction",
        "static_hplus_characteristic_direction_mso",
    ),
    (
        "STATIC Dominant Pickup Ion Characteristic Direction",
        "static_dominant_pickup_ion_characteristic_direction_mso",
    ),
];

/// Quantities available in the M-GITM dataset
pub const MGITM_PARAMETERS: [&str; 15] = [
    "o2plus",
    "oplus",
    "co2plus",
    "n_e",
    "co2",
    "co",
    "n2",
    "o2",
    "o",
    "Zonal_vel",
    "Merid_vel",
    "Vert_vel",
    "Temp_tn",
    "Temp_ti",
    "Temp_te",
];

/// Look up the base column name of a whisker parameter from its display name.
pub fn whisker_base_name(display_name: &str) -> Option<&'static str> {
    ORBIT_WHISKER_PARAMETERS
        .iter()
        .find(|(name, _)| *name == display_name)
        .map(|(_, base)| *base)
}

/// Axis correction between the spacecraft model axes and the data axes:
/// a -90° turn about X followed by a 90° turn about Z.
pub fn model_axis_correction() -> UnitQuaternion<f64> {
    let correction1 = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -90.0 * RADEG);
    let correction2 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 90.0 * RADEG);
    correction2 * correction1
}
