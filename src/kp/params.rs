//! Column names of the KP (in-situ key parameters) dataset.
use crate::constants::{whisker_base_name, KP_TIME_COLUMN};

pub const LOCAL_TIME: &str = "spice_spacecraft_local_time";
pub const LATITUDE: &str = "spice_spacecraft_geo_latitude";
pub const LONGITUDE: &str = "spice_spacecraft_geo_longitude";
pub const ALTITUDE: &str = "spice_spacecraft_altitude_w_r_t_ellipsoid";
pub const SUBSOLAR_LATITUDE: &str = "spice_subsolar_point_geo_latitude";
pub const SUBSOLAR_LONGITUDE: &str = "spice_subsolar_point_geo_longitude";
pub const MARS_SUN_DISTANCE: &str = "spice_mars_sun_distance";
pub const SOLAR_ZENITH_ANGLE: &str = "spice_spacecraft_solar_zenith_angle";
pub const SEASON_LS: &str = "spice_mars_season_ls";

pub const SPACECRAFT_ATTITUDE: &str = "spice_spacecraft_attitude_geo";
pub const SPACECRAFT_TO_MSO_MATRIX: &str = "spice_rotation_matrix_maven_spacecraft_maven_mso";
pub const IAU_TO_MSO_MATRIX: &str = "spice_rotation_matrix_iau_mars_maven_mso";

/// Scalar columns requested with every KP request
pub const MANUAL_SELECTION: [&str; 10] = [
    KP_TIME_COLUMN,
    LOCAL_TIME,
    LATITUDE,
    LONGITUDE,
    ALTITUDE,
    SUBSOLAR_LATITUDE,
    SUBSOLAR_LONGITUDE,
    MARS_SUN_DISTANCE,
    SOLAR_ZENITH_ANGLE,
    SEASON_LS,
];

/// `[base_x, base_y, base_z]`
pub fn xyz_triple(base: &str) -> [String; 3] {
    ["x", "y", "z"].map(|axis| format!("{base}_{axis}"))
}

/// The 9 columns of a 3×3 matrix, row-major: `root_1_1, root_1_2, ..., root_3_3`.
pub fn matrix3_param_names(root: &str) -> [String; 9] {
    std::array::from_fn(|i| format!("{root}_{}_{}", i / 3 + 1, i % 3 + 1))
}

/// Every column requested with every KP request, in request order.
pub fn base_selection() -> Vec<String> {
    MANUAL_SELECTION
        .iter()
        .map(|name| name.to_string())
        .chain(xyz_triple(SPACECRAFT_ATTITUDE))
        .chain(matrix3_param_names(SPACECRAFT_TO_MSO_MATRIX))
        .chain(matrix3_param_names(IAU_TO_MSO_MATRIX))
        .collect()
}

/// Column triple of a whisker parameter given its display name.
pub fn whisker_columns(display_name: &str) -> Option<[String; 3]> {
    whisker_base_name(display_name).map(xyz_triple)
}
