//! # KP prettifier
//!
//! Turns the indexed rows of the KP table into named [`KpSample`] records: units are converted
//! to meters, vectors and 3×3 matrices are rebuilt from their flat columns, and the rotation
//! from the spacecraft frame to the planet body frame is derived.
//!
//! Multi-column quantities follow a fail-together rule. If one of their columns is absent from
//! the table, the quantity is absent for every row; if one component is null or NaN in a row,
//! the quantity is absent for that row only. A quantity is never partially populated.
use std::sync::Arc;

use hifitime::Epoch;
use nalgebra::{Matrix3, Vector3};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    constants::{Degree, Meter, METERS_IN_AU, METERS_IN_KM, NONE_PARAM},
    fragment,
    kp::params::{self, matrix3_param_names, whisker_columns, xyz_triple},
    latis::{row_f64, TabularResult},
    maven_errors::MavenError,
    pipeline::DataTransformer,
    requirements::RequirementsManager,
    time::epoch_from_cell,
};

/// One telemetry row, with named and converted fields.
///
/// Scalar fields are NaN when the cell is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct KpSample {
    pub timestamp: Epoch,
    pub latitude: Degree,
    pub longitude: Degree,
    pub height: Meter,
    pub subsolar_latitude: Degree,
    pub subsolar_longitude: Degree,
    pub mars_sun_distance: Meter,
    pub solar_zenith_angle: Degree,
    pub solar_longitude: Degree,

    pub spacecraft_attitude: Option<Vector3<f64>>,
    pub body_to_mso: Option<Matrix3<f64>>,
    pub spacecraft_to_mso: Option<Matrix3<f64>>,
    pub mso_to_body: Option<Matrix3<f64>>,
    pub spacecraft_to_body: Option<Matrix3<f64>>,

    /// `None` when no color parameter is in the batch, `Some(None)` when its value is missing
    /// in this row
    pub color_param: Option<Option<f64>>,

    /// `None` when no whisker parameter is in the batch, `Some(None)` when the vector is
    /// missing in this row. The vector is in the body frame.
    pub whisker_body: Option<Option<Vector3<f64>>>,
}

/// Parameters chosen by the consumers, saved at requirement-gathering time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedParams {
    pub param_1d: Option<String>,
    /// Display name of the whisker parameter
    pub param_3d: Option<String>,
}

fn not_none(param: Option<String>) -> Option<String> {
    param.filter(|p| p != NONE_PARAM)
}

/// Column indices of one reshape pass, resolved once per table.
struct ColumnIndices {
    latitude: Option<usize>,
    longitude: Option<usize>,
    altitude: Option<usize>,
    subsolar_latitude: Option<usize>,
    subsolar_longitude: Option<usize>,
    mars_sun_distance: Option<usize>,
    solar_zenith_angle: Option<usize>,
    season_ls: Option<usize>,
    attitude: Option<Vec<usize>>,
    spacecraft_to_mso: Option<Vec<usize>>,
    body_to_mso: Option<Vec<usize>>,
    color: Option<Option<usize>>,
    whisker: Option<Option<Vec<usize>>>,
}

impl ColumnIndices {
    fn resolve(table: &TabularResult, selected: &SelectedParams) -> Self {
        let color = selected
            .param_1d
            .as_deref()
            .and_then(|param| table.column_index(param))
            .map(Some);

        let whisker = selected.param_3d.as_deref().map(|display_name| {
            let indices =
                whisker_columns(display_name).and_then(|cols| table.column_indices(&cols));
            if indices.is_none() {
                warn!(whisker = display_name, "whisker columns missing from the KP table");
            }
            indices
        });

        ColumnIndices {
            latitude: table.column_index(params::LATITUDE),
            longitude: table.column_index(params::LONGITUDE),
            altitude: table.column_index(params::ALTITUDE),
            subsolar_latitude: table.column_index(params::SUBSOLAR_LATITUDE),
            subsolar_longitude: table.column_index(params::SUBSOLAR_LONGITUDE),
            mars_sun_distance: table.column_index(params::MARS_SUN_DISTANCE),
            solar_zenith_angle: table.column_index(params::SOLAR_ZENITH_ANGLE),
            season_ls: table.column_index(params::SEASON_LS),
            attitude: table.column_indices(&xyz_triple(params::SPACECRAFT_ATTITUDE)),
            spacecraft_to_mso: table
                .column_indices(&matrix3_param_names(params::SPACECRAFT_TO_MSO_MATRIX)),
            body_to_mso: table.column_indices(&matrix3_param_names(params::IAU_TO_MSO_MATRIX)),
            color,
            whisker,
        }
    }
}

fn scalar(row: &[Value], index: Option<usize>) -> f64 {
    index.and_then(|i| row_f64(row, i)).unwrap_or(f64::NAN)
}

/// Vector from 3 column indices; `None` if any component is invalid.
pub fn extract_vector3(row: &[Value], indices: &[usize]) -> Option<Vector3<f64>> {
    match indices {
        [x, y, z] => Some(Vector3::new(
            row_f64(row, *x)?,
            row_f64(row, *y)?,
            row_f64(row, *z)?,
        )),
        _ => None,
    }
}

/// Row-major 3×3 matrix from 9 column indices; `None` if any component is invalid.
pub fn extract_matrix3(row: &[Value], indices: &[usize]) -> Option<Matrix3<f64>> {
    if indices.len() != 9 {
        return None;
    }
    let values = indices
        .iter()
        .map(|&i| row_f64(row, i))
        .collect::<Option<Vec<f64>>>()?;
    Some(Matrix3::from_row_slice(&values))
}

pub struct KpDataPrettifier {
    requirements_manager: Arc<RequirementsManager>,
    selected: Arc<RwLock<SelectedParams>>,
}

impl std::fmt::Debug for KpDataPrettifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpDataPrettifier")
            .field("selected", &*self.selected.read())
            .finish()
    }
}

impl KpDataPrettifier {
    /// Create the prettifier and register its requirements on the provider's manager.
    ///
    /// The registered callback gathers the prettifier's own consumers, keeps their
    /// selected parameters for [`reshape`](Self::reshape), and forwards them with the whisker
    /// display name replaced by its column triple.
    pub fn attach(provider_requirements: &RequirementsManager) -> Self {
        let requirements_manager = Arc::new(RequirementsManager::new());
        let selected = Arc::new(RwLock::new(SelectedParams::default()));

        let downstream = requirements_manager.clone();
        let saved = selected.clone();
        provider_requirements.add_requirements_provider(move || {
            let requirements = downstream.gather_requirements();
            let param_1d = not_none(
                requirements
                    .find_first("selectedParam1d")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            );
            let param_3d = not_none(
                requirements
                    .find_first("selectedParam3d")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            );

            let whisker = param_3d
                .as_deref()
                .and_then(whisker_columns)
                .map_or(Value::from(NONE_PARAM), |cols| Value::from(cols.to_vec()));
            let selection = Value::Array(requirements.concat_all("selection"));
            let timeframe = requirements.find_first("timeframe").cloned();
            let color = Value::from(param_1d.clone().unwrap_or_else(|| NONE_PARAM.to_string()));

            *saved.write() = SelectedParams { param_1d, param_3d };

            fragment! {
                "selection" => selection,
                "timeframe" => timeframe,
                "selectedParam1d" => color,
                "selectedParam3d" => whisker
            }
        });

        KpDataPrettifier {
            requirements_manager,
            selected,
        }
    }

    /// Manager on which the telemetry transformer registers.
    pub fn requirements_manager(&self) -> &RequirementsManager {
        &self.requirements_manager
    }

    pub fn selected_params(&self) -> SelectedParams {
        self.selected.read().clone()
    }

    /// Reshape `table` with the parameters saved at the last requirement gathering.
    pub fn reshape(&self, table: &TabularResult) -> Vec<KpSample> {
        reshape(table, &self.selected.read())
    }
}

/// Reshape the rows of a KP table into [`KpSample`]s.
///
/// Rows whose timestamp cannot be read are skipped.
///
/// Arguments
/// ---------
/// * `table`: the merged KP table, timestamp first
/// * `selected`: the color and whisker parameters of the batch
pub fn reshape(table: &TabularResult, selected: &SelectedParams) -> Vec<KpSample> {
    let indices = ColumnIndices::resolve(table, selected);
    let mut skipped = 0_usize;

    let samples: Vec<KpSample> = table
        .data
        .iter()
        .filter_map(|row| {
            let timestamp = match row.first().map(epoch_from_cell) {
                Some(Ok(epoch)) => epoch,
                _ => {
                    skipped += 1;
                    return None;
                }
            };

            let body_to_mso = indices
                .body_to_mso
                .as_deref()
                .and_then(|idx| extract_matrix3(row, idx));
            let spacecraft_to_mso = indices
                .spacecraft_to_mso
                .as_deref()
                .and_then(|idx| extract_matrix3(row, idx));

            // rotation only: the transpose is the inverse
            let mso_to_body = body_to_mso.map(|m| m.transpose());
            let spacecraft_to_body = mso_to_body
                .zip(spacecraft_to_mso)
                .map(|(mso_to_body, sc_to_mso)| mso_to_body * sc_to_mso);

            let color_param = indices
                .color
                .map(|index| index.and_then(|i| row_f64(row, i)));
            let whisker_body = indices.whisker.as_ref().map(|whisker| {
                let mso = whisker.as_deref().and_then(|idx| extract_vector3(row, idx));
                mso.zip(mso_to_body).map(|(v, m)| m * v)
            });

            Some(KpSample {
                timestamp,
                latitude: scalar(row, indices.latitude),
                longitude: scalar(row, indices.longitude),
                height: scalar(row, indices.altitude) * METERS_IN_KM,
                subsolar_latitude: scalar(row, indices.subsolar_latitude),
                subsolar_longitude: scalar(row, indices.subsolar_longitude),
                mars_sun_distance: scalar(row, indices.mars_sun_distance) * METERS_IN_AU,
                solar_zenith_angle: scalar(row, indices.solar_zenith_angle),
                solar_longitude: scalar(row, indices.season_ls),
                spacecraft_attitude: indices
                    .attitude
                    .as_deref()
                    .and_then(|idx| extract_vector3(row, idx)),
                body_to_mso,
                spacecraft_to_mso,
                mso_to_body,
                spacecraft_to_body,
                color_param,
                whisker_body,
            })
        })
        .collect();

    if skipped > 0 {
        warn!(skipped, "KP rows without a readable timestamp");
    }
    debug!(samples = samples.len(), "KP table reshaped");
    samples
}

impl DataTransformer for KpDataPrettifier {
    type Input = TabularResult;
    type Output = Vec<KpSample>;

    fn transform(&self, input: &TabularResult) -> Result<Vec<KpSample>, MavenError> {
        Ok(self.reshape(input))
    }
}

#[cfg(test)]
mod prettifier_test {
    use super::*;
    use crate::{constants::KP_TIME_COLUMN, kp::params::base_selection};
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;
    use serde_json::{json, Map};

    fn matrix_cells(m: &Matrix3<f64>) -> Vec<Value> {
        (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .map(|(r, c)| json!(m[(r, c)]))
            .collect()
    }

    fn kp_row(timestamp: f64, body_to_mso: &Matrix3<f64>, sc_to_mso: &Matrix3<f64>) -> Vec<Value> {
        let mut row = vec![
            json!(timestamp),
            json!(12.0),
            json!(10.0),
            json!(20.0),
            json!(400.0),
            json!(-5.0),
            json!(30.0),
            json!(1.5),
            json!(80.0),
            json!(120.0),
            json!(0.0),
            json!(0.0),
            json!(1.0),
        ];
        row.extend(matrix_cells(sc_to_mso));
        row.extend(matrix_cells(body_to_mso));
        row
    }

    fn kp_table(rows: Vec<Vec<Value>>) -> TabularResult {
        TabularResult::new(base_selection(), rows, Map::new()).unwrap()
    }

    #[test]
    fn test_units_and_rotations() {
        let body_to_mso = Rotation3::from_euler_angles(0.3, -1.1, 2.0).into_inner();
        let sc_to_mso = Rotation3::from_euler_angles(-0.7, 0.2, 0.9).into_inner();
        let table = kp_table(vec![kp_row(1.4251680e12, &body_to_mso, &sc_to_mso)]);

        let samples = reshape(&table, &SelectedParams::default());
        assert_eq!(samples.len(), 1);
        let sample = &samples[0];

        assert_eq!(sample.height, 400_000.0);
        assert_eq!(sample.mars_sun_distance, 1.5 * METERS_IN_AU);
        assert_eq!(sample.solar_longitude, 120.0);
        assert_eq!(sample.spacecraft_attitude, Some(Vector3::z()));
        assert_eq!(sample.color_param, None);
        assert_eq!(sample.whisker_body, None);

        let mso_to_body = sample.mso_to_body.unwrap();
        assert_relative_eq!(mso_to_body * body_to_mso, Matrix3::identity(), epsilon = 1e-9);
        assert_relative_eq!(
            sample.spacecraft_to_body.unwrap(),
            body_to_mso.transpose() * sc_to_mso,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_transpose_inverts_any_rotation() {
        // spread of Euler triples over the whole rotation group
        let angles = |i: f64| {
            (
                std::f64::consts::PI * (1.3 * i).sin(),
                std::f64::consts::FRAC_PI_2 * (0.7 * i + 0.4).cos(),
                std::f64::consts::PI * (2.9 * i + 1.1).sin(),
            )
        };
        let rows: Vec<Vec<Value>> = (0..64)
            .map(|i| {
                let (r1, p1, y1) = angles(i as f64);
                let (r2, p2, y2) = angles(i as f64 + 0.5);
                kp_row(
                    1.0e12 + 4000.0 * i as f64,
                    &Rotation3::from_euler_angles(r1, p1, y1).into_inner(),
                    &Rotation3::from_euler_angles(r2, p2, y2).into_inner(),
                )
            })
            .collect();

        let samples = reshape(&kp_table(rows), &SelectedParams::default());
        assert_eq!(samples.len(), 64);
        for sample in &samples {
            let body_to_mso = sample.body_to_mso.unwrap();
            let mso_to_body = sample.mso_to_body.unwrap();
            assert_relative_eq!(mso_to_body * body_to_mso, Matrix3::identity(), epsilon = 1e-9);
            assert_relative_eq!(
                sample.spacecraft_to_body.unwrap().determinant(),
                1.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_invalid_component_invalidates_quantity() {
        let identity = Matrix3::identity();
        let mut row = kp_row(1.0e12, &identity, &identity);
        // spice_spacecraft_attitude_geo_y
        row[11] = Value::Null;
        // spice_rotation_matrix_maven_spacecraft_maven_mso_2_2
        row[17] = json!("NaN");
        let samples = reshape(&kp_table(vec![row]), &SelectedParams::default());

        assert_eq!(samples[0].spacecraft_attitude, None);
        assert_eq!(samples[0].spacecraft_to_mso, None);
        assert_eq!(samples[0].spacecraft_to_body, None);
        assert_eq!(samples[0].body_to_mso, Some(identity));
    }

    #[test]
    fn test_missing_column_fails_together() {
        let identity = Matrix3::identity();
        let mut table = kp_table(vec![kp_row(1.0e12, &identity, &identity)]);
        table.parameters[12] = "renamed".into();
        let samples = reshape(&table, &SelectedParams::default());
        assert_eq!(samples[0].spacecraft_attitude, None);
    }

    #[test]
    fn test_whisker_columns_missing_from_table() {
        let identity = Matrix3::identity();
        let table = kp_table(vec![kp_row(1.0e12, &identity, &identity)]);
        let selected = SelectedParams {
            param_1d: None,
            param_3d: Some("Magnetic Field".into()),
        };
        let samples = reshape(&table, &selected);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].whisker_body, Some(None));
    }

    #[test]
    fn test_color_and_whisker_columns() {
        let body_to_mso = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.5).into_inner();
        let identity = Matrix3::identity();
        let mut rows = vec![
            kp_row(1.0e12, &body_to_mso, &identity),
            kp_row(1.0e12 + 4000.0, &body_to_mso, &identity),
        ];
        rows[0].extend([json!(3.5), json!(1.0), json!(0.0), json!(0.0)]);
        rows[1].extend([Value::Null, Value::Null, Value::Null, Value::Null]);

        let mut parameters = base_selection();
        parameters.push("ngims_ar_density".into());
        parameters.extend(xyz_triple("mag_magnetic_field_mso"));
        let table = TabularResult::new(parameters, rows, Map::new()).unwrap();

        let selected = SelectedParams {
            param_1d: Some("ngims_ar_density".into()),
            param_3d: Some("Magnetic Field".into()),
        };
        let samples = reshape(&table, &selected);

        assert_eq!(samples[0].color_param, Some(Some(3.5)));
        assert_eq!(samples[1].color_param, Some(None));
        assert_relative_eq!(
            samples[0].whisker_body.unwrap().unwrap(),
            body_to_mso.transpose() * Vector3::x(),
            epsilon = 1e-12
        );
        assert_eq!(samples[1].whisker_body, Some(None));
    }

    #[test]
    fn test_requirements_forwarded_upward() {
        let provider_manager = RequirementsManager::new();
        let prettifier = KpDataPrettifier::attach(&provider_manager);
        prettifier.requirements_manager().add_requirements_provider(|| {
            fragment! {
                "selection" => [KP_TIME_COLUMN],
                "timeframe" => { "start": "2015-03-01T00:00:00Z", "end": "2015-03-02T00:00:00Z" },
                "selectedParam1d" => "none",
                "selectedParam3d" => "SWIA H+ Flow Velocity"
            }
        });

        let upward = provider_manager.gather_requirements();
        assert_eq!(upward.find_first("selectedParam1d"), Some(&json!("none")));
        assert_eq!(
            upward.find_first("selectedParam3d"),
            Some(&json!([
                "swia_hplus_flow_velocity_mso_x",
                "swia_hplus_flow_velocity_mso_y",
                "swia_hplus_flow_velocity_mso_z"
            ]))
        );
        assert_eq!(upward.concat_all_strings("selection").unwrap(), vec!["timetag"]);
        assert_eq!(
            prettifier.selected_params(),
            SelectedParams {
                param_1d: None,
                param_3d: Some("SWIA H+ Flow Velocity".into()),
            }
        );
    }
}
