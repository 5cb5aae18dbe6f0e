//! # M-GITM transformer
//!
//! Turns one M-GITM layer into a colored latitude × longitude grid, and orients that grid so
//! that the model's subsolar point follows the subsolar point of the KP telemetry.
//!
//! ## Alignment
//!
//! The model was computed for one date per season, so its subsolar point is fixed. At a time
//! `t` the grid is rotated in two steps:
//!
//! 1. about the polar axis by `kp_lng − mgitm_lng`, bringing the model subsolar point onto the
//!    meridian of the KP subsolar point,
//! 2. about `Z × kp_subsolar` (normal to that meridian plane) by `mgitm_lat − kp_lat`, moving
//!    it north or south onto the KP subsolar point.
//!
//! The orientation is evaluated at query time. Until the KP subsolar curve is known (the two
//! chains load independently), it is the identity.
use std::{fmt, sync::Arc};

use hifitime::Epoch;
use itertools::Itertools;
use nalgebra::{Unit, UnitQuaternion, Vector3};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    colors::{find_min_max, interpolate, Color, ColorMap, DEFAULT_COLORMAP},
    constants::{
        Degree, Meter, GROUND_TRACK_HEIGHT_METERS, MARS_RADIUS_METERS, METERS_IN_KM, RADEG,
    },
    fragment,
    frames::{sphere_lat_lng, sphere_position},
    kp::KpProperties,
    latis::{row_f64, TabularResult},
    maven_errors::MavenError,
    mgitm::{
        provider::{MgitmDataProvider, LATITUDE_COLUMN, LONGITUDE_COLUMN},
        season::mgitm_subsolar_point,
    },
    pipeline::{DataProvider, DataReady, DataTransformer, TransformerCore},
    properties::SampledProperty,
    requirements::RequirementsManager,
};

/// Requirements of an M-GITM layer, parsed when they are gathered.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MgitmRequirements {
    pub parameter: Option<String>,
    pub display_type: Option<String>,
    pub solar_flux: Option<f64>,
    pub solar_longitude: Option<Degree>,
    /// km
    pub altitude: Option<f64>,
}

/// Time-dependent rotation aligning the model subsolar point on the KP one.
#[derive(Debug, Clone, PartialEq)]
pub struct MgitmOrientation {
    /// `(latitude, longitude)` of the model subsolar point
    pub mgitm_subsolar: (Degree, Degree),
    /// KP subsolar track, if already published
    pub kp_subsolar: Option<Arc<SampledProperty<Vector3<f64>>>>,
}

impl MgitmOrientation {
    fn kp_subsolar_at(&self, epoch: &Epoch) -> Option<Vector3<f64>> {
        self.kp_subsolar
            .as_ref()
            .and_then(|curve| curve.value_at(epoch))
    }

    /// Axis of the north-south rotation: `Z × kp_subsolar`, 2 Mars radii long.
    ///
    /// Return
    /// ------
    /// * `+Z` while the KP curve is absent, `None` when it is not defined at `epoch` or the KP
    ///   subsolar point is on the pole
    pub fn second_rotation_axis(&self, epoch: &Epoch) -> Option<Vector3<f64>> {
        if self.kp_subsolar.is_none() {
            return Some(Vector3::z());
        }
        let kp_subsolar = self.kp_subsolar_at(epoch)?;
        Vector3::z()
            .cross(&kp_subsolar)
            .try_normalize(1e-12)
            .map(|axis| axis * 2.0 * MARS_RADIUS_METERS)
    }

    /// Rotation to apply to the grid at `epoch`, identity when it cannot be computed.
    pub fn value_at(&self, epoch: &Epoch) -> UnitQuaternion<f64> {
        let Some(kp_subsolar) = self.kp_subsolar_at(epoch) else {
            return UnitQuaternion::identity();
        };
        let Some(axis) = Unit::try_new(Vector3::z().cross(&kp_subsolar), 1e-12) else {
            return UnitQuaternion::identity();
        };
        let (kp_lat, kp_lng) = sphere_lat_lng(&kp_subsolar);
        let (mgitm_lat, mgitm_lng) = self.mgitm_subsolar;

        let rotation1 =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), (kp_lng - mgitm_lng) * RADEG);
        let rotation2 = UnitQuaternion::from_axis_angle(&axis, (mgitm_lat - kp_lat) * RADEG);
        rotation2 * rotation1
    }
}

/// One colored M-GITM layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MgitmProperties {
    /// `pixel_grid[lat][lng]`, `None` where the table has no row
    pub pixel_grid: Vec<Vec<Option<Color>>>,
    /// Row labels, descending (north first)
    pub latitudes: Vec<Degree>,
    /// Column labels, ascending
    pub longitudes: Vec<Degree>,
    pub altitude_meters: Option<Meter>,
    /// Model subsolar point, 10 m above the surface
    pub subsolar_point: Vector3<f64>,
    pub orientation: MgitmOrientation,
    pub colormap: ColorMap,
    pub min: f64,
    pub max: f64,
}

/// Distinct valid values of a column, in ascending order.
fn distinct_sorted(table: &TabularResult, index: Option<usize>) -> Vec<f64> {
    let Some(index) = index else {
        return Vec::new();
    };
    table
        .data
        .iter()
        .filter_map(|row| row_f64(row, index))
        .sorted_by(f64::total_cmp)
        .dedup()
        .collect()
}

/// Build the colored grid of an M-GITM table.
///
/// Arguments
/// ---------
/// * `table`: `[Latitude, Longitude, parameter]` rows
/// * `requirements`: the layer the table was requested for
/// * `kp_subsolar`: the last published KP subsolar track
///
/// Return
/// ------
/// * [`MavenError::MissingRequirement`] without a solar longitude,
///   [`MavenError::UnexpectedSolarLongitude`] when it is not a modelled season
pub fn build_mgitm_properties(
    table: &TabularResult,
    requirements: &MgitmRequirements,
    kp_subsolar: Option<Arc<SampledProperty<Vector3<f64>>>>,
) -> Result<MgitmProperties, MavenError> {
    let solar_longitude = requirements
        .solar_longitude
        .ok_or_else(|| MavenError::MissingRequirement("solarLongitude".into()))?;
    let (mgitm_lat, mgitm_lng) = mgitm_subsolar_point(solar_longitude)?;

    let lat_index = table.column_index(LATITUDE_COLUMN);
    let lng_index = table.column_index(LONGITUDE_COLUMN);
    let value_index = requirements
        .parameter
        .as_deref()
        .and_then(|param| table.column_index(param));

    // north pole on the first row
    let mut latitudes = distinct_sorted(table, lat_index);
    latitudes.reverse();
    let longitudes = distinct_sorted(table, lng_index);

    let (min, max) = find_min_max(
        table
            .data
            .iter()
            .map(|row| value_index.and_then(|i| row_f64(row, i))),
    );

    let mut pixel_grid = vec![vec![None; longitudes.len()]; latitudes.len()];
    if let (Some(lat_index), Some(lng_index)) = (lat_index, lng_index) {
        for row in &table.data {
            let (Some(lat), Some(lng)) = (row_f64(row, lat_index), row_f64(row, lng_index)) else {
                continue;
            };
            let row_index = latitudes.binary_search_by(|probe| lat.total_cmp(probe));
            let col_index = longitudes.binary_search_by(|probe| probe.total_cmp(&lng));
            if let (Ok(r), Ok(c)) = (row_index, col_index) {
                let value = value_index
                    .and_then(|i| row_f64(row, i))
                    .unwrap_or(f64::NAN);
                pixel_grid[r][c] = Some(interpolate(value, min, max, &DEFAULT_COLORMAP));
            }
        }
    }

    debug!(
        rows = latitudes.len(),
        columns = longitudes.len(),
        min,
        max,
        "M-GITM grid built"
    );

    Ok(MgitmProperties {
        pixel_grid,
        latitudes,
        longitudes,
        altitude_meters: requirements.altitude.map(|km| km * METERS_IN_KM),
        subsolar_point: sphere_position(mgitm_lat, mgitm_lng, GROUND_TRACK_HEIGHT_METERS),
        orientation: MgitmOrientation {
            mgitm_subsolar: (mgitm_lat, mgitm_lng),
            kp_subsolar,
        },
        colormap: DEFAULT_COLORMAP,
        min,
        max,
    })
}

type SubsolarTrack = Arc<SampledProperty<Vector3<f64>>>;

/// A fetched table together with the requirements it was requested with.
#[derive(Debug, Clone, PartialEq)]
pub struct MgitmLayer {
    pub table: TabularResult,
    pub requirements: MgitmRequirements,
}

/// Shared between the transformer and its callbacks
#[derive(Debug, Default)]
struct MgitmState {
    /// Last gathered requirements
    requirements: RwLock<MgitmRequirements>,
    kp_subsolar: RwLock<Option<SubsolarTrack>>,
}

impl MgitmState {
    fn build(&self, layer: &MgitmLayer) -> Result<MgitmProperties, MavenError> {
        build_mgitm_properties(
            &layer.table,
            &layer.requirements,
            self.kp_subsolar.read().clone(),
        )
    }
}

pub struct MgitmDataTransformer {
    provider: Arc<MgitmDataProvider>,
    core: Arc<TransformerCore<MgitmLayer, MgitmProperties>>,
    state: Arc<MgitmState>,
}

impl fmt::Debug for MgitmDataTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MgitmDataTransformer")
            .field("core", &self.core)
            .field("requirements", &*self.state.requirements.read())
            .field("has_kp_subsolar", &self.state.kp_subsolar.read().is_some())
            .finish()
    }
}

impl MgitmDataTransformer {
    /// Create the transformer and register its requirements on the provider.
    ///
    /// Consumers register on [`requirements_manager`](Self::requirements_manager) with
    /// `parameter`, `displayType`, `solarFlux`, `solarLongitude` and `altitude`.
    pub fn new(provider: Arc<MgitmDataProvider>) -> Self {
        let core = Arc::new(TransformerCore::new());
        let state = Arc::new(MgitmState::default());

        let downstream = core.clone();
        let saved = state.clone();
        provider.requirements_manager().add_requirements_provider(move || {
            let requirements = downstream.requirements_manager().gather_requirements();
            let forwarded = fragment! {
                "parameter" => (requirements.find_first("parameter")),
                "displayType" => (requirements.find_first("displayType")),
                "solarFlux" => (requirements.find_first("solarFlux")),
                "solarLongitude" => (requirements.find_first("solarLongitude")),
                "altitude" => (requirements.find_first("altitude"))
            };
            match serde_json::from_value::<MgitmRequirements>(Value::Object(forwarded.clone())) {
                Ok(parsed) => *saved.requirements.write() = parsed,
                Err(err) => error!(%err, "unreadable M-GITM requirements"),
            }
            forwarded
        });

        MgitmDataTransformer {
            provider,
            core,
            state,
        }
    }

    pub fn requirements_manager(&self) -> &RequirementsManager {
        self.core.requirements_manager()
    }

    pub fn data_ready(&self) -> &DataReady<MgitmProperties> {
        self.core.data_ready()
    }

    /// Follow the subsolar track published by the KP transformer.
    ///
    /// Every KP publication replaces the track and republishes the last M-GITM layer with
    /// the new alignment, without fetching it again. The layer keeps the requirements it was
    /// fetched with, whatever reload is in flight.
    pub fn follow_kp(&self, kp_ready: &DataReady<KpProperties>) {
        let core = self.core.clone();
        let state = self.state.clone();
        kp_ready.add_listener(move |kp| {
            *state.kp_subsolar.write() = Some(Arc::new(kp.subsolar_track_position.clone()));
            if let Err(err) = core.replay(|layer| state.build(layer)) {
                error!(%err, "failed to realign the M-GITM layer");
            }
        });
    }

    /// Fetch, transform and publish the requested layer.
    pub async fn request_reload(&self) -> Result<Arc<MgitmProperties>, MavenError> {
        self.core
            .reload(
                async {
                    let table = self.provider.request_data().await?;
                    // gathered by this request: a newer reload would have cancelled it
                    let requirements = self.state.requirements.read().clone();
                    Ok(Arc::new(MgitmLayer {
                        table,
                        requirements,
                    }))
                },
                |layer| self.transform(layer),
            )
            .await
    }
}

impl DataTransformer for MgitmDataTransformer {
    type Input = MgitmLayer;
    type Output = MgitmProperties;

    fn transform(&self, layer: &MgitmLayer) -> Result<MgitmProperties, MavenError> {
        self.state.build(layer)
    }
}

#[cfg(test)]
mod transformer_test {
    use super::*;
    use approx::assert_relative_eq;
    use hifitime::Unit as TimeUnit;
    use serde_json::{json, Map};

    fn requirements(ls: f64) -> MgitmRequirements {
        MgitmRequirements {
            parameter: Some("co2".into()),
            display_type: Some("shell".into()),
            solar_flux: Some(130.0),
            solar_longitude: Some(ls),
            altitude: Some(151.25),
        }
    }

    fn table(rows: Vec<Vec<Value>>) -> TabularResult {
        TabularResult::new(
            vec!["Latitude".into(), "Longitude".into(), "co2".into()],
            rows,
            Map::new(),
        )
        .unwrap()
    }

    fn subsolar_track(lat: Degree, lng: Degree) -> Arc<SampledProperty<Vector3<f64>>> {
        let t0 = Epoch::from_gregorian_utc_at_midnight(2015, 3, 1);
        let mut curve = SampledProperty::new();
        curve.add_sample(t0, sphere_position(lat, lng, 11.0));
        curve.add_sample(t0 + 60.0 * TimeUnit::Second, sphere_position(lat, lng, 11.0));
        Arc::new(curve)
    }

    #[test]
    fn test_grid_layout() {
        let table = table(vec![
            vec![json!(10.0), json!(5.0), json!(1.0)],
            vec![json!(-10.0), json!(1.0), json!(2.0)],
            vec![json!(0.0), json!(3.0), json!(3.0)],
            vec![json!(10.0), json!(1.0), Value::Null],
        ]);
        let properties = build_mgitm_properties(&table, &requirements(90.0), None).unwrap();

        assert_eq!(properties.latitudes, vec![10.0, 0.0, -10.0]);
        assert_eq!(properties.longitudes, vec![1.0, 3.0, 5.0]);
        assert_eq!((properties.min, properties.max), (1.0, 3.0));
        assert_eq!(properties.altitude_meters, Some(151_250.0));

        let grid = &properties.pixel_grid;
        assert_eq!(grid[0][2], Some(DEFAULT_COLORMAP.stops[0].color));
        assert_eq!(grid[2][0], Some(DEFAULT_COLORMAP.color_at(0.5)));
        assert_eq!(grid[1][1], Some(DEFAULT_COLORMAP.stops[4].color));
        assert_eq!(grid[0][0], Some(crate::colors::MISSING_VALUE_COLOR));
        assert_eq!(grid[1][0], None);
    }

    #[test]
    fn test_empty_table() {
        let properties =
            build_mgitm_properties(&TabularResult::default(), &requirements(0.0), None).unwrap();
        assert!(properties.pixel_grid.is_empty());
        assert!(properties.min.is_nan());
    }

    #[test]
    fn test_subsolar_point() {
        let properties =
            build_mgitm_properties(&table(vec![]), &requirements(270.0), None).unwrap();
        let (lat, lng) = sphere_lat_lng(&properties.subsolar_point);
        assert_relative_eq!(lat, -25.19, epsilon = 1e-9);
        assert_relative_eq!(lng, 8.06, epsilon = 1e-9);

        assert_eq!(
            build_mgitm_properties(&table(vec![]), &requirements(45.0), None),
            Err(MavenError::UnexpectedSolarLongitude(45.0))
        );
    }

    #[test]
    fn test_orientation_without_kp() {
        let orientation = MgitmOrientation {
            mgitm_subsolar: (25.19, 11.75),
            kp_subsolar: None,
        };
        let t = Epoch::from_gregorian_utc_at_midnight(2015, 3, 1);
        assert_eq!(orientation.value_at(&t), UnitQuaternion::identity());
        assert_eq!(orientation.second_rotation_axis(&t), Some(Vector3::z()));
    }

    #[test]
    fn test_orientation_aligns_subsolar_points() {
        let orientation = MgitmOrientation {
            mgitm_subsolar: (25.19, 11.75),
            kp_subsolar: Some(subsolar_track(-12.0, 140.0)),
        };
        let t = Epoch::from_gregorian_utc_hms(2015, 3, 1, 0, 0, 30);

        let moved = orientation.value_at(&t) * sphere_position(25.19, 11.75, 0.0);
        let (lat, lng) = sphere_lat_lng(&moved);
        assert_relative_eq!(lat, -12.0, epsilon = 1e-9);
        assert_relative_eq!(lng, 140.0, epsilon = 1e-9);

        let axis = orientation.second_rotation_axis(&t).unwrap();
        assert_relative_eq!(axis.norm(), 2.0 * MARS_RADIUS_METERS, epsilon = 1e-6);
        assert_relative_eq!(axis.z, 0.0, epsilon = 1e-9);

        // outside the KP track
        let later = t + 1.0 * TimeUnit::Hour;
        assert_eq!(orientation.value_at(&later), UnitQuaternion::identity());
        assert_eq!(orientation.second_rotation_axis(&later), None);
    }
}
