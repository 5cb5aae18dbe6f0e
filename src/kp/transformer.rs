//! # KP telemetry transformer
//!
//! Converts the prettified [`KpSample`]s into the time-indexed properties rendered by the
//! globe: orbit, ground and subsolar tracks, sun position, solar angles, spacecraft
//! orientation, plus the optional orbit color scale and whisker glyphs.
//!
//! ## Downsampling
//!
//! The continuous curves (sun, subsolar track, angles, orientation) receive every sample.
//! Discrete geometry is thinned out:
//!
//! * **orbit path**: sample `i` is kept when `i % N == 0`, when it is the last sample (so the
//!   curve spans the whole requested range), or, when the orbit is colored, when it lies below
//!   the threshold height,
//! * **ground track**: `i % N == 0` or last, never the height rule,
//! * **whiskers**: one in `M`, counted over the whiskers that have a valid non-zero vector
//!   only.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use hifitime::Epoch;
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    colors::{find_min_max, interpolate, Color, ColorMap, DEFAULT_COLORMAP, MISSING_VALUE_COLOR},
    config::PipelineConfig,
    constants::{
        model_axis_correction, Meter, GROUND_TRACK_HEIGHT_METERS, SUBSOLAR_TRACK_HEIGHT_METERS,
    },
    fragment,
    frames::{sphere_position, FrameTransformProvider},
    kp::{
        params::base_selection,
        prettifier::{KpDataPrettifier, KpSample},
        provider::KpDataProvider,
    },
    latis::TabularResult,
    maven_errors::MavenError,
    pipeline::{DataProvider, DataReady, DataTransformer, TransformerCore},
    properties::{ReferenceFrame, SampledProperty},
    requirements::RequirementsManager,
};

/// Colormap and bounds used to color a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    pub colormap: ColorMap,
    pub min: f64,
    pub max: f64,
}

impl ColorScale {
    pub fn color_of(&self, value: f64) -> Color {
        interpolate(value, self.min, self.max, &self.colormap)
    }
}

/// Line segment drawn from the orbit position along the (scaled) whisker vector
#[derive(Debug, Clone, PartialEq)]
pub struct WhiskerPolyline {
    pub positions: [Vector3<f64>; 2],
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhiskerSet {
    pub polylines: Vec<WhiskerPolyline>,
    /// Bounds of the whisker magnitudes of the batch
    pub scale: ColorScale,
}

/// Everything the globe needs to draw one KP batch.
#[derive(Debug, Clone, PartialEq)]
pub struct KpProperties {
    pub orbit_frame: ReferenceFrame,
    pub orbit_position: SampledProperty<Vector3<f64>>,
    pub orbit_position_array: Vec<Vector3<f64>>,
    pub orbit_colors: Vec<Color>,
    pub ground_track_position: SampledProperty<Vector3<f64>>,
    pub subsolar_track_position: SampledProperty<Vector3<f64>>,
    pub solar_track_position: SampledProperty<Vector3<f64>>,
    pub solar_zenith_angle: SampledProperty<f64>,
    pub solar_longitude: SampledProperty<f64>,
    pub spacecraft_orientation: SampledProperty<UnitQuaternion<f64>>,
    pub orbit_color_scale: Option<ColorScale>,
    pub whiskers: Option<WhiskerSet>,
    /// Actual time range of the received data
    pub data_start: Option<Epoch>,
    pub data_end: Option<Epoch>,
}

/// Knobs of one transform pass
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    pub is_inertial: bool,
    pub orbit_path_filter_amount: usize,
    pub orbit_whiskers_filter_amount: usize,
    pub threshold_height_meters: Meter,
    pub whisker_max_length: Meter,
    pub whisker_alpha: f32,
}

impl TransformOptions {
    pub fn from_config(config: &PipelineConfig, is_inertial: bool) -> Self {
        TransformOptions {
            is_inertial,
            orbit_path_filter_amount: config.orbit_path_filter_amount.max(1),
            orbit_whiskers_filter_amount: config.orbit_whiskers_filter_amount.max(1),
            threshold_height_meters: config.threshold_height_meters,
            whisker_max_length: config.whisker_max_length,
            whisker_alpha: config.whisker_alpha,
        }
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions::from_config(&PipelineConfig::default(), false)
    }
}

/// Path-vertex rule: one in `filter_amount`, plus the last sample.
pub fn keep_in_path(index: usize, len: usize, filter_amount: usize) -> bool {
    index % filter_amount.max(1) == 0 || index + 1 == len
}

/// Scale a whisker so its length sits between 0 and `max_length` according to where its
/// magnitude falls in `[min, max]`.
///
/// A zero vector is returned as is. When every whisker of the batch has the same magnitude
/// (`max == min`) the whisker gets the full length.
pub fn scale_whisker(
    vector: &Vector3<f64>,
    magnitude: f64,
    min: f64,
    max: f64,
    max_length: Meter,
) -> Vector3<f64> {
    if magnitude == 0.0 {
        return *vector;
    }
    let fraction = if max > min {
        (magnitude - min) / (max - min)
    } else {
        1.0
    };
    vector * (fraction * max_length / magnitude)
}

fn orientation(spacecraft_to_body: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let rotation = Rotation3::from_matrix_unchecked(*spacecraft_to_body);
    UnitQuaternion::from_rotation_matrix(&rotation) * model_axis_correction()
}

/// Build the [`KpProperties`] of a batch.
///
/// Arguments
/// ---------
/// * `samples`: prettified samples in ascending time order
/// * `options`: frame and downsampling settings
/// * `frames`: fixed → inertial rotations, used when `options.is_inertial`
pub fn transform_samples(
    samples: &[KpSample],
    options: &TransformOptions,
    frames: &dyn FrameTransformProvider,
) -> KpProperties {
    let len = samples.len();

    // presence of the optional channels is uniform over the batch
    let do_color = samples.first().is_some_and(|s| s.color_param.is_some());
    let do_whiskers = samples.first().is_some_and(|s| s.whisker_body.is_some());

    let orbit_color_scale = do_color.then(|| {
        let (min, max) = find_min_max(samples.iter().map(|s| s.color_param.flatten()));
        ColorScale {
            colormap: DEFAULT_COLORMAP,
            min,
            max,
        }
    });
    let whisker_scale = do_whiskers.then(|| {
        let (min, max) = find_min_max(
            samples
                .iter()
                .map(|s| s.whisker_body.flatten().map(|v| v.norm())),
        );
        ColorScale {
            colormap: DEFAULT_COLORMAP,
            min,
            max,
        }
    });

    let orbit_frame = if options.is_inertial {
        ReferenceFrame::Inertial
    } else {
        ReferenceFrame::Fixed
    };
    let mut orbit_position = SampledProperty::new();
    let mut orbit_position_array = Vec::new();
    let mut orbit_colors = Vec::new();
    let mut ground_track_position = SampledProperty::new();
    let mut subsolar_track_position = SampledProperty::new();
    let mut solar_track_position = SampledProperty::new();
    let mut solar_zenith_angle = SampledProperty::new();
    let mut solar_longitude = SampledProperty::new();
    let mut spacecraft_orientation = SampledProperty::new();
    let mut polylines = Vec::new();

    let mut orbit_path_vertex_count = 0_usize;
    let mut lt_threshold_count = 0_usize;
    let mut gt_threshold_count = 0_usize;
    let mut inertial_fallback_count = 0_usize;

    // counts the valid whiskers, including those skipped by the filter
    let mut whisker_index = 0_usize;

    for (index, sample) in samples.iter().enumerate() {
        let epoch = sample.timestamp;
        let apply_orbit_filter = keep_in_path(index, len, options.orbit_path_filter_amount);
        let apply_whisker_filter = whisker_index % options.orbit_whiskers_filter_amount == 0;

        let below_threshold = do_color && sample.height < options.threshold_height_meters;
        if below_threshold {
            lt_threshold_count += 1;
        } else {
            gt_threshold_count += 1;
        }

        let mut orbit_pos = sphere_position(sample.latitude, sample.longitude, sample.height);
        let mut whisker = sample.whisker_body.flatten();

        if options.is_inertial {
            match frames.fixed_to_inertial(&epoch) {
                Some(to_inertial) => {
                    orbit_pos = to_inertial * orbit_pos;
                    whisker = whisker.map(|v| to_inertial * v);
                }
                None => inertial_fallback_count += 1,
            }
        }

        solar_zenith_angle.add_sample(epoch, sample.solar_zenith_angle);
        solar_longitude.add_sample(epoch, sample.solar_longitude);
        subsolar_track_position.add_sample(
            epoch,
            sphere_position(
                sample.subsolar_latitude,
                sample.subsolar_longitude,
                SUBSOLAR_TRACK_HEIGHT_METERS,
            ),
        );
        solar_track_position.add_sample(
            epoch,
            sphere_position(
                sample.subsolar_latitude,
                sample.subsolar_longitude,
                sample.mars_sun_distance,
            ),
        );
        if let Some(spacecraft_to_body) = &sample.spacecraft_to_body {
            spacecraft_orientation.add_sample(epoch, orientation(spacecraft_to_body));
        }

        if apply_orbit_filter || below_threshold {
            orbit_path_vertex_count += 1;
            orbit_position.add_sample(epoch, orbit_pos);
            orbit_position_array.push(orbit_pos);
            orbit_colors.push(match &orbit_color_scale {
                Some(scale) => scale.color_of(sample.color_param.flatten().unwrap_or(f64::NAN)),
                None => MISSING_VALUE_COLOR,
            });
        }

        if apply_orbit_filter {
            ground_track_position.add_sample(
                epoch,
                sphere_position(
                    sample.latitude,
                    sample.longitude,
                    GROUND_TRACK_HEIGHT_METERS,
                ),
            );
        }

        let (Some(scale), Some(vector)) = (&whisker_scale, whisker) else {
            continue;
        };
        let magnitude = vector.norm();
        if magnitude <= 0.0 {
            continue;
        }
        whisker_index += 1;
        if apply_whisker_filter {
            let end_point = orbit_pos
                + scale_whisker(
                    &vector,
                    magnitude,
                    scale.min,
                    scale.max,
                    options.whisker_max_length,
                );
            polylines.push(WhiskerPolyline {
                positions: [orbit_pos, end_point],
                color: scale.color_of(magnitude).with_alpha(options.whisker_alpha),
            });
        }
    }

    if inertial_fallback_count > 0 {
        error!(
            samples = inertial_fallback_count,
            "failed to compute the inertial frame matrix, using identity"
        );
    }
    debug!(
        orbit_path_vertex_count,
        threshold_km = options.threshold_height_meters / 1000.0,
        lt_threshold_count,
        gt_threshold_count,
        orbit_whisker_count = polylines.len(),
        "KP transform"
    );

    KpProperties {
        orbit_frame,
        orbit_position,
        orbit_position_array,
        orbit_colors,
        ground_track_position,
        subsolar_track_position,
        solar_track_position,
        solar_zenith_angle,
        solar_longitude,
        spacecraft_orientation,
        orbit_color_scale,
        whiskers: whisker_scale.map(|scale| WhiskerSet { polylines, scale }),
        data_start: samples.first().map(|s| s.timestamp),
        data_end: samples.last().map(|s| s.timestamp),
    }
}

/// Last stage of the KP chain: provider → prettifier → this transformer.
pub struct KpDataTransformer {
    provider: Arc<KpDataProvider>,
    prettifier: KpDataPrettifier,
    frames: Arc<dyn FrameTransformProvider>,
    config: PipelineConfig,
    core: Arc<TransformerCore<TabularResult, KpProperties>>,
    is_inertial: Arc<AtomicBool>,
}

impl std::fmt::Debug for KpDataTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpDataTransformer")
            .field("prettifier", &self.prettifier)
            .field("core", &self.core)
            .field("is_inertial", &self.is_inertial.load(Ordering::Relaxed))
            .finish()
    }
}

impl KpDataTransformer {
    /// Build the prettifier and the transformer on top of `provider` and wire their
    /// requirements.
    ///
    /// Consumers register on [`requirements_manager`](Self::requirements_manager) with:
    /// `timeframe`, `isInertial`, `selectedParam1d` (color column) and `selectedParam3d`
    /// (whisker display name).
    pub fn new(
        provider: Arc<KpDataProvider>,
        frames: Arc<dyn FrameTransformProvider>,
        config: PipelineConfig,
    ) -> Self {
        let prettifier = KpDataPrettifier::attach(provider.requirements_manager());
        let core = Arc::new(TransformerCore::new());
        let is_inertial = Arc::new(AtomicBool::new(false));

        let downstream = core.clone();
        let inertial = is_inertial.clone();
        prettifier
            .requirements_manager()
            .add_requirements_provider(move || {
                let requirements = downstream.requirements_manager().gather_requirements();
                inertial.store(
                    requirements
                        .find_first("isInertial")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    Ordering::Relaxed,
                );

                let timeframe = requirements.find_first("timeframe").cloned();
                let param_1d = requirements.find_first("selectedParam1d").cloned();
                let param_3d = requirements.find_first("selectedParam3d").cloned();
                fragment! {
                    "selection" => (base_selection()),
                    "timeframe" => timeframe,
                    "selectedParam1d" => param_1d,
                    "selectedParam3d" => param_3d
                }
            });

        KpDataTransformer {
            provider,
            prettifier,
            frames,
            config,
            core,
            is_inertial,
        }
    }

    pub fn requirements_manager(&self) -> &RequirementsManager {
        self.core.requirements_manager()
    }

    pub fn data_ready(&self) -> &DataReady<KpProperties> {
        self.core.data_ready()
    }

    pub fn prettifier(&self) -> &KpDataPrettifier {
        &self.prettifier
    }

    pub fn is_inertial(&self) -> bool {
        self.is_inertial.load(Ordering::Relaxed)
    }

    /// Fetch, transform and publish a new batch, cancelling any reload still in progress.
    pub async fn request_reload(&self) -> Result<Arc<KpProperties>, MavenError> {
        self.core
            .reload(
                async { self.provider.request_data().await.map(Arc::new) },
                |table| self.transform(table),
            )
            .await
    }
}

impl DataTransformer for KpDataTransformer {
    type Input = TabularResult;
    type Output = KpProperties;

    fn transform(&self, table: &TabularResult) -> Result<KpProperties, MavenError> {
        let samples = self.prettifier.reshape(table);
        let options = TransformOptions::from_config(&self.config, self.is_inertial());
        Ok(transform_samples(&samples, &options, self.frames.as_ref()))
    }
}
