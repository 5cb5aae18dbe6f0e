mod common;

use std::{sync::Arc, time::Duration};

use common::{init_tracing, kp_end, kp_start, MockFetcher, KP_SAMPLES};
use hifitime::Epoch;
use maven3d::{
    app::{KpSelection, MavenPipeline},
    config::PipelineConfig,
    constants::{KP_DATASET, KP_QUERY_PARAMETERS_DATASET, MGITM_DATASET},
    frames::{FrameTransformProvider, IauMarsFrames},
    kp::params::base_selection,
    maven_errors::MavenError,
    mgitm::MgitmSolarLongitude,
    properties::ReferenceFrame,
    time::epoch_to_iso,
};
use nalgebra::Matrix3;

/// Frames that never become available
struct NeverReady;

impl FrameTransformProvider for NeverReady {
    fn preload(&self, _start: Epoch, _end: Epoch) {}

    fn fixed_to_inertial(&self, _epoch: &Epoch) -> Option<Matrix3<f64>> {
        None
    }
}

fn pipeline_with(
    fetcher: Arc<MockFetcher>,
    frames: Arc<dyn FrameTransformProvider>,
) -> MavenPipeline {
    MavenPipeline::with_services(PipelineConfig::default(), fetcher, frames)
}

fn colored_selection(reference_frame: ReferenceFrame) -> KpSelection {
    let mut selection = KpSelection {
        reference_frame,
        param_1d: Some("ngims_ar_density".into()),
        param_3d: Some("Magnetic Field".into()),
        ..KpSelection::default()
    };
    selection.set_timeframe(&kp_start(), &kp_end());
    selection
}

#[tokio::test]
async fn test_kp_reload_end_to_end() {
    init_tracing();
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));
    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Fixed));

    let properties = pipeline.reload_kp().await.unwrap();

    // base, color and whisker requests
    assert_eq!(fetcher.calls_for(KP_DATASET), 3);
    let queries = fetcher.queries();
    let base = queries
        .iter()
        .find(|query| query.selection.len() > 4)
        .unwrap();
    assert_eq!(base.selection, base_selection());
    assert_eq!(
        base.filters,
        vec!["time>=2015-03-01T00:00:00.000Z", "time<=2015-03-02T00:00:00.000Z"]
    );

    assert_eq!(properties.orbit_frame, ReferenceFrame::Fixed);
    assert_eq!(properties.orbit_position_array.len(), 5);
    assert_eq!(properties.solar_longitude.len(), KP_SAMPLES);
    assert_eq!(properties.spacecraft_orientation.len(), KP_SAMPLES);
    assert_eq!(
        properties.data_start.map(|start| epoch_to_iso(&start)),
        Some(epoch_to_iso(&kp_start()))
    );

    let scale = properties.orbit_color_scale.as_ref().unwrap();
    assert_eq!((scale.min, scale.max), (0.0, 99.0));

    let whiskers = properties.whiskers.as_ref().unwrap();
    assert_eq!(whiskers.polylines.len(), 10);
    assert_eq!((whiskers.scale.min, whiskers.scale.max), (1.0, 100.0));

    // the published value is the returned one
    let published = pipeline.kp().data_ready().current().unwrap();
    assert!(Arc::ptr_eq(&published, &properties));

    // the M-GITM season follows the telemetry (Ls ~170°)
    assert_eq!(
        pipeline.mgitm_selection().solar_longitude,
        MgitmSolarLongitude::Ls180
    );
}

#[tokio::test]
async fn test_identical_reloads_are_served_from_cache() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));
    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Inertial));

    let first = pipeline.reload_kp().await.unwrap();
    let second = pipeline.reload_kp().await.unwrap();
    assert_eq!(fetcher.calls_for(KP_DATASET), 3);
    assert_eq!(first.orbit_position_array, second.orbit_position_array);
    assert_eq!(second.orbit_frame, ReferenceFrame::Inertial);

    // switching the frame alone does not fetch again
    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Fixed));
    let fixed = pipeline.reload_kp().await.unwrap();
    assert_eq!(fetcher.calls_for(KP_DATASET), 3);
    assert_ne!(fixed.orbit_position_array[1], first.orbit_position_array[1]);
}

#[tokio::test]
async fn test_plain_selection_requests_base_only() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));
    let mut selection = KpSelection::default();
    selection.set_timeframe(&kp_start(), &kp_end());
    pipeline.set_kp_selection(selection);

    let properties = pipeline.reload_kp().await.unwrap();
    assert_eq!(fetcher.calls_for(KP_DATASET), 1);
    assert!(properties.orbit_color_scale.is_none());
    assert!(properties.whiskers.is_none());
}

#[tokio::test]
async fn test_missing_timeframe() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));

    assert_eq!(
        pipeline.reload_kp().await.unwrap_err(),
        MavenError::MissingRequirement("timeframe".into())
    );
    assert_eq!(fetcher.calls_for(KP_DATASET), 0);
}

#[tokio::test(start_paused = true)]
async fn test_frame_transform_timeout() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(NeverReady));
    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Inertial));

    let started = tokio::time::Instant::now();
    let err = pipeline.reload_kp().await.unwrap_err();
    assert!(matches!(err, MavenError::FrameTransformTimeout { .. }));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(pipeline.kp().data_ready().current().is_none());
}

#[tokio::test]
async fn test_mgitm_follows_kp_without_refetch() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));

    assert_eq!(
        pipeline.reload_mgitm().await.unwrap_err(),
        MavenError::MissingRequirement("parameter".into())
    );

    let mut mgitm_selection = pipeline.mgitm_selection();
    mgitm_selection.parameter = Some("co2".into());
    pipeline.set_mgitm_selection(mgitm_selection);

    let layer = pipeline.reload_mgitm().await.unwrap();
    assert_eq!(layer.latitudes, vec![5.0, 0.0, -5.0]);
    assert_eq!(layer.longitudes, vec![2.5, 7.5, 12.5, 17.5]);
    assert!(layer.orientation.kp_subsolar.is_none());
    assert_eq!(
        fetcher.queries().last().unwrap().filters,
        vec!["solar_flux=130", "solar_longitude=0", "altitude=98.75"]
    );

    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Fixed));
    let kp = pipeline.reload_kp().await.unwrap();

    // republished from the cached table, aligned on the new KP track
    let realigned = pipeline.mgitm().data_ready().current().unwrap();
    assert_eq!(fetcher.calls_for(MGITM_DATASET), 1);
    assert_eq!(realigned.pixel_grid, layer.pixel_grid);
    assert_eq!(
        realigned.orientation.kp_subsolar.as_deref(),
        Some(&kp.subsolar_track_position)
    );

    // the next reload uses the season of the KP data
    pipeline.reload_mgitm().await.unwrap();
    assert_eq!(fetcher.calls_for(MGITM_DATASET), 2);
    assert_eq!(
        fetcher.queries().last().unwrap().filters,
        vec!["solar_flux=130", "solar_longitude=180", "altitude=98.75"]
    );
}

#[tokio::test]
async fn test_metadata_and_available_dates() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));

    let dates = pipeline.available_dates().load().await.unwrap();
    assert_eq!(epoch_to_iso(&dates.start), "2014-10-18T00:00:04.000Z");
    assert_eq!(epoch_to_iso(&dates.end), "2016-05-31T23:59:56.000Z");
    assert!(pipeline.available_dates().current().is_some());

    let kp_metadata = pipeline.kp_metadata().await.unwrap();
    assert_eq!(kp_metadata[0]["units"], "cm^-3");
    let query = fetcher
        .queries()
        .into_iter()
        .find(|query| query.dataset == KP_QUERY_PARAMETERS_DATASET)
        .unwrap();
    assert_eq!(
        query.filters,
        vec!["kp_column_name!=Quality", "kp_column_name!=Precision"]
    );

    let mgitm_metadata = pipeline.mgitm_metadata().await.unwrap();
    assert_eq!(mgitm_metadata["co2"]["units"], "m^-3");
}

#[tokio::test]
async fn test_mgitm_realignment_keeps_the_layer_requirements() {
    let fetcher = MockFetcher::new();
    let pipeline = pipeline_with(fetcher.clone(), Arc::new(IauMarsFrames::new()));

    let mut mgitm_selection = pipeline.mgitm_selection();
    mgitm_selection.parameter = Some("co2".into());
    pipeline.set_mgitm_selection(mgitm_selection.clone());
    let co2 = pipeline.reload_mgitm().await.unwrap();
    assert_eq!((co2.min, co2.max), (0.0, 11.0));

    // a reload of another quantity is still waiting for its table
    let gate = fetcher.hold(MGITM_DATASET);
    mgitm_selection.parameter = Some("o2plus".into());
    pipeline.set_mgitm_selection(mgitm_selection);
    let mut pending = Box::pin(pipeline.reload_mgitm());
    assert!(futures::poll!(&mut pending).is_pending());
    assert_eq!(fetcher.calls_for(MGITM_DATASET), 2);

    // the KP publication realigns the co2 layer with its own requirements
    pipeline.set_kp_selection(colored_selection(ReferenceFrame::Fixed));
    pipeline.reload_kp().await.unwrap();
    let realigned = pipeline.mgitm().data_ready().current().unwrap();
    assert_eq!((realigned.min, realigned.max), (0.0, 11.0));
    assert_eq!(realigned.pixel_grid, co2.pixel_grid);
    assert_eq!(realigned.altitude_meters, co2.altitude_meters);
    assert!(realigned.orientation.kp_subsolar.is_some());

    gate.notify_one();
    let o2plus = pending.await.unwrap();
    assert_eq!((o2plus.min, o2plus.max), (0.0, 11.0));
    assert!(Arc::ptr_eq(
        &pipeline.mgitm().data_ready().current().unwrap(),
        &o2plus
    ));
}
