//! # maven3d pipeline
//!
//! [`MavenPipeline`] builds every service once and wires them together:
//!
//! ```text
//! HttpFetcher ─► TabularDataSource ─┬─► KpDataProvider ─► KpDataPrettifier ─► KpDataTransformer
//!                                   │                                                │
//!                                   │                       (subsolar track, season) │
//!                                   │                                                ▼
//!                                   ├─► MgitmDataProvider ─────────────────► MgitmDataTransformer
//!                                   └─► AvailableDates, metadata queries
//! ```
//!
//! The user choices normally held by the views (time range, reference frame, selected
//! parameters, atmospheric layer) are kept in [`KpSelection`] and [`MgitmSelection`] and fed
//! to the chains through their requirements managers.
//!
//! # Example
//!
//! ```rust,no_run
//! use maven3d::{app::MavenPipeline, config::PipelineConfig};
//! use hifitime::Unit;
//!
//! # async fn run() -> Result<(), maven3d::maven_errors::MavenError> {
//! let pipeline = MavenPipeline::new(PipelineConfig::from_env())?;
//! let dates = pipeline.available_dates().load().await?;
//!
//! let mut selection = pipeline.kp_selection();
//! selection.set_timeframe(&dates.start, &(dates.start + 1.0 * Unit::Day));
//! pipeline.set_kp_selection(selection);
//!
//! let properties = pipeline.reload_kp().await?;
//! println!("{} orbit vertices", properties.orbit_position_array.len());
//! # Ok(())
//! # }
//! ```
use std::sync::Arc;

use hifitime::Epoch;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::{
    config::PipelineConfig,
    constants::{Kilometer, NONE_PARAM},
    env_state::MavenEnv,
    fragment,
    frames::{FrameTransformProvider, IauMarsFrames},
    kp::{KpDataProvider, KpDataTransformer, KpProperties, Timeframe},
    latis::{HttpFetcher, TabularDataSource, TabularFetcher},
    maven_errors::MavenError,
    metadata::{kp_metadata, mgitm_metadata, AvailableDates, ParameterRecord},
    mgitm::{MgitmDataProvider, MgitmDataTransformer, MgitmProperties, MgitmSolarLongitude},
    properties::ReferenceFrame,
    time::mean_epoch,
};

/// Choices driving the KP chain
#[derive(Debug, Clone, PartialEq)]
pub struct KpSelection {
    pub timeframe: Option<Timeframe>,
    pub reference_frame: ReferenceFrame,
    /// Column coloring the orbit
    pub param_1d: Option<String>,
    /// Display name of the whisker parameter
    pub param_3d: Option<String>,
}

impl Default for KpSelection {
    fn default() -> Self {
        KpSelection {
            timeframe: None,
            reference_frame: ReferenceFrame::Inertial,
            param_1d: None,
            param_3d: None,
        }
    }
}

impl KpSelection {
    pub fn set_timeframe(&mut self, start: &Epoch, end: &Epoch) {
        self.timeframe = Some(Timeframe::from_epochs(start, end));
    }

    fn fragment(&self) -> crate::constants::Fragment {
        let timeframe = self.timeframe.as_ref().map(Timeframe::to_value);
        let param_1d = self.param_1d.as_deref().unwrap_or(NONE_PARAM);
        let param_3d = self.param_3d.as_deref().unwrap_or(NONE_PARAM);
        fragment! {
            "timeframe" => timeframe,
            "isInertial" => (self.reference_frame == ReferenceFrame::Inertial),
            "selectedParam1d" => param_1d,
            "selectedParam3d" => param_3d
        }
    }
}

/// Choices driving the M-GITM chain
#[derive(Debug, Clone, PartialEq)]
pub struct MgitmSelection {
    pub parameter: Option<String>,
    /// Solar flux units
    pub solar_flux: u32,
    pub altitude: Kilometer,
    /// Follows the KP data unless overridden after each KP reload
    pub solar_longitude: MgitmSolarLongitude,
}

impl Default for MgitmSelection {
    fn default() -> Self {
        MgitmSelection {
            parameter: None,
            solar_flux: 130,
            altitude: 98.75,
            solar_longitude: MgitmSolarLongitude::Ls0,
        }
    }
}

impl MgitmSelection {
    fn fragment(&self) -> crate::constants::Fragment {
        fragment! {
            "parameter" => (self.parameter),
            "displayType" => "shell",
            "solarFlux" => (self.solar_flux),
            "solarLongitude" => (self.solar_longitude.degrees() as u32),
            "altitude" => (self.altitude)
        }
    }
}

/// Modelled season matching the middle of a KP batch.
pub fn season_of(properties: &KpProperties) -> Result<MgitmSolarLongitude, MavenError> {
    let (Some(start), Some(end)) = (properties.data_start, properties.data_end) else {
        return Err(MavenError::EmptyDataset("in_situ_kp".into()));
    };
    let mean_ls = properties
        .solar_longitude
        .value_at(&mean_epoch(&start, &end))
        .unwrap_or(f64::NAN);
    MgitmSolarLongitude::nearest(mean_ls)
}

pub struct MavenPipeline {
    config: PipelineConfig,
    source: Arc<TabularDataSource>,
    frames: Arc<dyn FrameTransformProvider>,
    kp: KpDataTransformer,
    mgitm: MgitmDataTransformer,
    available_dates: AvailableDates,
    kp_selection: Arc<RwLock<KpSelection>>,
    mgitm_selection: Arc<RwLock<MgitmSelection>>,
}

impl std::fmt::Debug for MavenPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MavenPipeline")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("kp", &self.kp)
            .field("mgitm", &self.mgitm)
            .field("kp_selection", &*self.kp_selection.read())
            .field("mgitm_selection", &*self.mgitm_selection.read())
            .finish()
    }
}

impl MavenPipeline {
    /// Pipeline talking to the configured LaTiS server, with analytical Mars frames.
    pub fn new(config: PipelineConfig) -> Result<Self, MavenError> {
        let env = MavenEnv::new(config.clone())?;
        Ok(Self::with_services(
            config,
            Arc::new(HttpFetcher::new(env)),
            Arc::new(IauMarsFrames::new()),
        ))
    }

    /// Pipeline over explicit fetcher and frame services.
    ///
    /// Arguments
    /// ---------
    /// * `config`: downsampling and polling settings
    /// * `fetcher`: where the tables come from
    /// * `frames`: fixed → inertial rotations
    pub fn with_services(
        config: PipelineConfig,
        fetcher: Arc<dyn TabularFetcher>,
        frames: Arc<dyn FrameTransformProvider>,
    ) -> Self {
        let source = Arc::new(TabularDataSource::new(fetcher));

        let kp_provider = Arc::new(KpDataProvider::new(
            source.clone(),
            frames.clone(),
            config.clone(),
        ));
        let kp = KpDataTransformer::new(kp_provider, frames.clone(), config.clone());
        let mgitm = MgitmDataTransformer::new(Arc::new(MgitmDataProvider::new(source.clone())));
        mgitm.follow_kp(kp.data_ready());

        let kp_selection = Arc::new(RwLock::new(KpSelection::default()));
        let mgitm_selection = Arc::new(RwLock::new(MgitmSelection::default()));

        let selection = kp_selection.clone();
        kp.requirements_manager()
            .add_requirements_provider(move || selection.read().fragment());
        let selection = mgitm_selection.clone();
        mgitm
            .requirements_manager()
            .add_requirements_provider(move || selection.read().fragment());

        // the atmospheric season follows the telemetry
        let selection = mgitm_selection.clone();
        kp.data_ready()
            .add_listener(move |properties| match season_of(properties) {
                Ok(season) => {
                    debug!(%season, "M-GITM season from KP data");
                    selection.write().solar_longitude = season;
                }
                Err(err) => error!(%err, "cannot derive the M-GITM season"),
            });

        MavenPipeline {
            available_dates: AvailableDates::new(source.clone()),
            config,
            source,
            frames,
            kp,
            mgitm,
            kp_selection,
            mgitm_selection,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &TabularDataSource {
        &self.source
    }

    pub fn frames(&self) -> &dyn FrameTransformProvider {
        self.frames.as_ref()
    }

    pub fn kp(&self) -> &KpDataTransformer {
        &self.kp
    }

    pub fn mgitm(&self) -> &MgitmDataTransformer {
        &self.mgitm
    }

    pub fn available_dates(&self) -> &AvailableDates {
        &self.available_dates
    }

    pub fn kp_selection(&self) -> KpSelection {
        self.kp_selection.read().clone()
    }

    /// Takes effect at the next [`reload_kp`](Self::reload_kp).
    pub fn set_kp_selection(&self, selection: KpSelection) {
        *self.kp_selection.write() = selection;
    }

    pub fn mgitm_selection(&self) -> MgitmSelection {
        self.mgitm_selection.read().clone()
    }

    /// Takes effect at the next [`reload_mgitm`](Self::reload_mgitm).
    pub fn set_mgitm_selection(&self, selection: MgitmSelection) {
        *self.mgitm_selection.write() = selection;
    }

    pub async fn reload_kp(&self) -> Result<Arc<KpProperties>, MavenError> {
        self.kp.request_reload().await
    }

    /// Reload the atmospheric layer. Nothing is requested until a parameter is selected.
    pub async fn reload_mgitm(&self) -> Result<Arc<MgitmProperties>, MavenError> {
        if self.mgitm_selection.read().parameter.is_none() {
            return Err(MavenError::MissingRequirement("parameter".into()));
        }
        self.mgitm.request_reload().await
    }

    pub async fn kp_metadata(&self) -> Result<Vec<ParameterRecord>, MavenError> {
        kp_metadata(&self.source).await
    }

    pub async fn mgitm_metadata(&self) -> Result<Map<String, Value>, MavenError> {
        mgitm_metadata(&self.source).await
    }
}
