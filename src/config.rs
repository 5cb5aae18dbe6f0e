//! # Pipeline configuration
//!
//! [`PipelineConfig`] gathers every tunable of the data pipeline: where the LaTiS server lives,
//! how the HTTP client behaves, the downsampling policy of the orbit path and the bounds of the
//! frame-transform readiness poll.
//!
//! The defaults reproduce the values the MAVEN visualization has always used. The struct is
//! `Deserialize` with `#[serde(default)]`, so a partial document only overrides what it names.
//!
//! ```rust
//! use maven3d::config::PipelineConfig;
//!
//! let config: PipelineConfig =
//!     serde_json::from_str(r#"{ "orbit_path_filter_amount": 10 }"#).unwrap();
//! assert_eq!(config.orbit_path_filter_amount, 10);
//! assert_eq!(config.orbit_whiskers_filter_amount, 10);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::constants::Meter;

/// Public LaTiS server used when nothing else is configured
pub const DEFAULT_DATA_ROOT: &str = "https://lasp.colorado.edu/maven/sdc/public/latis/dap/";

/// Environment variable overriding [`PipelineConfig::data_root`]
pub const DATA_ROOT_ENV: &str = "MAVEN3D_DATA_ROOT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root URL of the LaTiS server, ending with `/`
    pub data_root: String,

    /// Global timeout of one HTTP request
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,

    /// Only one-in-N telemetry samples become orbit path vertices
    pub orbit_path_filter_amount: usize,

    /// Only one-in-M valid whiskers are drawn
    pub orbit_whiskers_filter_amount: usize,

    /// Samples below this height are always kept when the orbit is colored.
    ///
    /// 500 km is the altitude at which the KP sampling cadence changes
    /// from 4 s (below) to 8 s (above).
    pub threshold_height_meters: Meter,

    /// Length of the longest whisker; every other whisker is scaled between 0 and this value
    pub whisker_max_length: Meter,

    /// Alpha applied to whisker colors
    pub whisker_alpha: f32,

    /// Give up waiting for frame-transform data after this long
    #[serde(with = "duration_secs")]
    pub frame_poll_timeout: Duration,

    /// Delay between two readiness checks of the frame-transform data
    #[serde(with = "duration_secs")]
    pub frame_poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_root: DEFAULT_DATA_ROOT.to_string(),
            http_timeout: Duration::from_secs(10),
            orbit_path_filter_amount: 30,
            orbit_whiskers_filter_amount: 10,
            threshold_height_meters: 500_000.0,
            whisker_max_length: 10_000_000.0,
            whisker_alpha: 0.25,
            frame_poll_timeout: Duration::from_secs(10),
            frame_poll_interval: Duration::from_millis(50),
        }
    }
}

impl PipelineConfig {
    /// Default configuration, with the data root taken from `MAVEN3D_DATA_ROOT` when set.
    pub fn from_env() -> Self {
        let mut config = PipelineConfig::default();
        if let Ok(root) = std::env::var(DATA_ROOT_ENV) {
            if !root.trim().is_empty() {
                config.data_root = root;
            }
        }
        config
    }
}

/// (De)serialize a [`Duration`] as a floating number of seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
