//! # KP telemetry chain
//!
//! In-situ key parameters of the MAVEN spacecraft, from the LaTiS request to the rendered
//! properties:
//!
//! ```text
//! KpDataProvider → KpDataPrettifier → KpDataTransformer → DataReady<KpProperties>
//! ```
pub mod params;
pub mod prettifier;
pub mod provider;
pub mod transformer;

pub use prettifier::{KpDataPrettifier, KpSample, SelectedParams};
pub use provider::{KpDataProvider, Timeframe};
pub use transformer::{
    transform_samples, ColorScale, KpDataTransformer, KpProperties, TransformOptions,
    WhiskerPolyline, WhiskerSet,
};
