//! # M-GITM atmospheric model chain
//!
//! ```text
//! MgitmDataProvider → MgitmDataTransformer → DataReady<MgitmProperties>
//!                              ↑
//!            KP subsolar track (DataReady<KpProperties>)
//! ```
pub mod provider;
pub mod season;
pub mod transformer;

pub use provider::{mgitm_query, DisplayType, MgitmDataProvider};
pub use season::{mgitm_subsolar_point, MgitmSolarLongitude};
pub use transformer::{
    build_mgitm_properties, MgitmDataTransformer, MgitmLayer, MgitmOrientation, MgitmProperties,
    MgitmRequirements,
};
