//! # M-GITM provider
//!
//! Requirements read from the consumers (all `find_first`):
//!
//! * `parameter`: model quantity, one of [`MGITM_PARAMETERS`](crate::constants::MGITM_PARAMETERS)
//! * `displayType`: `"shell"` (a constant-altitude layer) or `"plane"` (not implemented)
//! * `solarFlux`, `solarLongitude`: the model run
//! * `altitude`: layer altitude in km, for shells
use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    constants::MGITM_DATASET,
    latis::{LatisQuery, TabularDataSource, TabularFormat, TabularResult},
    maven_errors::MavenError,
    pipeline::DataProvider,
    requirements::{RequirementSet, RequirementsManager},
};

pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayType {
    /// Layer of constant altitude wrapped around the planet
    Shell,
    /// Cut through the atmosphere (equatorial, prime meridian or terminator)
    Plane,
}

impl FromStr for DisplayType {
    type Err = MavenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" => Ok(DisplayType::Shell),
            "plane" => Ok(DisplayType::Plane),
            other => Err(MavenError::UnrecognizedDisplayType(other.to_string())),
        }
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayType::Shell => write!(f, "shell"),
            DisplayType::Plane => write!(f, "plane"),
        }
    }
}

/// Text of a requirement value inside a LaTiS filter: strings unquoted, numbers as is.
fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required_value<'a>(
    requirements: &'a RequirementSet,
    key: &str,
) -> Result<&'a Value, MavenError> {
    requirements
        .find_first(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| MavenError::MissingRequirement(key.to_string()))
}

/// LaTiS query of one M-GITM layer.
///
/// Return
/// ------
/// * [`MavenError::UnimplementedDisplayType`] for `"plane"`,
///   [`MavenError::UnrecognizedDisplayType`] for any other unknown display type
pub fn mgitm_query(requirements: &RequirementSet) -> Result<LatisQuery, MavenError> {
    let display_type: String = requirements.require("displayType")?;
    let display_type: DisplayType = display_type.parse()?;

    let mut filters = vec![
        format!(
            "solar_flux={}",
            filter_value(required_value(requirements, "solarFlux")?)
        ),
        format!(
            "solar_longitude={}",
            filter_value(required_value(requirements, "solarLongitude")?)
        ),
    ];

    let selection = match display_type {
        DisplayType::Shell => {
            let parameter: String = requirements.require("parameter")?;
            filters.push(format!(
                "altitude={}",
                filter_value(required_value(requirements, "altitude")?)
            ));
            vec![
                LATITUDE_COLUMN.to_string(),
                LONGITUDE_COLUMN.to_string(),
                parameter,
            ]
        }
        DisplayType::Plane => {
            return Err(MavenError::UnimplementedDisplayType(display_type.to_string()))
        }
    };

    Ok(LatisQuery::new(MGITM_DATASET, TabularFormat::Jsond)
        .with_selection(selection)
        .with_filters(filters))
}

pub struct MgitmDataProvider {
    source: Arc<TabularDataSource>,
    requirements_manager: RequirementsManager,
}

impl fmt::Debug for MgitmDataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MgitmDataProvider")
            .field("requirements_manager", &self.requirements_manager)
            .finish()
    }
}

impl MgitmDataProvider {
    pub fn new(source: Arc<TabularDataSource>) -> Self {
        MgitmDataProvider {
            source,
            requirements_manager: RequirementsManager::new(),
        }
    }
}

#[async_trait]
impl DataProvider for MgitmDataProvider {
    type Output = TabularResult;

    fn requirements_manager(&self) -> &RequirementsManager {
        &self.requirements_manager
    }

    async fn request_data(&self) -> Result<TabularResult, MavenError> {
        let query = mgitm_query(&self.requirements_manager.gather_requirements())?;
        debug!(query = %query.query_string(), "M-GITM request");
        let table = self.source.fetch(query).await?;
        Ok((*table).clone())
    }
}
