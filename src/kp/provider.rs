//! # KP telemetry provider
//!
//! Builds the LaTiS requests of the KP telemetry from the requirements registered by the
//! prettifier:
//!
//! | key               | merge         | meaning                                      |
//! |-------------------|---------------|----------------------------------------------|
//! | `selection`       | `concat_all`  | columns of the base request                  |
//! | `timeframe`       | `find_first`  | `{ "start": ISO, "end": ISO }`               |
//! | `selectedParam1d` | `find_first`  | color column, or `"none"`                    |
//! | `selectedParam3d` | `find_first`  | whisker column triple, or `"none"`           |
//!
//! The base request, the optional color and whisker requests and the frame-transform
//! readiness wait all run concurrently. The optional tables are then appended column-wise to
//! the base table, row by row, on matching timestamps.
use std::sync::Arc;

use async_trait::async_trait;
use hifitime::Epoch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    config::PipelineConfig,
    constants::{KP_DATASET, KP_TIME_COLUMN, NONE_PARAM},
    frames::FrameTransformProvider,
    latis::{DataRequest, LatisQuery, TabularDataSource, TabularFormat, TabularResult},
    maven_errors::MavenError,
    pipeline::DataProvider,
    readiness::wait_until_ready,
    requirements::{RequirementSet, RequirementsManager},
    time::{epoch_to_iso, parse_iso_utc},
};

/// Requested time range, as exchanged in requirement fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: String,
    pub end: String,
}

impl Timeframe {
    pub fn from_epochs(start: &Epoch, end: &Epoch) -> Self {
        Timeframe {
            start: epoch_to_iso(start),
            end: epoch_to_iso(end),
        }
    }

    pub fn epochs(&self) -> Result<(Epoch, Epoch), MavenError> {
        Ok((parse_iso_utc(&self.start)?, parse_iso_utc(&self.end)?))
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "start": self.start, "end": self.end })
    }
}

/// `time>=start`, `time<=end` LaTiS filters
pub fn time_filters(start: &Epoch, end: &Epoch) -> Vec<String> {
    vec![
        format!("time>={}", epoch_to_iso(start)),
        format!("time<={}", epoch_to_iso(end)),
    ]
}

/// Color column requested through `selectedParam1d`, `None` for the `"none"` sentinel.
fn selected_param_1d(requirements: &RequirementSet) -> Result<Option<String>, MavenError> {
    Ok(requirements
        .find_first_as::<String>("selectedParam1d")?
        .filter(|param| param != NONE_PARAM))
}

/// Whisker triple requested through `selectedParam3d`, `None` for the `"none"` sentinel.
fn selected_param_3d(requirements: &RequirementSet) -> Result<Option<Vec<String>>, MavenError> {
    match requirements.find_first("selectedParam3d") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s == NONE_PARAM => Ok(None),
        Some(_) => {
            let columns: Vec<String> = requirements.require("selectedParam3d")?;
            if columns.len() != 3 {
                return Err(MavenError::InvalidRequirement {
                    key: "selectedParam3d".into(),
                    reason: format!("expected 3 columns, found {}", columns.len()),
                });
            }
            Ok(Some(columns))
        }
    }
}

/// Append the `width` value columns of `aux` to `base`, aligning rows on their first column.
///
/// Both tables are walked in order. When the next unconsumed `aux` row has the same key as the
/// current `base` row, its values are appended and the cursor advances; otherwise `width`
/// nulls are appended. `aux` rows whose key never appears in `base` are dropped.
///
/// Arguments
/// ---------
/// * `base`: the table receiving the columns
/// * `aux`: a `[key, value_1, ..., value_width]` table
/// * `width`: number of value columns to take from `aux`
///
/// Return
/// ------
/// * the number of `aux` rows merged
pub fn merge_aligned(
    base: &mut TabularResult,
    aux: &TabularResult,
    width: usize,
) -> Result<usize, MavenError> {
    let names = aux.parameters.get(1..=width).ok_or_else(|| {
        MavenError::MalformedTable(format!(
            "auxiliary table has {} columns, expected {}",
            aux.parameters.len(),
            width + 1
        ))
    })?;
    for name in names {
        if let Some(metadata) = aux.metadata.get(name) {
            base.metadata.insert(name.clone(), metadata.clone());
        }
        base.parameters.push(name.clone());
    }

    let mut cursor = 0;
    for row in base.data.iter_mut() {
        match aux.data.get(cursor) {
            Some(aux_row) if aux_row.first() == row.first() => {
                row.extend(aux_row[1..=width].iter().cloned());
                cursor += 1;
            }
            _ => row.extend(std::iter::repeat(Value::Null).take(width)),
        }
    }

    debug!(
        merged = cursor,
        dropped = aux.len() - cursor,
        columns = ?names,
        "auxiliary table merged"
    );
    Ok(cursor)
}

async fn await_optional(
    request: Option<DataRequest>,
) -> Result<Option<Arc<TabularResult>>, MavenError> {
    match request {
        Some(request) => request.await.map(Some),
        None => Ok(None),
    }
}

pub struct KpDataProvider {
    source: Arc<TabularDataSource>,
    frames: Arc<dyn FrameTransformProvider>,
    config: PipelineConfig,
    requirements_manager: RequirementsManager,
}

impl std::fmt::Debug for KpDataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpDataProvider")
            .field("source", &self.source)
            .field("requirements_manager", &self.requirements_manager)
            .finish()
    }
}

impl KpDataProvider {
    pub fn new(
        source: Arc<TabularDataSource>,
        frames: Arc<dyn FrameTransformProvider>,
        config: PipelineConfig,
    ) -> Self {
        KpDataProvider {
            source,
            frames,
            config,
            requirements_manager: RequirementsManager::new(),
        }
    }

    fn kp_query(selection: Vec<String>, filters: Vec<String>) -> LatisQuery {
        LatisQuery::new(KP_DATASET, TabularFormat::Jsond)
            .with_selection(selection)
            .with_filters(filters)
    }
}

#[async_trait]
impl DataProvider for KpDataProvider {
    type Output = TabularResult;

    fn requirements_manager(&self) -> &RequirementsManager {
        &self.requirements_manager
    }

    async fn request_data(&self) -> Result<TabularResult, MavenError> {
        let requirements = self.requirements_manager.gather_requirements();

        let selection = requirements.concat_all_strings("selection")?;
        let timeframe: Timeframe = requirements.require("timeframe")?;
        let (start, end) = timeframe.epochs()?;
        let param_1d = selected_param_1d(&requirements)?;
        let param_3d = selected_param_3d(&requirements)?;
        let filters = time_filters(&start, &end);

        let base_request = self
            .source
            .fetch(Self::kp_query(selection, filters.clone()));
        let color_request = param_1d.map(|param| {
            self.source.fetch(Self::kp_query(
                vec![KP_TIME_COLUMN.to_string(), param],
                filters.clone(),
            ))
        });
        let whisker_request = param_3d.map(|columns| {
            let selection = std::iter::once(KP_TIME_COLUMN.to_string())
                .chain(columns)
                .collect::<Vec<_>>();
            self.source
                .fetch(Self::kp_query(selection, filters.clone()))
        });

        self.frames.preload(start, end);
        let frames = self.frames.clone();
        let frames_ready = wait_until_ready(
            move || frames.fixed_to_inertial(&start).is_some(),
            self.config.frame_poll_timeout,
            self.config.frame_poll_interval,
        );

        let (base, color, whiskers, ()) = tokio::try_join!(
            base_request,
            await_optional(color_request),
            await_optional(whisker_request),
            frames_ready,
        )?;

        // the cached table is shared: merge into a copy
        let mut table = (*base).clone();
        if let Some(color) = color {
            merge_aligned(&mut table, &color, 1)?;
        }
        if let Some(whiskers) = whiskers {
            merge_aligned(&mut table, &whiskers, 3)?;
        }
        debug!(rows = table.len(), columns = table.parameters.len(), "KP data ready");
        Ok(table)
    }
}
