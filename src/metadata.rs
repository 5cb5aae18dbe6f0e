//! # Dataset metadata and available dates
//!
//! Small one-shot queries used to populate the parameter pickers and the date range of the
//! time controls. They go through the same deduplicating [`TabularDataSource`] as the data
//! chains.
use std::sync::Arc;

use hifitime::Epoch;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    constants::{KP_DATES_DATASET, KP_QUERY_PARAMETERS_DATASET, KP_TIME_COLUMN, MGITM_DATASET},
    latis::{LatisQuery, TabularDataSource, TabularFormat, TabularResult},
    maven_errors::MavenError,
    pipeline::DataReady,
    time::epoch_from_cell,
};

/// Description of one KP column, keyed by the metadata table's own column names.
pub type ParameterRecord = Map<String, Value>;

/// Description of every KP column, quality and precision columns excluded.
pub async fn kp_metadata(source: &TabularDataSource) -> Result<Vec<ParameterRecord>, MavenError> {
    let query = LatisQuery::new(KP_QUERY_PARAMETERS_DATASET, TabularFormat::Jsond)
        .with_filters(["kp_column_name!=Quality", "kp_column_name!=Precision"]);
    let table = source.fetch(query).await?;
    Ok(records(&table))
}

/// Zip every row with the column names.
pub fn records(table: &TabularResult) -> Vec<ParameterRecord> {
    table
        .data
        .iter()
        .map(|row| {
            table
                .parameters
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
        .collect()
}

/// Metadata of the M-GITM dataset (units and descriptions of its quantities).
pub async fn mgitm_metadata(source: &TabularDataSource) -> Result<Map<String, Value>, MavenError> {
    let query = LatisQuery::new(MGITM_DATASET, TabularFormat::Jsond).with_filters(["first()"]);
    let table = source.fetch(query).await?;
    Ok(table.metadata.clone())
}

/// First and last KP timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: Epoch,
    pub end: Epoch,
}

/// Time range covered by the KP dataset, published once known.
#[derive(Debug)]
pub struct AvailableDates {
    source: Arc<TabularDataSource>,
    ready: DataReady<DateRange>,
}

fn single_timestamp(table: &TabularResult) -> Result<Epoch, MavenError> {
    let cell = table
        .data
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| MavenError::EmptyDataset(KP_DATES_DATASET.to_string()))?;
    epoch_from_cell(cell)
}

impl AvailableDates {
    pub fn new(source: Arc<TabularDataSource>) -> Self {
        AvailableDates {
            source,
            ready: DataReady::new(),
        }
    }

    fn bound_query(bound: &str) -> LatisQuery {
        LatisQuery::new(KP_DATES_DATASET, TabularFormat::Txt)
            .with_selection([KP_TIME_COLUMN])
            .with_filters([bound])
    }

    /// Query the first and last timestamps concurrently and publish the range.
    pub async fn load(&self) -> Result<Arc<DateRange>, MavenError> {
        let (first, last) = futures::try_join!(
            self.source.fetch(Self::bound_query("first()")),
            self.source.fetch(Self::bound_query("last()")),
        )?;
        let range = DateRange {
            start: single_timestamp(&first)?,
            end: single_timestamp(&last)?,
        };
        debug!(start = %range.start, end = %range.end, "KP dates available");
        Ok(self.ready.publish(range))
    }

    /// Last loaded range, if any
    pub fn current(&self) -> Option<Arc<DateRange>> {
        self.ready.current()
    }

    pub fn data_ready(&self) -> &DataReady<DateRange> {
        &self.ready
    }
}
