#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hifitime::{Epoch, Unit};
use maven3d::{
    constants::{
        KP_DATASET, KP_DATES_DATASET, KP_QUERY_PARAMETERS_DATASET, KP_TIME_COLUMN, MGITM_DATASET,
    },
    kp::params,
    latis::{LatisQuery, TabularFetcher, TabularResult},
    maven_errors::MavenError,
    time::parse_iso_utc,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

/// Number of telemetry samples served for any time range
pub const KP_SAMPLES: usize = 100;

/// Cadence of the served telemetry, in seconds
pub const KP_CADENCE_SECONDS: f64 = 4.0;

/// In-memory LaTiS server recording every query it answers.
#[derive(Default)]
pub struct MockFetcher {
    queries: Mutex<Vec<LatisQuery>>,
    /// Datasets whose answers wait for a release
    held: Mutex<HashMap<String, Arc<Notify>>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(MockFetcher::default())
    }

    pub fn queries(&self) -> Vec<LatisQuery> {
        self.queries.lock().clone()
    }

    pub fn calls_for(&self, dataset: &str) -> usize {
        self.queries
            .lock()
            .iter()
            .filter(|query| query.dataset == dataset)
            .count()
    }

    /// Keep every later answer for `dataset` pending until `notify_one` is called on the
    /// returned gate (once per held request).
    pub fn hold(&self, dataset: &str) -> Arc<Notify> {
        self.held
            .lock()
            .entry(dataset.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl TabularFetcher for MockFetcher {
    async fn fetch_table(&self, query: &LatisQuery) -> Result<TabularResult, MavenError> {
        self.queries.lock().push(query.clone());
        let gate = self.held.lock().get(&query.dataset).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        // let concurrent callers join before the answer
        tokio::task::yield_now().await;
        respond(query)
    }
}

fn respond(query: &LatisQuery) -> Result<TabularResult, MavenError> {
    match query.dataset.as_str() {
        KP_DATASET => kp_table(query),
        MGITM_DATASET => Ok(mgitm_table(query)),
        KP_DATES_DATASET => Ok(dates_table(query)),
        KP_QUERY_PARAMETERS_DATASET => TabularResult::new(
            vec!["kp_column_name".into(), "query_parameter".into(), "units".into()],
            vec![vec![
                json!("NGIMS Ar Density"),
                json!("ngims_ar_density"),
                json!("cm^-3"),
            ]],
            Map::new(),
        ),
        other => Err(MavenError::HttpStatus {
            status: 404,
            url: other.to_string(),
        }),
    }
}

fn start_of(query: &LatisQuery) -> Result<Epoch, MavenError> {
    let filter = query
        .filters
        .iter()
        .find_map(|filter| filter.strip_prefix("time>="))
        .ok_or_else(|| MavenError::MissingRequirement("time>=".into()))?;
    parse_iso_utc(filter)
}

/// Value of a KP column for the `i`-th sample.
fn kp_cell(name: &str, i: usize, timestamp: &Epoch) -> Value {
    let x = i as f64;
    match name {
        KP_TIME_COLUMN => json!(timestamp.to_unix_milliseconds()),
        params::LOCAL_TIME => json!(12.0),
        params::LATITUDE => json!(10.0),
        params::LONGITUDE => json!(x),
        params::ALTITUDE => json!(600.0),
        params::SUBSOLAR_LATITUDE => json!(-20.0),
        params::SUBSOLAR_LONGITUDE => json!(45.0),
        params::MARS_SUN_DISTANCE => json!(1.5),
        params::SOLAR_ZENITH_ANGLE => json!(70.0),
        params::SEASON_LS => json!(170.0 + 0.01 * x),
        "ngims_ar_density" => json!(x),
        name if name.starts_with(params::SPACECRAFT_ATTITUDE) => {
            json!(if name.ends_with("_z") { 1.0 } else { 0.0 })
        }
        name if name.ends_with("_x") => json!(1.0 + x),
        name if name.ends_with("_y") || name.ends_with("_z") => json!(0.0),
        // `root_r_c` matrix cell: identity
        name => {
            let bytes = name.as_bytes();
            match bytes {
                [.., b'_', r, b'_', c] if r.is_ascii_digit() && c.is_ascii_digit() => {
                    json!(if r == c { 1.0 } else { 0.0 })
                }
                _ => Value::Null,
            }
        }
    }
}

fn kp_table(query: &LatisQuery) -> Result<TabularResult, MavenError> {
    let start = start_of(query)?;
    let data = (0..KP_SAMPLES)
        .map(|i| {
            let timestamp = start + (i as f64 * KP_CADENCE_SECONDS) * Unit::Second;
            query
                .selection
                .iter()
                .map(|name| kp_cell(name, i, &timestamp))
                .collect()
        })
        .collect();
    TabularResult::new(query.selection.clone(), data, Map::new())
}

/// 3 latitudes × 4 longitudes of the requested parameter
fn mgitm_table(query: &LatisQuery) -> TabularResult {
    let mut metadata = Map::new();
    metadata.insert("co2".into(), json!({ "units": "m^-3" }));

    let mut data = Vec::new();
    for (i, lat) in [-5.0, 0.0, 5.0].into_iter().enumerate() {
        for (j, lng) in [2.5, 7.5, 12.5, 17.5].into_iter().enumerate() {
            data.push(vec![json!(lat), json!(lng), json!((i * 4 + j) as f64)]);
        }
    }
    let parameters = if query.selection.is_empty() {
        vec!["Latitude".into(), "Longitude".into(), "co2".into()]
    } else {
        query.selection.clone()
    };
    TabularResult {
        parameters,
        data,
        metadata,
    }
}

fn dates_table(query: &LatisQuery) -> TabularResult {
    let date = if query.filters.iter().any(|f| f == "last()") {
        "2016-05-31T23:59:56"
    } else {
        "2014-10-18T00:00:04"
    };
    TabularResult {
        parameters: vec![KP_TIME_COLUMN.into()],
        data: vec![vec![json!(date)]],
        metadata: Map::new(),
    }
}

pub fn kp_start() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2015, 3, 1)
}

pub fn kp_end() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2015, 3, 2)
}

/// Route the pipeline logs to the test output, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
