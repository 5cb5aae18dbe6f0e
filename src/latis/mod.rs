//! # LaTiS tabular data access
//!
//! The LaTiS server exposes every MAVEN dataset through the same HTTP interface:
//! `{root}{dataset}.{format}?{selection}&{filters...}`. This module provides
//!
//! * [`LatisQuery`] / [`TabularFormat`]: the request description and its URL,
//! * [`TabularResult`]: the decoded row/column table,
//! * [`TabularFetcher`] / [`HttpFetcher`]: the network boundary,
//! * [`TabularDataSource`] / [`DataRequest`]: request deduplication and cancellation.

pub mod cache;
pub mod query;
pub mod source;
pub mod table;

pub use cache::{DataRequest, TableOutcome, TabularDataSource};
pub use query::{LatisQuery, TabularFormat};
pub use source::{decode_response, HttpFetcher, TabularFetcher};
pub use table::{cell_f64, row_f64, TabularResult};
