use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the maven3d data pipeline.
///
/// The enum is `Clone` so that the outcome of one deduplicated fetch can be handed to every
/// caller sharing it; foreign errors are kept behind an [`Arc`] for that reason.
#[derive(Error, Debug, Clone)]
pub enum MavenError {
    #[error("HTTP reqwest error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("HTTP status {status} returned by {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unable to decode the JSON response: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("Unable to decode the CSV response: {0}")]
    Csv(Arc<csv::Error>),

    #[error("Malformed tabular response: {0}")]
    MalformedTable(String),

    #[error("Request aborted before completion")]
    Aborted,

    #[error("Failed to load frame transform data after {elapsed_sec:.2} s")]
    FrameTransformTimeout { elapsed_sec: f64 },

    #[error("Missing requirement: {0}")]
    MissingRequirement(String),

    #[error("Invalid requirement '{key}': {reason}")]
    InvalidRequirement { key: String, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Programmer Error: unrecognized displayType '{0}'")]
    UnrecognizedDisplayType(String),

    #[error("Programmer Error: displayType '{0}' is not implemented")]
    UnimplementedDisplayType(String),

    #[error("Programmer Error: unexpected solarLongitude: {0}")]
    UnexpectedSolarLongitude(f64),

    #[error("Programmer Error: solar longitude {0} cannot be bucketed into a season")]
    ImpossibleSeasonAngle(f64),

    #[error("Dataset returned no rows: {0}")]
    EmptyDataset(String),
}

impl MavenError {
    /// `true` for the errors that reveal a wiring bug rather than a runtime condition.
    /// These must never be retried.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            MavenError::UnrecognizedDisplayType(_)
                | MavenError::UnimplementedDisplayType(_)
                | MavenError::UnexpectedSolarLongitude(_)
                | MavenError::ImpossibleSeasonAngle(_)
        )
    }
}

impl From<reqwest::Error> for MavenError {
    fn from(err: reqwest::Error) -> Self {
        MavenError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for MavenError {
    fn from(err: serde_json::Error) -> Self {
        MavenError::Json(Arc::new(err))
    }
}

impl From<csv::Error> for MavenError {
    fn from(err: csv::Error) -> Self {
        MavenError::Csv(Arc::new(err))
    }
}

impl From<hifitime::HifitimeError> for MavenError {
    fn from(err: hifitime::HifitimeError) -> Self {
        MavenError::InvalidTimestamp(err.to_string())
    }
}

impl PartialEq for MavenError {
    fn eq(&self, other: &Self) -> bool {
        use MavenError::*;
        match (self, other) {
            // foreign errors are not comparable: equal if same variant
            (Http(_), Http(_)) => true,
            (Json(_), Json(_)) => true,
            (Csv(_), Csv(_)) => true,

            (
                HttpStatus {
                    status: a,
                    url: url_a,
                },
                HttpStatus {
                    status: b,
                    url: url_b,
                },
            ) => a == b && url_a == url_b,
            (InvalidUrl(a), InvalidUrl(b)) => a == b,
            (MalformedTable(a), MalformedTable(b)) => a == b,
            (FrameTransformTimeout { .. }, FrameTransformTimeout { .. }) => true,
            (MissingRequirement(a), MissingRequirement(b)) => a == b,
            (
                InvalidRequirement { key: a, reason: ra },
                InvalidRequirement { key: b, reason: rb },
            ) => a == b && ra == rb,
            (InvalidTimestamp(a), InvalidTimestamp(b)) => a == b,
            (UnrecognizedDisplayType(a), UnrecognizedDisplayType(b)) => a == b,
            (UnimplementedDisplayType(a), UnimplementedDisplayType(b)) => a == b,
            (UnexpectedSolarLongitude(a), UnexpectedSolarLongitude(b)) => a == b,
            (ImpossibleSeasonAngle(a), ImpossibleSeasonAngle(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (EmptyDataset(a), EmptyDataset(b)) => a == b,

            (Aborted, Aborted) => true,

            _ => false,
        }
    }
}
