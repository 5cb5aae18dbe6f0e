use async_trait::async_trait;
use tracing::debug;

use crate::{
    env_state::MavenEnv,
    latis::{LatisQuery, TabularFormat, TabularResult},
    maven_errors::MavenError,
};

/// Something able to answer a [`LatisQuery`] with a table.
///
/// The HTTP implementation is [`HttpFetcher`]; tests plug in-memory fetchers here.
#[async_trait]
pub trait TabularFetcher: Send + Sync {
    async fn fetch_table(&self, query: &LatisQuery) -> Result<TabularResult, MavenError>;
}

/// Fetch tables from a LaTiS server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    env: MavenEnv,
}

impl HttpFetcher {
    pub fn new(env: MavenEnv) -> Self {
        HttpFetcher { env }
    }
}

/// Decode a response body according to the requested format.
pub fn decode_response(query: &LatisQuery, body: &str) -> Result<TabularResult, MavenError> {
    match query.format {
        TabularFormat::Jsond => TabularResult::from_jsond(body),
        TabularFormat::Csv => TabularResult::from_delimited(body, true, &query.selection),
        TabularFormat::Txt => TabularResult::from_delimited(body, false, &query.selection),
    }
}

#[async_trait]
impl TabularFetcher for HttpFetcher {
    async fn fetch_table(&self, query: &LatisQuery) -> Result<TabularResult, MavenError> {
        let url = query.url(&self.env.data_root)?;
        let body = self.env.get_from_url(url).await?;
        let table = decode_response(query, &body)?;
        debug!(
            dataset = %query.dataset,
            rows = table.len(),
            columns = table.parameters.len(),
            "table decoded"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod source_test {
    use super::*;

    #[test]
    fn test_decode_by_format() {
        let query =
            LatisQuery::new("in_situ_kp_data", TabularFormat::Txt).with_selection(["timetag"]);
        let table = decode_response(&query, "2014-10-18T00:00:04\n").unwrap();
        assert_eq!(table.parameters, vec!["timetag"]);
        assert_eq!(table.len(), 1);

        let query = LatisQuery::new("mgitm", TabularFormat::Jsond);
        let table =
            decode_response(&query, r#"{"mgitm": {"parameters": [], "data": []}}"#).unwrap();
        assert!(table.is_empty());

        let query = LatisQuery::new("mgitm", TabularFormat::Jsond);
        assert!(matches!(
            decode_response(&query, "<html>"),
            Err(MavenError::Json(_))
        ));
    }
}
