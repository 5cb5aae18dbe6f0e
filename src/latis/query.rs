use std::fmt;

use itertools::Itertools;
use reqwest::Url;

use crate::maven_errors::MavenError;

/// Output format token of a LaTiS request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabularFormat {
    Jsond,
    Csv,
    Txt,
}

impl TabularFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TabularFormat::Jsond => "jsond",
            TabularFormat::Csv => "csv",
            TabularFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for TabularFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One LaTiS request: a dataset, an output format, an ordered column selection and an
/// ordered list of filter predicates (`time>=...`, `col=value`, `first()`, ...).
///
/// Two queries are the same request if and only if the four fields are equal; the
/// deduplicating source keys its entries on this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LatisQuery {
    pub dataset: String,
    pub format: TabularFormat,
    pub selection: Vec<String>,
    pub filters: Vec<String>,
}

impl LatisQuery {
    pub fn new(dataset: impl Into<String>, format: TabularFormat) -> Self {
        LatisQuery {
            dataset: dataset.into(),
            format,
            selection: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_selection<I, S>(mut self, selection: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = selection.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Query string: the selection joined by `,` followed by each filter, `&`-separated.
    /// An empty selection contributes nothing.
    pub fn query_string(&self) -> String {
        let selection = self.selection.iter().join(",");
        std::iter::once(selection)
            .chain(self.filters.iter().cloned())
            .filter(|part| !part.is_empty())
            .join("&")
    }

    /// Full request URL below the server root.
    ///
    /// Arguments
    /// ---------
    /// * `root`: root of the LaTiS server, ending with `/`
    ///
    /// Return
    /// ------
    /// * `{root}{dataset}.{format}?{selection}&{filters...}`
    pub fn url(&self, root: &Url) -> Result<Url, MavenError> {
        let mut url = root
            .join(&format!("{}.{}", self.dataset, self.format))
            .map_err(|e| MavenError::InvalidUrl(format!("{}: {e}", self.dataset)))?;
        let query = self.query_string();
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        Ok(url)
    }
}
