//! # maven3d environment state
//!
//! This module defines [`MavenEnv`], the **shared environment object** handed to the pieces of
//! the pipeline that talk to the outside world. It provides access to:
//!
//! - A persistent **HTTP client** used for every LaTiS request.
//! - The parsed **root URL** of the LaTiS server.
//! - The [`PipelineConfig`] the environment was built from.
//!
//! The object is **cheaply cloneable** (`reqwest::Client` is reference counted) and is meant to
//! be created once by the composition root, then shared.
//!
//! ## Structure
//!
//! ```text
//! MavenEnv
//! ├── http_client (reqwest::Client)
//! ├── data_root   (reqwest::Url)
//! └── config      (PipelineConfig)
//! ```
use reqwest::{Client, Url};
use tracing::debug;

use crate::{config::PipelineConfig, maven_errors::MavenError};

#[derive(Debug, Clone)]
pub struct MavenEnv {
    pub http_client: Client,
    pub data_root: Url,
    pub config: PipelineConfig,
}

impl MavenEnv {
    /// Create a new environment from a configuration.
    ///
    /// Arguments
    /// ---------
    /// * `config`: the pipeline configuration; its `data_root` must be an absolute URL
    ///
    /// Return
    /// ------
    /// * The environment, or [`MavenError::InvalidUrl`] / [`MavenError::Http`] if the root URL
    ///   cannot be parsed or the client cannot be built.
    pub fn new(config: PipelineConfig) -> Result<Self, MavenError> {
        let mut root = config.data_root.clone();
        if !root.ends_with('/') {
            root.push('/');
        }
        let data_root =
            Url::parse(&root).map_err(|e| MavenError::InvalidUrl(format!("{root}: {e}")))?;

        let http_client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(MavenEnv {
            http_client,
            data_root,
            config,
        })
    }

    /// GET a URL and return the response body, failing on non-success statuses.
    pub(crate) async fn get_from_url(&self, url: Url) -> Result<String, MavenError> {
        debug!(%url, "GET");
        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MavenError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod env_state_test {
    use super::*;

    #[test]
    fn test_root_gets_trailing_slash() {
        let config = PipelineConfig {
            data_root: "http://localhost:8080/latis/dap".into(),
            ..PipelineConfig::default()
        };
        let env = MavenEnv::new(config).unwrap();
        assert_eq!(env.data_root.as_str(), "http://localhost:8080/latis/dap/");
    }

    #[test]
    fn test_invalid_root() {
        let config = PipelineConfig {
            data_root: "not a url".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            MavenEnv::new(config),
            Err(MavenError::InvalidUrl(_))
        ));
    }
}
