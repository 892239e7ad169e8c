//! Remote tile retrieval.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Returns the raw (possibly compressed) bytes of one remote tile.
pub trait TileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

const USER_AGENT: &str = concat!("vt-slim/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP fetcher.
#[derive(Clone)]
pub struct HttpTileFetcher {
    client: reqwest::blocking::Client,
}

impl HttpTileFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::Fetch {
                url: String::new(),
                reason: format!("failed to create HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_err = |reason: String| Error::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| fetch_err(format!("request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }
        let body = response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| fetch_err(format!("failed to read response: {err}")))?;
        debug!(url, bytes = body.len(), "fetched tile");
        Ok(body)
    }
}
