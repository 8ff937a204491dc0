//! Client for the reader / text-extraction HTTP API.
//!
//! The reader takes the target page URL as its request path
//! (`GET {base_url}/{url}`), authenticates with a bearer key, and answers with
//! the page's extracted text. Any status other than 200 is surfaced as
//! [`ReadingPalError::ExternalService`] carrying the status and body verbatim.

use std::time::Duration;

use readingpal_shared::{AppConfig, READER_LM_V2, ReadingPalError, Result, reader_api_key};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

/// User-Agent string for reader requests.
const USER_AGENT: &str = concat!("ReadingPal/", env!("CARGO_PKG_VERSION"));

/// Header selecting the extraction model on the reader side.
const RESPOND_WITH_HEADER: &str = "X-Respond-With";

// ---------------------------------------------------------------------------
// Reader options
// ---------------------------------------------------------------------------

/// Connection settings for [`ReaderClient`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Endpoint prefix, e.g. `https://r.jina.ai`.
    pub base_url: String,
    /// Bearer key; `None` makes every fetch fail before any request is sent.
    pub api_key: Option<String>,
    /// Env var the key is read from, named in the missing-key error.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl ReaderOptions {
    /// Build options from the `[reader]` section, reading the key from its env var.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.reader.base_url.clone(),
            api_key: reader_api_key(config),
            api_key_env: config.reader.api_key_env.clone(),
            timeout_secs: config.reader.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// ReaderClient
// ---------------------------------------------------------------------------

/// Reusable reader API client. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ReaderClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl ReaderClient {
    pub fn new(opts: ReaderOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| ReadingPalError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: opts.base_url.trim_end_matches('/').to_string(),
            api_key: opts.api_key,
            api_key_env: opts.api_key_env,
        })
    }

    /// Fetch the extracted text of `url` using the given reader `model`.
    #[instrument(skip_all, fields(url = %url, model = %model))]
    pub async fn fetch(&self, url: &str, model: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ReadingPalError::config(format!(
                "reader API key missing: set the {} environment variable",
                self.api_key_env
            ))
        })?;

        let endpoint = reader_endpoint(&self.base_url, url);
        let mut request = self.client.get(&endpoint).bearer_auth(api_key);
        if model == READER_LM_V2 {
            request = request.header(RESPOND_WITH_HEADER, "readerlm-v2");
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReadingPalError::Network(format!("{endpoint}: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ReadingPalError::Network(format!("{endpoint}: failed to read body: {e}"))
        })?;

        if status != StatusCode::OK {
            return Err(ReadingPalError::ExternalService {
                status: status.as_u16(),
                body,
            });
        }

        debug!(bytes = body.len(), "reader returned content");
        Ok(body)
    }
}

/// `{base_url}/{url}`: the target URL is passed through unencoded.
fn reader_endpoint(base_url: &str, url: &str) -> String {
    format!("{base_url}/{url}")
}
