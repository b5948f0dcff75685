//! Blocking HTTP transport for the collection API.

use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::fetcher::{Page, PageRequest, PageSource};

pub struct HttpPageSource {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpPageSource {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn query_pairs(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("apikey", self.api_key.clone()),
            ("page", request.page.to_string()),
            ("size", request.size.to_string()),
        ];
        if let Some(classification) = &request.classification {
            pairs.push(("classification", classification.clone()));
        }
        pairs
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let mut call = self.agent.get(&self.url(request.endpoint));
        for (key, value) in self.query_pairs(request) {
            call = call.query(key, &value);
        }

        let response = call.call().map_err(|err| match err {
            ureq::Error::Status(status, _) => FetchError::Status {
                endpoint: request.endpoint.to_string(),
                page: request.page,
                classification: request.classification.clone(),
                status,
            },
            // The API key travels in the query string, so keep the URL out of the message.
            ureq::Error::Transport(transport) => FetchError::Transport {
                endpoint: request.endpoint.to_string(),
                page: request.page,
                classification: request.classification.clone(),
                reason: transport.kind().to_string(),
            },
        })?;

        let malformed = |reason: String| FetchError::Malformed {
            endpoint: request.endpoint.to_string(),
            page: request.page,
            classification: request.classification.clone(),
            reason,
        };
        let body: Value = response
            .into_json()
            .map_err(|err| malformed(err.to_string()))?;
        page_from_value(body).map_err(malformed)
    }
}

/// Decodes a listing body. The API reports some failures as 200 with an
/// `error` member instead of `records`.
fn page_from_value(value: Value) -> Result<Page, String> {
    if let Some(error) = value.get("error") {
        return Err(format!("API error: {error}"));
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}
