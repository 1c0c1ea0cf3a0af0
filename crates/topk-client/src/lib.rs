use std::io::Read;
use std::time::Duration;

use topk_core::{TopKError, Transport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking JSON-over-HTTP [`Transport`] posting every round to one service endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Transport whose connect and read phases each give up after `timeout`.
    #[must_use]
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self { agent, endpoint: endpoint.into() }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, body: &str) -> Result<String, TopKError> {
        let response = match self
            .agent
            .post(&self.endpoint)
            .set("accept", "application/json")
            .set("content-type", "application/json")
            .send_string(body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                return Err(TopKError::Transport(format!(
                    "{} returned HTTP {code}: {detail}",
                    self.endpoint
                )));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(TopKError::Transport(format!("{} unreachable: {err}", self.endpoint)));
            }
        };

        let mut text = String::new();
        response
            .into_reader()
            .read_to_string(&mut text)
            .map_err(|err| TopKError::Transport(format!("failed to read response body: {err}")))?;
        tracing::trace!(endpoint = %self.endpoint, bytes = text.len(), "response received");
        Ok(text)
    }
}
