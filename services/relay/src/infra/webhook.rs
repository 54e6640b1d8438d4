use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::domain::repository::WebhookTransport;
use crate::error::RelayError;

/// Reqwest-backed webhook transport. Returns the response status; transport
/// faults (DNS, refused connection, timeout) surface as errors for the
/// dispatcher's retry loop.
#[derive(Clone, Default)]
pub struct HttpWebhookTransport {
    client: reqwest::Client,
}

impl HttpWebhookTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl WebhookTransport for HttpWebhookTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, RelayError> {
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| {
                RelayError::MalformedPayload(format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                RelayError::MalformedPayload(format!("invalid header value for {name}: {e}"))
            })?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(endpoint)
            .headers(header_map)
            .body(body.to_owned())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::EndpointUnreachable(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
