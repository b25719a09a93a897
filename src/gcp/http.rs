//! HTTP utilities for workspace service REST calls

use crate::error::FetchError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Map an HTTP status to the backend error taxonomy
pub fn classify_status(status: StatusCode, url: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::PermissionDenied(url.to_string())
        },
        other => FetchError::Unavailable(format!("{url} returned {other}")),
    }
}

/// HTTP client wrapper for authenticated JSON calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("wsctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, FetchError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(format!("failed to send request: {e}")))?;

        Self::decode(url, response).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<T, FetchError> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(format!("failed to send request: {e}")))?;

        Self::decode(url, response).await
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, FetchError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unavailable(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            // Only the sanitized, truncated body is logged
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(classify_status(status, url));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Undecodable response from {}: {}", url, sanitize_for_log(&body));
            FetchError::Unavailable(format!("failed to parse response JSON: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "u"),
            FetchError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "u"),
            FetchError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "u"),
            FetchError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "u"),
            FetchError::Unavailable(_)
        ));
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let body = "é".repeat(150);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("truncated"));
    }
}
