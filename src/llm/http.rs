use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;
use crate::llm::ProviderKind;

pub(crate) fn build_client(
    provider: ProviderKind,
    request_timeout_ms: Option<u64>,
) -> Result<Client, ProviderError> {
    let mut builder = Client::builder();
    if let Some(timeout_ms) = request_timeout_ms {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }

    builder
        .build()
        .map_err(|err| ProviderError::vendor(provider, err.to_string()))
}

/// Sends a prepared request and decodes a JSON body, folding every
/// transport, status and decode failure into `ProviderError::VendorApi`.
pub(crate) async fn send_json<T>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
{
    let response = request.send().await.map_err(|err| {
        warn!(provider = %provider, error = %err, "request failed");
        ProviderError::vendor(provider, err.to_string())
    })?;

    if !response.status().is_success() {
        let message = extract_api_error(response).await;
        warn!(provider = %provider, %message, "vendor returned an error");
        return Err(ProviderError::vendor(provider, message));
    }

    response
        .json::<T>()
        .await
        .map_err(|err| ProviderError::vendor(provider, format!("invalid response body: {err}")))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
    message: Option<String>,
    #[serde(rename = "Message")]
    message_upper: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<Value>,
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    describe_api_error(status, &body)
}

pub(crate) fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        if let Some(error) = parsed.error {
            let code = error
                .code
                .map(|value| match value {
                    Value::String(value) => value,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| status.as_u16().to_string());
            let error_type = error
                .type_
                .unwrap_or_else(|| status.to_string().to_uppercase());
            let message = error
                .message
                .unwrap_or_else(|| "unknown api error".to_string());
            return format!("{code} {error_type}: {message}");
        }

        if let Some(message) = parsed.message.or(parsed.message_upper) {
            return format!("{}: {message}", status.as_u16());
        }
    }

    if body.is_empty() {
        format!("request failed ({status})")
    } else {
        format!("request failed ({status}): {body}")
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn describes_openai_style_error() {
        let message = describe_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"bad schema","type":"invalid_request_error","code":null}}"#,
        );
        assert_eq!(message, "400 invalid_request_error: bad schema");
    }

    #[test]
    fn describes_bedrock_style_error() {
        let message = describe_api_error(
            StatusCode::FORBIDDEN,
            r#"{"Message":"User is not authorized"}"#,
        );
        assert_eq!(message, "403: User is not authorized");
    }

    #[test]
    fn falls_back_to_raw_body() {
        let message = describe_api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(message.contains("502"));
        assert!(message.ends_with("upstream down"));
    }
}
