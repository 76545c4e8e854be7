//! OpenRouter API invoker for vision extraction calls.
//!
//! Retries are not handled here; the benchmark runner wraps every call in the
//! backoff policy and needs to see each 429 individually.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::error::{classify_http_status, InvokeError, InvokeErrorKind};
use super::{ChatMessage, InvokeRequest, Invocation, ModelInvoker, Role};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a structured data extraction assistant. Extract data from the provided image according to the user's instructions. Always respond with valid JSON matching the specified schema. Do not include any text outside the JSON object.";

/// OpenRouter chat-completions client.
pub struct OpenRouterInvoker {
    client: Client,
    api_key: String,
    site_url: String,
}

impl OpenRouterInvoker {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            site_url: "https://github.com/vlm-bench".to_string(),
        }
    }

    /// Override the `HTTP-Referer` sent to OpenRouter.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    /// Parse Retry-After header (seconds, fractional allowed).
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    fn create_error(
        status: reqwest::StatusCode,
        body: &str,
        retry_after: Option<Duration>,
    ) -> InvokeError {
        match classify_http_status(status.as_u16()) {
            InvokeErrorKind::RateLimited => {
                InvokeError::rate_limited(body.to_string(), retry_after)
            }
            _ => InvokeError::failure(format!(
                "OpenRouter API error {}: {}",
                status.as_u16(),
                body
            )),
        }
    }

    fn build_request(request: &InvokeRequest) -> OpenRouterRequest {
        let schema = serde_json::to_string_pretty(&request.schema).unwrap_or_default();
        OpenRouterRequest {
            model: request.model_id.clone(),
            messages: vec![
                ChatMessage::new(Role::System, SYSTEM_PROMPT),
                ChatMessage::with_image(
                    Role::User,
                    request.image_ref.clone(),
                    format!(
                        "{}\n\nRespond with a JSON object matching this schema:\n{}",
                        request.prompt, schema
                    ),
                ),
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        }
    }
}

#[async_trait]
impl ModelInvoker for OpenRouterInvoker {
    async fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
        let body = Self::build_request(request);
        tracing::debug!("Sending request to OpenRouter: model={}", request.model_id);

        let start = Instant::now();
        let response = match self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", "vlm-bench")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    return Err(InvokeError::failure(format!("Request timeout: {}", e)));
                } else if e.is_connect() {
                    return Err(InvokeError::failure(format!("Connection failed: {}", e)));
                } else {
                    return Err(InvokeError::failure(format!("Request failed: {}", e)));
                }
            }
        };

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            return Err(Self::create_error(status, &text, retry_after));
        }

        let parsed: OpenRouterResponse = serde_json::from_str(&text).map_err(|e| {
            InvokeError::failure(format!("Failed to parse response: {}, body: {}", e, text))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Invocation {
            raw_text: content,
            input_tokens,
            output_tokens,
            latency_ms,
        })
    }
}

/// OpenRouter API request format.
#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// OpenRouter API response format.
#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

/// Usage data (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(OpenRouterInvoker::parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(
            OpenRouterInvoker::parse_retry_after(&headers),
            Some(Duration::from_secs(2))
        );

        headers.insert("retry-after", HeaderValue::from_static("0.5"));
        assert_eq!(
            OpenRouterInvoker::parse_retry_after(&headers),
            Some(Duration::from_millis(500))
        );

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(OpenRouterInvoker::parse_retry_after(&headers), None);
    }

    #[test]
    fn test_create_error() {
        let err = OpenRouterInvoker::create_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(Duration::from_secs(1)),
        );
        assert_eq!(err, InvokeError::rate_limited("slow down", Some(Duration::from_secs(1))));

        let err =
            OpenRouterInvoker::create_error(reqwest::StatusCode::BAD_GATEWAY, "upstream", None);
        assert_eq!(err.to_string(), "OpenRouter API error 502: upstream");
    }

    #[test]
    fn test_request_body_shape() {
        let request = InvokeRequest {
            model_id: "openai/gpt-4o".to_string(),
            image_ref: "https://example.com/receipt.png".to_string(),
            prompt: "Extract the receipt".to_string(),
            schema: json!({"type": "object"}),
        };
        let body = serde_json::to_value(OpenRouterInvoker::build_request(&request)).unwrap();

        assert_eq!(body["model"], "openai/gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][0]["image_url"]["url"],
            "https://example.com/receipt.png"
        );
        let text = body["messages"][1]["content"][1]["text"].as_str().unwrap();
        assert!(text.starts_with("Extract the receipt"));
        assert!(text.contains("\"type\": \"object\""));
    }
}
