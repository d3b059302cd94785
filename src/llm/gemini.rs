use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Config, DESCRIPTION_SYSTEM_PROMPT, DESCRIPTION_USER_PROMPT};
use crate::conversation::ports::{DescriptionGenerator, GeneratorError};
use crate::llm::media::truncate_for_log;
use crate::utils::http::{get_http_client, redact_secrets};
use crate::utils::timing::log_llm_timing;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            for part in content.parts.unwrap_or_default() {
                if let Some(text) = part.text {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
            }
        }
    }
    text_parts.join("\n").trim().to_string()
}

/// Product descriptions from a Gemini vision model.
pub struct GeminiDescriber {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: i32,
    timeout: Duration,
}

impl GeminiDescriber {
    pub fn from_config(config: &Config) -> Self {
        GeminiDescriber {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            temperature: config.gemini_temperature,
            max_output_tokens: config.gemini_max_output_tokens,
            timeout: Duration::from_secs(config.gemini_timeout_seconds.max(1)),
        }
    }

    fn build_payload(&self, image: &[u8], mime_type: &str) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": DESCRIPTION_SYSTEM_PROMPT }] },
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": mime_type,
                            "data": general_purpose::STANDARD.encode(image),
                        }
                    },
                    { "text": DESCRIPTION_USER_PROMPT }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        })
    }

    async fn call_gemini_api(&self, payload: &Value) -> Result<GeminiResponse, GeneratorError> {
        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let response = get_http_client()
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                debug!(
                    "Gemini request failed to send (timeout={}, connect={})",
                    err.is_timeout(),
                    err.is_connect()
                );
                GeneratorError::Request(redact_secrets(&err.to_string(), &[self.api_key.as_str()]))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            debug!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message: message.unwrap_or(body_summary),
            });
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| GeneratorError::Request(err.to_string()))
    }
}

#[async_trait]
impl DescriptionGenerator for GeminiDescriber {
    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, GeneratorError> {
        if self.api_key.is_empty() {
            return Err(GeneratorError::NotConfigured);
        }

        let payload = self.build_payload(image, mime_type);
        let payload = &payload;
        let metadata = json!({ "mime_type": mime_type, "image_bytes": image.len() });
        log_llm_timing("gemini", &self.model, "describe_product", Some(metadata), || async move {
            let response = self.call_gemini_api(payload).await?;
            let text = extract_text_from_response(response);
            if text.is_empty() {
                return Err(GeneratorError::Empty);
            }
            debug!("Gemini description: {}", truncate_for_log(&text, 300));
            Ok(text)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describer(api_key: &str) -> GeminiDescriber {
        GeminiDescriber {
            api_key: api_key.to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 512,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn payload_inlines_the_image() {
        let payload = describer("key").build_payload(&[1, 2, 3], "image/png");
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], DESCRIPTION_USER_PROMPT);
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn extracts_and_joins_text_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Una taza " }, { "text": "  " }, { "text": "mágica." }] } }]
        }))
        .unwrap();
        assert_eq!(extract_text_from_response(response), "Una taza \nmágica.");

        let empty: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert_eq!(extract_text_from_response(empty), "");
    }

    #[test]
    fn error_bodies_prefer_the_api_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"code":400,"message":"bad image"}}"#);
        assert_eq!(message.as_deref(), Some("bad image"));
        assert_eq!(summarize_error_body("").1, "empty response body");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let result = describer("").describe(&[1], "image/jpeg").await;
        assert!(matches!(result, Err(GeneratorError::NotConfigured)));
    }
}
