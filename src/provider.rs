//! Analysis provider abstraction and the Gemini-backed implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use crate::credentials::ApiKey;
use crate::error::{ServiceError, ServiceResult};

/// Default remote model identifier.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default base URL of the model API.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// A provider capable of analyzing one image with one instruction.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Submit `instruction` plus the image at `image` and await the full
    /// textual response. No streaming, no retries.
    async fn analyze(&self, instruction: &str, image: &Path) -> ServiceResult<String>;
}

/// Builds a provider bound to a session credential.
///
/// Returns `None` when a provider cannot be constructed (blank or malformed
/// key, client misconfiguration). Construction failures are logged, never
/// raised; callers translate `None` into a clean error response.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, key: &ApiKey) -> Option<Arc<dyn AnalysisProvider>>;
}

/// Factory for [`GeminiProvider`] instances.
///
/// The web-search tool is a capability decided at construction time, not
/// attached dynamically per request.
pub struct GeminiFactory {
    base_url: String,
    model: String,
    web_search: bool,
}

impl GeminiFactory {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, web_search: bool) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            web_search,
        }
    }
}

impl ProviderFactory for GeminiFactory {
    fn build(&self, key: &ApiKey) -> Option<Arc<dyn AnalysisProvider>> {
        let secret = key.expose().trim();
        if secret.is_empty() || !secret.is_ascii() {
            tracing::warn!("Provider not built: API key is blank or malformed");
            return None;
        }

        let client = match reqwest::Client::builder().build() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Provider not built: HTTP client construction failed: {e}");
                return None;
            }
        };

        Some(Arc::new(GeminiProvider {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model: self.model.clone(),
            api_key: secret.to_string(),
            web_search: self.web_search,
        }))
    }
}

/// Calls the Gemini `generateContent` endpoint with an inline image part.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    web_search: bool,
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    async fn analyze(&self, instruction: &str, image: &Path) -> ServiceResult<String> {
        let bytes = std::fs::read(image)?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let mut body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inline_data": { "mime_type": "image/png", "data": data } }
                ]
            }]
        });
        if self.web_search {
            body["tools"] = serde_json::json!([{ "google_search": {} }]);
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        tracing::debug!(
            "Submitting {} byte image to {} (web_search: {})",
            bytes.len(),
            url,
            self.web_search
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::AnalysisFailure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Model API error {status}: {detail}");
            return Err(ServiceError::AnalysisFailure(format!(
                "model API returned {status}"
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::AnalysisFailure(format!("unreadable response: {e}")))?;

        let text = extract_text(&json)
            .ok_or_else(|| ServiceError::AnalysisFailure("response contained no text".into()))?;
        tracing::info!("Analysis response received ({} chars)", text.len());
        Ok(text)
    }
}

/// Pull the concatenated text parts out of a `generateContent` response.
fn extract_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("scan.png");
        image::DynamicImage::new_rgb8(4, 4)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn factory_rejects_blank_key() {
        let factory = GeminiFactory::new(DEFAULT_API_BASE, DEFAULT_MODEL, true);
        assert!(factory.build(&ApiKey::new("   ")).is_none());
        assert!(factory.build(&ApiKey::new("")).is_none());
    }

    #[test]
    fn factory_rejects_non_ascii_key() {
        let factory = GeminiFactory::new(DEFAULT_API_BASE, DEFAULT_MODEL, true);
        assert!(factory.build(&ApiKey::new("clé-secrète")).is_none());
    }

    #[test]
    fn extract_text_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Normal " },
                { "text": "chest X-ray." }
            ] } }]
        });
        assert_eq!(extract_text(&json).unwrap(), "Normal chest X-ray.");
    }

    #[test]
    fn extract_text_rejects_empty_and_malformed() {
        assert!(extract_text(&serde_json::json!({})).is_none());
        let empty = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] } }]
        });
        assert!(extract_text(&empty).is_none());
    }

    #[tokio::test]
    async fn analyze_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{DEFAULT_MODEL}:generateContent"
            )))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "Likely a normal chest X-ray." }
                ] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = png_file(&dir);

        let factory = GeminiFactory::new(server.uri(), DEFAULT_MODEL, false);
        let provider = factory.build(&ApiKey::new("test-key")).unwrap();
        let text = provider.analyze("Describe this image.", &image).await.unwrap();
        assert_eq!(text, "Likely a normal chest X-ray.");
    }

    #[tokio::test]
    async fn analyze_sends_web_search_tool_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{ "google_search": {} }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = png_file(&dir);

        let factory = GeminiFactory::new(server.uri(), DEFAULT_MODEL, true);
        let provider = factory.build(&ApiKey::new("test-key")).unwrap();
        provider.analyze("Describe this image.", &image).await.unwrap();
    }

    #[tokio::test]
    async fn analyze_maps_http_errors_to_analysis_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = png_file(&dir);

        let factory = GeminiFactory::new(server.uri(), DEFAULT_MODEL, false);
        let provider = factory.build(&ApiKey::new("bad-key")).unwrap();
        let err = provider
            .analyze("Describe this image.", &image)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AnalysisFailure(_)));
    }
}
