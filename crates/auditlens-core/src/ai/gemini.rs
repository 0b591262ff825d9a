//! Gemini backend implementation
//!
//! One synchronous `generateContent` call per analysis, with a declared JSON
//! response schema and a low temperature. No retries and no local timeout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, Row};
use crate::prompts::{PromptId, PromptLibrary};

use super::parsing::parse_analysis_response;
use super::{analysis_sample, AnalysisBackend, MAX_ANOMALIES};

/// Sampling temperature sent with every request
pub const TEMPERATURE: f64 = 0.1;

const MISSING_KEY_MESSAGE: &str = "API Key is missing. Please check your environment variables.";

/// Gemini `generateContent` client
///
/// The API key is optional at construction so a misconfigured deployment can
/// still start; every analysis call then fails with a configuration error.
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    language: String,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl GeminiBackend {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|k| k.to_string()),
            language: crate::config::DEFAULT_LANGUAGE.to_string(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.base_url, &config.model, config.api_key.as_deref())
            .with_language(&config.language)
    }

    /// Language for `reason` and `summary`
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Use a specific prompt library (e.g. embedded-only in tests)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Render the analysis prompt for a (already truncated) sample
    pub fn build_prompt(&self, sample: &[Row]) -> Result<String> {
        let dataset = serde_json::to_string(sample)?;
        let row_count = sample.len().to_string();
        let max_anomalies = MAX_ANOMALIES.to_string();

        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        let template = prompts.get(PromptId::DetectAnomalies)?;
        let mut vars = HashMap::new();
        vars.insert("dataset", dataset.as_str());
        vars.insert("row_count", row_count.as_str());
        vars.insert("max_anomalies", max_anomalies.as_str());
        vars.insert("language", self.language.as_str());
        Ok(template.render(&vars))
    }

    async fn generate(&self, api_key: &str, prompt: String) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: anomaly_schema(),
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http_client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Analysis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!(
                "Gemini API Error (status {}): {}",
                status,
                api_error_message(&body)
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Analysis(e.to_string()))?;

        body.text().ok_or(Error::EmptyResponse)
    }
}

#[async_trait]
impl AnalysisBackend for GeminiBackend {
    async fn detect_anomalies(&self, rows: &[Row]) -> Result<AnalysisResult> {
        let Some(ref api_key) = self.api_key else {
            return Err(Error::Configuration(MISSING_KEY_MESSAGE.to_string()));
        };

        let sample = analysis_sample(rows);
        let prompt = self.build_prompt(sample)?;
        info!(
            rows = sample.len(),
            submitted_of = rows.len(),
            model = %self.model,
            "Requesting anomaly analysis"
        );

        let text = self.generate(api_key, prompt).await?;
        debug!("Gemini response: {}", text);

        let result = parse_analysis_response(&text)?;
        for anomaly in &result.anomalies {
            if anomaly.id < 0 || anomaly.id as usize >= sample.len() {
                warn!(
                    id = anomaly.id,
                    sample = sample.len(),
                    "Model returned an id outside the submitted sample"
                );
            }
        }
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        let Some(ref api_key) = self.api_key else {
            return false;
        };
        match self
            .http_client
            .get(format!("{}/models/{}", self.base_url, self.model))
            .query(&[("key", api_key.as_str())])
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// Declared response contract: `{summary, anomalies[]}`
pub fn anomaly_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A brief summary of the overall data quality and findings."
            },
            "anomalies": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": {
                            "type": "INTEGER",
                            "description": "The index of the row in the provided dataset (0-based)."
                        },
                        "actCode": { "type": "STRING" },
                        "monthly": { "type": "STRING" },
                        "amount": { "type": "NUMBER" },
                        "reason": {
                            "type": "STRING",
                            "description": "Explanation of why this row is an anomaly."
                        },
                        "severity": { "type": "STRING", "enum": ["High", "Medium", "Low"] }
                    },
                    "required": ["id", "actCode", "monthly", "amount", "reason", "severity"]
                }
            }
        },
        "required": ["summary", "anomalies"]
    })
}

/// Pull `error.message` out of an API error body, falling back to the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate, if any
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    fn backend(api_key: Option<&str>) -> GeminiBackend {
        GeminiBackend::new("http://127.0.0.1:9", "gemini-test", api_key)
            .with_prompts(PromptLibrary::embedded_only())
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let err = backend(None)
            .detect_anomalies(&[Row::new("01", "202401", "X1", 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(err.to_string(), MISSING_KEY_MESSAGE);
    }

    #[test]
    fn test_build_prompt_embeds_sample() {
        let rows = vec![
            Row::new("01", "202401", "X1", 100.0),
            Row::new("01", "202401", "X1", 100000.0),
        ];
        let prompt = backend(Some("k"))
            .with_language("English")
            .build_prompt(&rows)
            .unwrap();
        assert!(prompt.contains(r#""actCode":"X1""#));
        assert!(prompt.contains("first 2 rows"));
        assert!(prompt.contains("written in English"));
        assert!(prompt.contains("top 10"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_build_prompt_keeps_placeholder_text_in_cells() {
        let mut row = Row::new("01", "202401", "X1", 100.0);
        row.extra
            .insert("note".into(), CellValue::Text("{{language}}".into()));
        let rows = vec![row];

        for _ in 0..50 {
            let prompt = backend(Some("k"))
                .with_language("English")
                .build_prompt(&rows)
                .unwrap();
            assert!(prompt.contains(r#""note":"{{language}}""#));
            assert!(prompt.contains("written in English"));
        }
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".into(),
                parts: vec![Part { text: "hi".into() }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".into(),
                response_schema: anomaly_schema(),
                temperature: TEMPERATURE,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["temperature"], 0.1);
        assert_eq!(
            json["generationConfig"]["responseSchema"]["required"],
            json!(["summary", "anomalies"])
        );
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(body.text().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_response_without_text() {
        let body: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(body.text().is_none());
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert!(body.text().is_none());
        let body: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(body.text().is_none());
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"code":400,"message":"API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
    }
}
