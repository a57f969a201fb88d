//! AI Contract Review
//!
//! Sends contract text to a local LLM served by Ollama for a structured
//! analysis, then drafts a complaint to the КЗП on the consumer's behalf from
//! that analysis. Complements the rule-based [`super::ContractAnalyzer`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
use ollama_rs::Ollama;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{GuardianError, GuardianResult};

pub const DEFAULT_CONSUMER_NAME: &str = "Потребител";

/// Contract characters included in the analysis prompt.
const MAX_PROMPT_CONTRACT_CHARS: usize = 7500;
const EXCERPT_CHARS: usize = 1000;
const RAW_SUMMARY_CHARS: usize = 500;

const ANALYSIS_SYSTEM_PROMPT: &str = "Вие сте експерт по защита на потребителските права при кредити в България. \
Анализирайте договори и идентифицирайте нарушения на ЗПК, ЗЗП и ЗЗД. \
ВИНАГИ отговаряйте на български език и връщайте валиден JSON.";

const COMPLAINT_SYSTEM_PROMPT: &str = "Вие сте юрист по потребителско право в България. \
Пишете официални жалби до Комисията за защита на потребителите на български език.";

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String>;
}

pub struct OllamaProvider {
    client: Ollama,
}

impl OllamaProvider {
    pub fn new(client: Ollama) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(prompt));

        let res = self
            .client
            .send_chat_messages(ChatMessageRequest::new(model.to_string(), messages))
            .await?;

        Ok(res.message.content)
    }
}

/// Who the complaint is filed for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Consumer {
    pub name: String,
    pub address: String,
}

impl Default for Consumer {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONSUMER_NAME.to_string(),
            address: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiReview {
    pub id: Uuid,
    /// Model that produced the analysis.
    pub model: String,
    pub timestamp: DateTime<Utc>,
    /// The model's JSON answer. When the reply is not valid JSON this holds
    /// `summary`, `raw` and `error` instead.
    pub analysis: Value,
    pub complaint: String,
    /// Start of the contract text the model saw.
    pub text_excerpt: String,
}

pub struct ContractReviewer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ContractReviewer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Ollama at `ollama_url` with `ollama_model`. A malformed URL falls back
    /// to the local default instance.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = Ollama::try_new(config.ollama_url.clone()).unwrap_or_else(|e| {
            warn!("Invalid Ollama URL {:?}: {}, using the local default", config.ollama_url, e);
            Ollama::default()
        });
        Self::new(Arc::new(OllamaProvider::new(client)), config.ollama_model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(&self, contract_text: &str) -> GuardianResult<Value> {
        let contract: String = contract_text.chars().take(MAX_PROMPT_CONTRACT_CHARS).collect();
        let prompt = format!(
            "Анализирай следния кредитен договор и върни валиден JSON със следните полета: \
             contract_number, creditor, principal, stated_apr, fees (списък), violations (списък), \
             calculated_real_apr, summary.\n\nДОГОВОР:\n{contract}"
        );

        let raw = self.ask(prompt, ANALYSIS_SYSTEM_PROMPT).await?;
        Ok(parse_model_json(&raw))
    }

    pub async fn draft_complaint(&self, analysis: &Value, consumer: &Consumer) -> GuardianResult<String> {
        let body = serde_json::to_string_pretty(analysis).map_err(anyhow::Error::from)?;
        let prompt = format!(
            "Генерирай официална жалба към КЗП въз основа на следния анализ:\n{body}\n\
             ИМЕ: {}\nАДРЕС: {}",
            consumer.name, consumer.address
        );

        let complaint = self.ask(prompt, COMPLAINT_SYSTEM_PROMPT).await?;
        Ok(complaint.trim().to_string())
    }

    /// Analysis followed by a complaint drafted from it.
    pub async fn review(&self, contract_text: &str, consumer: &Consumer) -> GuardianResult<AiReview> {
        if contract_text.trim().is_empty() {
            return Err(GuardianError::validation("Документът не съдържа текст"));
        }

        info!("AI review with {} ({} chars)", self.model, contract_text.chars().count());
        let analysis = self.analyze(contract_text).await?;
        let complaint = self.draft_complaint(&analysis, consumer).await?;

        Ok(AiReview {
            id: Uuid::new_v4(),
            model: self.model.clone(),
            timestamp: Utc::now(),
            analysis,
            complaint,
            text_excerpt: contract_text.chars().take(EXCERPT_CHARS).collect(),
        })
    }

    async fn ask(&self, prompt: String, system: &str) -> GuardianResult<String> {
        self.provider
            .generate(&self.model, prompt, Some(system.to_string()))
            .await
            .map_err(|e| {
                warn!("LLM call to {} failed: {:#}", self.model, e);
                GuardianError::Unavailable(format!("AI анализът е недостъпен: {e}"))
            })
    }
}

/// Reads the model's answer as JSON, also when it is wrapped in a markdown
/// code fence. Anything else is kept as a truncated summary.
pub fn parse_model_json(raw: &str) -> Value {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw.trim()) {
        return value;
    }

    let fenced = ["```json", "```"]
        .iter()
        .find_map(|fence| raw.split_once(*fence))
        .map(|(_, rest)| rest.split("```").next().unwrap_or(rest));
    if let Some(Ok(value @ Value::Object(_))) = fenced.map(|block| serde_json::from_str::<Value>(block.trim())) {
        return value;
    }

    debug!("Model reply is not JSON ({} bytes)", raw.len());
    json!({
        "summary": raw.chars().take(RAW_SUMMARY_CHARS).collect::<String>(),
        "raw": raw,
        "error": "JSON decode failed",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers analysis prompts with `analysis` and complaint prompts with a
    /// letter, recording every prompt.
    struct ScriptedProvider {
        analysis: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(analysis: &str) -> Arc<Self> {
            Arc::new(Self {
                analysis: analysis.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> Result<String> {
            let reply = if prompt.contains("ИМЕ:") {
                "  ДО КЗП\nЖАЛБА  ".to_string()
            } else {
                self.analysis.clone()
            };
            self.prompts.lock().unwrap().push(prompt);
            Ok(reply)
        }
    }

    struct DownProvider;

    #[async_trait]
    impl LlmProvider for DownProvider {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        assert_eq!(parse_model_json(r#" {"creditor": "X"} "#), json!({"creditor": "X"}));
        let fenced = "Ето анализа:\n```json\n{\"stated_apr\": 49.9}\n```\nКрай.";
        assert_eq!(parse_model_json(fenced), json!({"stated_apr": 49.9}));
        let bare_fence = "```\n{\"summary\": \"ok\"}\n```";
        assert_eq!(parse_model_json(bare_fence), json!({"summary": "ok"}));
    }

    #[test]
    fn test_parse_falls_back_to_summary() {
        let reply = "Договорът изглежда проблемен.".repeat(40);
        let value = parse_model_json(&reply);
        assert_eq!(value["error"], "JSON decode failed");
        assert_eq!(value["raw"], reply.as_str());
        assert_eq!(value["summary"].as_str().unwrap().chars().count(), RAW_SUMMARY_CHARS);

        // a JSON scalar is not an analysis
        assert_eq!(parse_model_json("42")["error"], "JSON decode failed");
    }

    #[tokio::test]
    async fn test_review_builds_analysis_and_complaint() {
        let provider = ScriptedProvider::new(r#"{"creditor": "БързЗаем ЕАД", "violations": ["такса"]}"#);
        let reviewer = ContractReviewer::new(provider.clone(), "llama3.2");
        let consumer = Consumer {
            name: "Иван Иванов".into(),
            address: "ул. Примерна 1".into(),
        };

        let contract = "Кредитор: БързЗаем ЕАД. ".repeat(500);
        let review = reviewer.review(&contract, &consumer).await.unwrap();

        assert_eq!(review.model, "llama3.2");
        assert_eq!(review.analysis["creditor"], "БързЗаем ЕАД");
        assert_eq!(review.complaint, "ДО КЗП\nЖАЛБА");
        assert_eq!(review.text_excerpt.chars().count(), EXCERPT_CHARS);

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        // contract text is truncated in the prompt
        assert!(prompts[0].chars().count() < MAX_PROMPT_CONTRACT_CHARS + 300);
        assert!(prompts[1].contains("ИМЕ: Иван Иванов"));
        assert!(prompts[1].contains("АДРЕС: ул. Примерна 1"));
        assert!(prompts[1].contains("\"violations\""));
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let reviewer = ContractReviewer::new(Arc::new(DownProvider), "llama3.2");
        let err = reviewer.review("Договор", &Consumer::default()).await.unwrap_err();
        assert!(matches!(err, GuardianError::Unavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let reviewer = ContractReviewer::new(ScriptedProvider::new("{}"), "m");
        assert!(matches!(
            reviewer.review("  \n ", &Consumer::default()).await,
            Err(GuardianError::Validation(_))
        ));
    }

    #[test]
    fn test_consumer_defaults() {
        let consumer: Consumer = serde_json::from_str("{}").unwrap();
        assert_eq!(consumer.name, DEFAULT_CONSUMER_NAME);
        assert!(consumer.address.is_empty());
    }

    #[test]
    fn test_from_config_uses_configured_model() {
        let config = AppConfig {
            ollama_model: "qwen2.5".into(),
            ollama_url: "not a url".into(),
            ..Default::default()
        };
        assert_eq!(ContractReviewer::from_config(&config).model(), "qwen2.5");
    }
}
