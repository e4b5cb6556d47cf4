use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schema::{generation::GENERATED_QUESTION_SCHEMA, validate_json};
use crate::store::models::PromptControl;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Request sent to the generation service for one candidate question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub prompt_control_id: Uuid,
    pub prompt_template: String,
    pub category: String,
    pub difficulty: String,
    pub modality: String,
}

impl From<&PromptControl> for GenerationRequest {
    fn from(control: &PromptControl) -> Self {
        Self {
            prompt_control_id: control.id,
            prompt_template: control.prompt_template.clone(),
            category: control.category.clone(),
            difficulty: control.difficulty.clone(),
            modality: control.modality.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub correct_answer: bool,
    pub explanation: String,
    pub confidence: f64,
}

/// 外部の問題生成サービスとの契約。1リクエストで1問を返す。
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedQuestion>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpGenerationGateway {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpGenerationGateway {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build generation client")?;

        let base_url = Url::parse(&base_url.into()).context("invalid generation base URL")?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }
}

#[async_trait]
impl GenerationGateway for HttpGenerationGateway {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedQuestion> {
        let url = self
            .base_url
            .join("v1/questions/generate")
            .context("failed to build question generation URL")?;

        debug!(
            prompt_control_id = %request.prompt_control_id,
            category = %request.category,
            difficulty = %request.difficulty,
            "sending question generation request"
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .header("X-Prompt-Control-ID", request.prompt_control_id.to_string())
            .timeout(self.request_timeout)
            .send()
            .await
            .context("question generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error = response.error_for_status_ref().err();
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            let message =
                format!("question generation endpoint returned error status {status}: {truncated}");
            return Err(match error {
                Some(error) => anyhow::Error::new(error).context(message),
                None => anyhow!(message),
            });
        }

        let body: Value = response
            .json()
            .await
            .context("failed to deserialize generation response as JSON")?;

        let validation = validate_json(&GENERATED_QUESTION_SCHEMA, &body);
        if !validation.valid {
            warn!(
                prompt_control_id = %request.prompt_control_id,
                errors = ?validation.errors,
                "generation response failed JSON Schema validation"
            );
            return Err(anyhow!(
                "generation response validation failed: {:?}",
                validation.errors
            ));
        }

        serde_json::from_value(body).context("failed to deserialize validated generation response")
    }

    async fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join("health")
            .context("failed to build generation health URL")?;

        self.client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("generation health request failed")?
            .error_for_status()
            .context("generation health endpoint returned error status")?;

        Ok(())
    }
}
