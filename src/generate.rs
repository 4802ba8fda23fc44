use std::sync::Arc;

use tracing::info;

use crate::context::PrContext;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatRequest, CompletionClient};
use crate::prompts::PromptEngine;
use crate::settings::{Settings, validate_api_key};

/// Model parameters for a completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Turns a PR context and a template into a filled description.
pub struct Generator<'a> {
    prompts: &'a PromptEngine,
    client: Arc<dyn CompletionClient>,
    params: ModelParams,
}

impl<'a> Generator<'a> {
    pub fn new(
        prompts: &'a PromptEngine,
        client: Arc<dyn CompletionClient>,
        params: ModelParams,
    ) -> Self {
        Self {
            prompts,
            client,
            params,
        }
    }

    /// Generate a description. An unknown `template_id` falls back to the
    /// first configured template.
    pub async fn generate(
        &self,
        settings: &Settings,
        api_key: Option<&str>,
        template_id: Option<&str>,
        context: &PrContext,
    ) -> Result<String> {
        let template = settings
            .resolve(template_id)
            .ok_or_else(|| Error::Generation("No template configured".to_string()))?;
        let api_key = validate_api_key(api_key)?;

        let prompt = self.prompts.build(template, context)?;
        let request = ChatRequest {
            model: self.params.model.clone(),
            messages: vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };

        info!(
            template = %template.id,
            model = %self.params.model,
            "requesting description"
        );
        let client = Arc::clone(&self.client);
        let api_key = api_key.to_string();
        let description = tokio::task::spawn_blocking(move || client.complete(&api_key, &request))
            .await
            .map_err(|e| Error::Api(format!("completion task failed: {e}")))??;
        info!(chars = description.len(), "description generated");
        Ok(description)
    }
}
