use crate::config::GatewayConfig;
use crate::history::{ContextTurn, TurnRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl From<&ContextTurn> for ChatTurn {
    fn from(turn: &ContextTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl GenerationParams {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl ChatPayload {
    /// System prompt, then prior turns oldest first, then the user message.
    pub fn build(params: &GenerationParams, context: &[ContextTurn], user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(ChatTurn {
            role: TurnRole::System,
            content: params.system_prompt.clone(),
        });
        messages.extend(context.iter().map(ChatTurn::from));
        messages.push(ChatTurn {
            role: TurnRole::User,
            content: user_message.to_string(),
        });

        Self {
            model: params.model.clone(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    pub fn first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
    }
}
