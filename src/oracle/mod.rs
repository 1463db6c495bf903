use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that determines if two texts are similar in meaning.";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("OpenAI request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    Provider(String),
}

/// Best-effort judge of whether a PR title and a changelog description
/// describe the same change.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn same_change(&self, pr_title: &str, description: &str) -> Result<bool, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn similarity_prompt(pr_title: &str, description: &str) -> String {
    format!(
        "PR Title: {}\nChangelog Description: {}\n\nAre these two texts describing the same change? Answer only YES or NO.",
        pr_title, description
    )
}

/// Whether the model's answer says YES.
fn is_affirmative(answer: &str) -> bool {
    answer.to_uppercase().contains("YES")
}

/// OpenAI chat-completions backed oracle.
pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAiOracle {
    pub fn new(
        api_key: String,
        model: Option<String>,
        api_url: Option<String>,
    ) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_url: api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Send one chat request and return the first choice's content.
    async fn chat(&self, messages: Vec<Message>) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(OracleError::Provider(format!("status {}: {}", status, body)))
            }
            Err(e) => {
                return Err(OracleError::Provider(format!("malformed response: {}", e)))
            }
        };

        if let Some(error) = parsed.error {
            return Err(OracleError::Provider(error.message));
        }
        if !status.is_success() {
            return Err(OracleError::Provider(format!("status {}", status)));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Provider("OpenAI API returned no choices".to_string()))
    }

    /// Check that the API key is accepted by issuing a trivial request.
    #[instrument(skip(self))]
    pub async fn verify_key(&self) -> Result<bool, OracleError> {
        match self
            .chat(vec![Message {
                role: "user",
                content: "Say TEST".to_string(),
            }])
            .await
        {
            Ok(_) => Ok(true),
            Err(OracleError::Provider(message)) => {
                debug!(%message, "API key check rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SimilarityOracle for OpenAiOracle {
    #[instrument(skip(self, pr_title, description), fields(model = %self.model))]
    async fn same_change(&self, pr_title: &str, description: &str) -> Result<bool, OracleError> {
        let answer = self
            .chat(vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: similarity_prompt(pr_title, description),
                },
            ])
            .await?;
        debug!(answer = %answer.trim(), "similarity answer");
        Ok(is_affirmative(&answer))
    }
}
