//! OpenAI Assistants API implementation
//!
//! Threads hold the conversation history, runs execute the provisioned
//! assistant over a thread, and paused runs surface tool calls that are
//! answered through `submit_tool_outputs`. The assistant profile itself
//! (instructions, tool schemas, model) is provisioned out-of-band.

use super::types::{ActionOutput, ActionRequest, Run, RunStatus};
use super::{AssistantError, AssistantService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the hosted assistant service
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// Handle of the pre-provisioned assistant profile
    pub assistant_id: String,
    pub base_url: String,
}

impl AssistantConfig {
    /// Read configuration from the environment. Returns `None` when either
    /// required variable is missing or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty())?;
        let assistant_id = std::env::var("ASSISTANT_ID").ok().filter(|v| !v.is_empty())?;
        let base_url = std::env::var("CONCIERGE_ASSISTANT_BASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Some(Self {
            api_key,
            assistant_id,
            base_url,
        })
    }
}

/// Assistant service backed by the OpenAI Assistants API
pub struct OpenAiAssistant {
    client: Client,
    api_key: String,
    assistant_id: String,
    base_url: String,
}

impl OpenAiAssistant {
    pub fn new(config: AssistantConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: config.api_key,
            assistant_id: config.assistant_id,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AssistantError> {
        let builder = self
            .authed(self.client.post(format!("{}{path}", self.base_url)))
            .json(body);
        Self::execute(builder).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AssistantError> {
        let builder = self.authed(self.client.get(format!("{}{path}", self.base_url)));
        Self::execute(builder).await
    }

    async fn execute<T: DeserializeOwned>(
        builder: reqwest::RequestBuilder,
    ) -> Result<T, AssistantError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AssistantError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                AssistantError::network(format!("Connection failed: {e}"))
            } else {
                AssistantError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&body) {
                let message = error_resp.error.message;
                return Err(match status.as_u16() {
                    401 | 403 => AssistantError::auth(format!("Authentication failed: {message}")),
                    429 => AssistantError::rate_limit(format!("Rate limit exceeded: {message}")),
                    400 => AssistantError::invalid_request(format!("Invalid request: {message}")),
                    500..=599 => AssistantError::server_error(format!("Server error: {message}")),
                    _ => AssistantError::unknown(format!("HTTP {status}: {message}")),
                });
            }
            return Err(AssistantError::unknown(format!("HTTP {status} error: {body}")));
        }

        serde_json::from_str(&body).map_err(|e| {
            AssistantError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })
    }
}

#[async_trait]
impl AssistantService for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: ApiThread = self.post_json("/threads", &serde_json::json!({})).await?;
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        let body = ApiCreateMessage {
            role: "user",
            content: text,
        };
        let _message: ApiMessage = self
            .post_json(&format!("/threads/{thread_id}/messages"), &body)
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, AssistantError> {
        let body = ApiCreateRun {
            assistant_id: &self.assistant_id,
        };
        let run: ApiRun = self
            .post_json(&format!("/threads/{thread_id}/runs"), &body)
            .await?;
        Ok(convert_run(run))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let run: ApiRun = self
            .get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await?;
        Ok(convert_run(run))
    }

    async fn submit_action_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ActionOutput],
    ) -> Result<Run, AssistantError> {
        let body = ApiSubmitToolOutputsRequest {
            tool_outputs: outputs
                .iter()
                .map(|o| ApiToolOutput {
                    tool_call_id: &o.call_id,
                    output: &o.output,
                })
                .collect(),
        };
        let run: ApiRun = self
            .post_json(
                &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &body,
            )
            .await?;
        Ok(convert_run(run))
    }

    async fn latest_assistant_reply(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        let list: ApiMessageList = self
            .get_json(&format!("/threads/{thread_id}/messages?order=desc"))
            .await?;
        Ok(extract_reply(&list))
    }
}

/// Normalize a wire run: pending tool calls become action requests with the
/// raw argument JSON preserved for registry-side validation.
fn convert_run(run: ApiRun) -> Run {
    let pending_actions = run
        .required_action
        .map(|ra| {
            ra.submit_tool_outputs
                .tool_calls
                .into_iter()
                .map(|tc| ActionRequest {
                    call_id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect()
        })
        .unwrap_or_default();

    Run {
        id: run.id,
        status: run.status,
        pending_actions,
    }
}

/// Newest-first scan for the most recent assistant-authored text
fn extract_reply(list: &ApiMessageList) -> Option<String> {
    list.data
        .iter()
        .find(|message| message.role == "assistant")
        .and_then(|message| {
            message.content.iter().find_map(|block| {
                if block.r#type == "text" {
                    block.text.as_ref().map(|t| t.value.clone())
                } else {
                    None
                }
            })
        })
}

// Assistants API wire types

#[derive(Debug, Deserialize)]
struct ApiThread {
    id: String,
}

#[derive(Debug, Serialize)]
struct ApiCreateMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiCreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<ApiRequiredAction>,
}

#[derive(Debug, Deserialize)]
struct ApiRequiredAction {
    submit_tool_outputs: ApiSubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitToolOutputs {
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// JSON-encoded argument bundle, passed through unparsed
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiSubmitToolOutputsRequest<'a> {
    tool_outputs: Vec<ApiToolOutput<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiToolOutput<'a> {
    tool_call_id: &'a str,
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiMessageList {
    data: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Vec<ApiContentBlock>,
}

/// Content blocks arrive with a `type` discriminant; only text blocks carry
/// a reply. Unknown block types keep their optional fields empty.
#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<ApiTextContent>,
}

#[derive(Debug, Deserialize)]
struct ApiTextContent {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
