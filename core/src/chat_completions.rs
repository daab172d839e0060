use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use uuid::Uuid;

use crate::client::ModelClient;
use crate::client::ModelResponse;
use crate::client::Prompt;
use crate::config::Config;
use crate::error::Result;
use crate::error::VischatErr;
use crate::models::Role;
use crate::models::ToolCall;
use crate::models::TurnRecord;
use crate::util::backoff;

/// [`ModelClient`] for OpenAI-compatible Chat Completions endpoints.
///
/// Requests are not streamed: the dispatch loop needs the whole decision
/// (text or tool call) before it can move on.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
    max_retries: u64,
}

impl ChatCompletionsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(
                env = config.api_key_env.as_str(),
                "no API key found; sending unauthenticated requests"
            );
        }
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            api_key,
            max_retries: config.request_max_retries,
        })
    }

    async fn post_with_retries(&self, payload: &Value) -> Result<Value> {
        let base_url = self.base_url.trim_end_matches('/');
        let url = format!("{base_url}/chat/completions");

        debug!(url, "POST (chat)");
        trace!("request payload: {payload}");

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut req_builder = self.client.post(&url);
            if let Some(api_key) = &self.api_key {
                req_builder = req_builder.bearer_auth(api_key);
            }
            let res = req_builder.json(payload).send().await;

            match res {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.text().await?;
                    trace!("response body: {body}");
                    return serde_json::from_str(&body)
                        .map_err(|e| VischatErr::MalformedResponse(e.to_string()));
                }
                Ok(res) => {
                    let status = res.status();
                    if !(status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()) {
                        let body = (res.text().await).unwrap_or_default();
                        return Err(VischatErr::UnexpectedStatus { status, body });
                    }

                    if attempt > self.max_retries {
                        return Err(VischatErr::ModelUnreachable(format!(
                            "exceeded retry limit, last status: {status}"
                        )));
                    }

                    let retry_after_secs = res
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());

                    let delay = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| backoff(attempt));
                    debug!(attempt, %status, ?delay, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt > self.max_retries {
                        return Err(VischatErr::ModelUnreachable(e.to_string()));
                    }
                    let delay = backoff(attempt);
                    debug!(attempt, error = %e, ?delay, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &Prompt) -> Result<ModelResponse> {
        let mut payload = json!({
            "model": self.model,
            "messages": build_messages(prompt),
        });
        if !prompt.tools.is_empty() {
            payload["tools"] = Value::Array(prompt.tools.clone());
        }

        let body = self.post_with_retries(&payload).await?;
        parse_response(&body)
    }
}

/// Maps the message log onto the Chat Completions `messages` array.
fn build_messages(prompt: &Prompt) -> Vec<Value> {
    let mut messages = Vec::with_capacity(prompt.input.len() + 1);

    if !prompt.instructions.is_empty() {
        messages.push(json!({"role": "system", "content": prompt.instructions}));
    }

    for record in &prompt.input {
        messages.push(message_for(record));
    }
    messages
}

fn message_for(record: &TurnRecord) -> Value {
    match (record.role, &record.tool_call, &record.tool_result) {
        (Role::Assistant, Some(call), _) => {
            let content = if record.content.is_empty() {
                Value::Null
            } else {
                Value::String(record.content.clone())
            };
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": [{
                    "id": call.call_id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments,
                    }
                }]
            })
        }
        (Role::Tool, _, Some(result)) => json!({
            "role": "tool",
            "tool_call_id": result.call_id,
            "content": record.content,
        }),
        // A tool record without a call id cannot be attached to a request;
        // replay it as assistant text so the context is not lost.
        (Role::Tool, _, None) => json!({"role": "assistant", "content": record.content}),
        (role, _, _) => json!({"role": role.as_str(), "content": record.content}),
    }
}

fn parse_response(body: &Value) -> Result<ModelResponse> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| VischatErr::MalformedResponse("missing choices[0].message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();

    Ok(ModelResponse { text, tool_calls })
}

fn parse_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };
    let call_id = call
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
    Some(ToolCall {
        call_id,
        name,
        arguments,
    })
}
