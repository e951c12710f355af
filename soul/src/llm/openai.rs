//! Real `ChatProvider` backed by the OpenAI Chat Completions API.
//!
//! Grounded on `graphweave::llm::openai::ChatOpenAI`
//! (`examples/hi-youichi-loom/graphweave/src/llm/openai.rs`): a thin wrapper
//! around `async_openai::Client`, converting our message/tool types to its
//! request types and back. Kept behind the `openai` feature so the core
//! never forces an HTTP client dependency on embedders that bring their own
//! (per spec.md §1, the chat-provider HTTP client is explicitly out of
//! core scope — this is the one reference implementation).

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::message::{ContentPart, Message, Role, ToolCall};
use crate::wire::{WireEvent, WireSoulSide};

use super::{ChatProvider, ChatProviderError, ChatRequest, ChatResponse, ChatUsage};

pub struct ChatOpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    image_in: bool,
}

impl ChatOpenAiProvider {
    pub fn new(model: impl Into<String>) -> Self {
        ChatOpenAiProvider {
            client: Client::new(),
            model: model.into(),
            image_in: false,
        }
    }

    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        ChatOpenAiProvider {
            client: Client::with_config(config),
            model: model.into(),
            image_in: false,
        }
    }

    pub fn supporting_images(mut self) -> Self {
        self.image_in = true;
        self
    }

    fn to_request_messages(
        system_prompt: &str,
        history: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, ChatProviderError> {
        let mut out = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| ChatProviderError::Other(e.to_string()))?
            .into()];

        for msg in history {
            match msg.role {
                Role::System => out.push(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(msg.text())
                        .build()
                        .map_err(|e| ChatProviderError::Other(e.to_string()))?
                        .into(),
                ),
                Role::User => out.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(msg.text())
                        .build()
                        .map_err(|e| ChatProviderError::Other(e.to_string()))?
                        .into(),
                ),
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    builder.content(msg.text());
                    out.push(
                        builder
                            .build()
                            .map_err(|e| ChatProviderError::Other(e.to_string()))?
                            .into(),
                    );
                }
                Role::Tool => {
                    if let Some(result) = &msg.tool_result {
                        let content = match &result.return_value {
                            crate::message::ReturnValue::Ok { output, .. } => output.clone(),
                            crate::message::ReturnValue::Error { message, .. } => {
                                format!("error: {message}")
                            }
                            crate::message::ReturnValue::Rejected => "rejected by user".to_string(),
                        };
                        out.push(
                            ChatCompletionRequestToolMessageArgs::default()
                                .content(content)
                                .tool_call_id(result.tool_call_id.clone())
                                .build()
                                .map_err(|e| ChatProviderError::Other(e.to_string()))?
                                .into(),
                        );
                    }
                }
            }
        }
        Ok(out)
    }

    fn to_request_tools(
        tool_schemas: &[crate::tools::ToolSpec],
    ) -> Result<Vec<ChatCompletionTool>, ChatProviderError> {
        tool_schemas
            .iter()
            .map(|spec| {
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(spec.name.clone())
                            .description(spec.description.clone())
                            .parameters(spec.params_schema.clone())
                            .build()
                            .map_err(|e| ChatProviderError::Other(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| ChatProviderError::Other(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl ChatProvider for ChatOpenAiProvider {
    fn image_in(&self) -> bool {
        self.image_in
    }
    fn thinking(&self) -> bool {
        false
    }

    async fn step(
        &self,
        request: ChatRequest,
        wire: &WireSoulSide,
    ) -> Result<ChatResponse, ChatProviderError> {
        let messages = Self::to_request_messages(&request.system_prompt, &request.history)?;
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.model.clone()).messages(messages);
        if !request.tool_schemas.is_empty() {
            builder.tools(Self::to_request_tools(&request.tool_schemas)?);
        }
        let req = builder
            .build()
            .map_err(|e| ChatProviderError::Other(e.to_string()))?;

        debug!(model = %self.model, "openai: sending chat completion request");
        let response = self.client.chat().create(req).await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("timed out") {
                ChatProviderError::Timeout
            } else if msg.contains("connect") {
                ChatProviderError::Connection(msg)
            } else {
                ChatProviderError::Other(msg)
            }
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(ChatProviderError::EmptyResponse)?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                parts.push(ContentPart::text(text.clone()));
                wire.send(WireEvent::Content(ContentPart::text(text)));
            }
        }
        if let Some(tool_calls) = choice.message.tool_calls {
            for tc in tool_calls {
                let arguments = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                    warn!(error = %e, "openai: tool call arguments were not valid JSON");
                    serde_json::Value::String(tc.function.arguments.clone())
                });
                let call = ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                };
                wire.send(WireEvent::ToolCall(call.clone()));
                parts.push(ContentPart::ToolCall(call));
            }
        }
        if parts.is_empty() {
            return Err(ChatProviderError::EmptyResponse);
        }

        let usage = response
            .usage
            .map(|u| ChatUsage {
                prompt_tokens: u.prompt_tokens as u64,
                completion_tokens: u.completion_tokens as u64,
                total_tokens: u.total_tokens as u64,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            message: Message::assistant(parts),
            usage,
        })
    }
}
