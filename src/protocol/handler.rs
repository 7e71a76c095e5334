//! Request dispatch.
//!
//! [`ProtocolHandler`] is the single [`MessageHandler`] behind every
//! transport: it decodes frames, routes requests to the registries, and
//! encodes responses. Notifications and incoming responses produce no reply.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Incoming, Message};
use crate::error::{Error, Result};
use crate::metrics::{Metrics, Timer};
use crate::protocol::capabilities::CapabilitySet;
use crate::protocol::types::{
    CallToolParams, ErrorObject, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, LoggingLevel,
    Notification, ReadResourceParams, ReadResourceResult, Request, RequestId, Response,
    ServerInfo, SetLevelParams, MCP_VERSION,
};
use crate::registry::Registry;
use crate::transport::MessageHandler;

/// Dispatches MCP requests against the component registries.
///
/// Request counters are incremented here and only here; registries and
/// component handlers never touch them.
pub struct ProtocolHandler {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    server_info: ServerInfo,
    declared: CapabilitySet,
    negotiated: RwLock<Option<CapabilitySet>>,
    log_level: RwLock<Option<LoggingLevel>>,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<Registry>, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            metrics,
            server_info: ServerInfo {
                name: "switchboard-mcp".to_string(),
                version: crate::VERSION.to_string(),
            },
            declared: CapabilitySet::server_defaults(),
            negotiated: RwLock::new(None),
            log_level: RwLock::new(None),
        }
    }

    pub fn with_server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.declared = capabilities;
        self
    }

    /// The set declared at construction, before any handshake.
    pub fn declared_capabilities(&self) -> &CapabilitySet {
        &self.declared
    }

    /// The set agreed during the last `initialize`, if any.
    pub async fn negotiated_capabilities(&self) -> Option<CapabilitySet> {
        self.negotiated.read().await.clone()
    }

    /// The minimum severity the client asked for via `logging/setLevel`.
    pub async fn log_level(&self) -> Option<LoggingLevel> {
        *self.log_level.read().await
    }

    /// Handle one request and build its response. Infallible: failures become
    /// error responses carrying the request id.
    pub async fn dispatch(&self, request: Request) -> Response {
        let timer = Timer::start();
        let method = request.method;
        let id = request.id;

        let outcome = self.dispatch_method(&method, request.params).await;
        self.metrics.inc_requests();

        let response = match outcome {
            Ok(result) => Response::success(id, result),
            Err(err) => {
                self.metrics.inc_errors();
                warn!(%method, code = err.jsonrpc_code(), "request failed: {}", err);
                Response::error(id, ErrorObject::from(&err))
            }
        };

        debug!(%method, elapsed_ms = timer.elapsed_ms(), "request handled");
        response
    }

    async fn dispatch_method(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => self.handle_initialize(params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => self.handle_resources_list(),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(params).await,
            "logging/setLevel" => self.handle_set_level(params).await,
            other => Err(Error::MethodNotFound(other.to_string())),
        }
    }

    /// `initialize`: negotiate capabilities and report server identity.
    /// A repeated handshake simply renegotiates.
    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = optional_params(params)?;

        if !params.protocol_version.is_empty() && params.protocol_version != MCP_VERSION {
            info!(
                client = %params.protocol_version,
                server = MCP_VERSION,
                "protocol version differs; answering with the server version"
            );
        }
        if let Some(client) = &params.client_info {
            info!(name = %client.name, version = %client.version, "client connected");
        }

        let negotiated = self.declared.negotiate(&params.capabilities);
        *self.negotiated.write().await = Some(negotiated.clone());

        to_result(&InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: negotiated,
            server_info: self.server_info.clone(),
        })
    }

    fn handle_tools_list(&self) -> Result<Value> {
        to_result(&ListToolsResult {
            tools: self.registry.tools.definitions(),
        })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = required_params(params, "tools/call")?;

        if !self
            .registry
            .tools
            .validate_parameters(&params.name, &params.arguments)?
        {
            return Err(Error::InvalidParams(format!(
                "arguments for tool '{}' are missing required fields",
                params.name
            )));
        }

        let result = self
            .registry
            .tools
            .execute(&params.name, params.arguments)
            .await?;
        self.metrics.inc_tool_calls();
        to_result(&result)
    }

    fn handle_resources_list(&self) -> Result<Value> {
        to_result(&ListResourcesResult {
            resources: self.registry.resources.definitions(),
        })
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = required_params(params, "resources/read")?;

        let contents = self
            .registry
            .resources
            .read(&params.uri, HashMap::new())
            .await?;
        self.metrics.inc_resource_reads();
        to_result(&ReadResourceResult { contents })
    }

    fn handle_prompts_list(&self) -> Result<Value> {
        to_result(&ListPromptsResult {
            prompts: self.registry.prompts.definitions(),
        })
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> Result<Value> {
        let params: GetPromptParams = required_params(params, "prompts/get")?;

        let description = self.registry.prompts.description(&params.name);
        let messages = self
            .registry
            .prompts
            .render(&params.name, params.arguments)
            .await?;
        self.metrics.inc_prompt_renders();
        to_result(&GetPromptResult {
            description,
            messages,
        })
    }

    async fn handle_set_level(&self, params: Option<Value>) -> Result<Value> {
        let params: SetLevelParams = required_params(params, "logging/setLevel")?;

        *self.log_level.write().await = Some(params.level);
        info!(level = %params.level, "client set logging level");
        Ok(json!({}))
    }

    async fn handle_notification(&self, notification: Notification) {
        self.metrics.inc_notifications();

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("client reports initialization complete");
            }
            "notifications/cancelled" => {
                debug!(params = ?notification.params, "client cancelled a request");
            }
            other => {
                debug!(method = other, "ignoring notification");
            }
        }
    }

    /// Handle batch elements in order. Requests answer in request order;
    /// notifications answer nothing. A batch with no answerable element
    /// (empty, or notifications only) produces no reply at all.
    async fn handle_batch(&self, items: Vec<Result<Message>>) -> Option<String> {
        let mut responses = Vec::new();

        for item in items {
            match item {
                Ok(Message::Request(request)) => {
                    responses.push(Message::Response(self.dispatch(request).await));
                }
                Ok(Message::Notification(notification)) => {
                    self.handle_notification(notification).await;
                }
                Ok(Message::Response(response)) => {
                    warn!(id = %response.id, "ignoring unexpected response in batch");
                }
                Err(err) => {
                    self.metrics.inc_errors();
                    responses.push(Message::Response(Response::error(
                        RequestId::Null,
                        ErrorObject::from(&err),
                    )));
                }
            }
        }

        if responses.is_empty() {
            return None;
        }
        match codec::encode_batch(&responses) {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                error!("failed to encode batch response: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ProtocolHandler {
    async fn handle(&self, raw: &str) -> Option<String> {
        let incoming = match codec::decode(raw) {
            Ok(incoming) => incoming,
            Err(err) => {
                self.metrics.inc_errors();
                warn!(code = err.jsonrpc_code(), "undecodable frame: {}", err);
                return encode_or_log(&Message::Response(Response::error(
                    RequestId::Null,
                    ErrorObject::from(&err),
                )));
            }
        };

        match incoming {
            Incoming::Single(Message::Request(request)) => {
                let response = self.dispatch(request).await;
                encode_or_log(&Message::Response(response))
            }
            Incoming::Single(Message::Notification(notification)) => {
                self.handle_notification(notification).await;
                None
            }
            Incoming::Single(Message::Response(response)) => {
                warn!(id = %response.id, "ignoring unexpected response message");
                None
            }
            Incoming::Batch(items) => self.handle_batch(items).await,
        }
    }
}

fn encode_or_log(message: &Message) -> Option<String> {
    match codec::encode(message) {
        Ok(encoded) => Some(encoded),
        Err(err) => {
            error!("failed to encode response: {}", err);
            None
        }
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Encoding(e.to_string()))
}

fn required_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T> {
    let value =
        params.ok_or_else(|| Error::InvalidParams(format!("{} requires params", method)))?;
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string())),
    }
}
