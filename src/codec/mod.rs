//! JSON-RPC 2.0 message codec.
//!
//! Decodes raw transport frames into typed messages and encodes responses
//! back to canonical JSON. Envelope validation lives here so transports stay
//! unaware of protocol semantics: a frame is classified as a request,
//! notification, or response purely by its shape.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::types::{
    ErrorObject, Notification, Request, RequestId, Response, JSONRPC_VERSION,
};

/// A decoded JSON-RPC message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

/// The result of decoding one frame: a single message or a batch.
///
/// Batch elements are decoded independently so one malformed element yields
/// an error response without poisoning its siblings.
#[derive(Debug)]
pub enum Incoming {
    Single(Message),
    Batch(Vec<Result<Message>>),
}

/// Decode a raw frame into one message or a batch.
///
/// Invalid JSON is a `Parse` error; a structurally bad envelope is an
/// `InvalidRequest` error. An empty JSON array is a valid, empty batch.
pub fn decode(input: &str) -> Result<Incoming> {
    let value: Value = serde_json::from_str(input).map_err(|e| Error::Parse(e.to_string()))?;

    match value {
        Value::Array(items) => Ok(Incoming::Batch(items.into_iter().map(classify).collect())),
        other => classify(other).map(Incoming::Single),
    }
}

/// Encode a message to canonical JSON.
pub fn encode(message: &Message) -> Result<String> {
    serde_json::to_string(message).map_err(|e| Error::Encoding(e.to_string()))
}

/// Encode a batch of messages to a JSON array. An empty slice encodes to `[]`.
pub fn encode_batch(messages: &[Message]) -> Result<String> {
    serde_json::to_string(messages).map_err(|e| Error::Encoding(e.to_string()))
}

/// Classify one JSON value as a request, notification, or response.
fn classify(value: Value) -> Result<Message> {
    let obj = match value {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidRequest(format!(
                "message must be an object, got {}",
                type_name(&other)
            )))
        }
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(version) => {
            return Err(Error::InvalidRequest(format!(
                "unsupported jsonrpc version: {version}"
            )))
        }
        None => return Err(Error::InvalidRequest("missing jsonrpc field".to_string())),
    }

    if obj.contains_key("method") {
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidRequest("method must be a string".to_string()))?
            .to_string();

        let params = match obj.get("params") {
            None => None,
            Some(p) if p.is_object() || p.is_array() => Some(p.clone()),
            Some(_) => {
                return Err(Error::InvalidRequest(
                    "params must be an object or array".to_string(),
                ))
            }
        };

        return match obj.get("id") {
            None => Ok(Message::Notification(Notification {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method,
                params,
            })),
            Some(Value::Null) => Err(Error::InvalidRequest(
                "request id must not be null".to_string(),
            )),
            Some(id) => Ok(Message::Request(Request {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: parse_id(id)?,
                method,
                params,
            })),
        };
    }

    if obj.contains_key("result") || obj.contains_key("error") {
        if obj.contains_key("result") && obj.contains_key("error") {
            return Err(Error::InvalidRequest(
                "response must not carry both result and error".to_string(),
            ));
        }

        let id = match obj.get("id") {
            None => {
                return Err(Error::InvalidRequest(
                    "response is missing an id".to_string(),
                ))
            }
            Some(Value::Null) => RequestId::Null,
            Some(id) => parse_id(id)?,
        };

        // Presence-based extraction so an explicit `"result": null` survives.
        let result = obj.get("result").cloned();
        let error = match obj.get("error") {
            None => None,
            Some(e) => Some(
                serde_json::from_value::<ErrorObject>(e.clone())
                    .map_err(|e| Error::InvalidRequest(format!("malformed error object: {e}")))?,
            ),
        };

        return Ok(Message::Response(Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
            error,
        }));
    }

    Err(Error::InvalidRequest(
        "message carries neither a method nor a result/error".to_string(),
    ))
}

fn parse_id(id: &Value) -> Result<RequestId> {
    match id {
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| Error::InvalidRequest("id must be an integer or string".to_string())),
        Value::String(s) => Ok(RequestId::String(s.clone())),
        _ => Err(Error::InvalidRequest(
            "id must be an integer or string".to_string(),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ===== Frame Compression =====

/// Gzip-compress a frame. Used when a transport's configuration asks for
/// compressed length-prefixed frames.
pub async fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

/// Inverse of [`compress`]; the round-trip is exact.
pub async fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    use async_compression::tokio::write::GzipDecoder;
    use tokio::io::AsyncWriteExt;

    let mut decoder = GzipDecoder::new(Vec::new());
    decoder.write_all(data).await?;
    decoder.shutdown().await?;
    Ok(decoder.into_inner())
}
