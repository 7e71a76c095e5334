//! Built-in tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

use crate::error::Result;
use crate::protocol::types::{Tool, ToolResult};
use crate::registry::component::{
    error_result, get_bool_arg, get_optional_string_arg, get_string_arg, success_result,
};
use crate::registry::ToolHandler;

/// Echoes its `text` argument back.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Echo the provided text back to the caller".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo"},
                    "uppercase": {"type": "boolean", "description": "Upper-case the echoed text"}
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let text = get_string_arg(&args, "text")?;
        if get_bool_arg(&args, "uppercase", false) {
            return Ok(success_result(text.to_uppercase()));
        }
        Ok(success_result(text))
    }
}

/// Reports host and process information.
pub struct SystemInfoTool {
    started: Instant,
}

impl SystemInfoTool {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemInfoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for SystemInfoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "system_info".to_string(),
            description: "Report server OS, architecture, version, and uptime".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "section": {
                        "type": "string",
                        "description": "Return one field only: os, arch, version, pid, or uptimeSecs"
                    }
                }
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let info = json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": crate::VERSION,
            "pid": std::process::id(),
            "uptimeSecs": self.started.elapsed().as_secs(),
        });

        if let Some(section) = get_optional_string_arg(&args, "section") {
            return Ok(match info.get(section.as_str()) {
                Some(Value::String(s)) => success_result(s.clone()),
                Some(value) => success_result(value.to_string()),
                None => error_result(format!("unknown section: {}", section)),
            });
        }
        Ok(success_result(info.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::types::ContentBlock;

    fn result_text(result: &ToolResult) -> &str {
        match &result.content[0] {
            ContentBlock::Text { text } => text,
            other => panic!("expected text content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_echo_roundtrips_text() {
        let tool = EchoTool;
        assert_eq!(tool.definition().name, "echo");
        assert!(tool.definition().input_schema["required"]
            .as_array()
            .unwrap()
            .contains(&json!("text")));

        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("hello"));
        let result = tool.execute(args).await.unwrap();

        assert!(!result.is_error);
        assert_eq!(result_text(&result), "hello");
    }

    #[tokio::test]
    async fn test_echo_uppercase_flag() {
        let tool = EchoTool;
        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("hello"));
        args.insert("uppercase".to_string(), json!(true));

        let result = tool.execute(args).await.unwrap();
        assert_eq!(result_text(&result), "HELLO");
    }

    #[tokio::test]
    async fn test_echo_missing_text_is_invalid_params() {
        let tool = EchoTool;
        let err = tool.execute(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_system_info_reports_host() {
        let tool = SystemInfoTool::new();
        let result = tool.execute(HashMap::new()).await.unwrap();

        let info: Value = serde_json::from_str(result_text(&result)).unwrap();
        assert_eq!(info["os"], json!(std::env::consts::OS));
        assert_eq!(info["arch"], json!(std::env::consts::ARCH));
        assert_eq!(info["version"], json!(crate::VERSION));
        assert!(info["pid"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_system_info_section_lookup() {
        let tool = SystemInfoTool::new();

        let mut args = HashMap::new();
        args.insert("section".to_string(), json!("os"));
        let result = tool.execute(args).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result_text(&result), std::env::consts::OS);

        let mut args = HashMap::new();
        args.insert("section".to_string(), json!("nonsense"));
        let result = tool.execute(args).await.unwrap();
        assert!(result.is_error);
    }
}
