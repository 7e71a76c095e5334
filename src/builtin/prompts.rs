//! Built-in prompt templates.
//!
//! Prompts render from `{{var}}` templates. `{{#if var}}...{{/if}}` sections
//! survive only when the argument is present and non-empty; placeholders for
//! arguments never supplied are stripped.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::types::{ContentBlock, Prompt, PromptArgument, PromptMessage, Role};
use crate::registry::PromptHandler;

/// A prompt rendered from a text template.
///
/// # Examples
///
/// ```
/// # tokio_test::block_on(async {
/// use std::collections::HashMap;
/// use switchboard_mcp::builtin::TemplatePrompt;
/// use switchboard_mcp::protocol::types::Prompt;
/// use switchboard_mcp::registry::PromptHandler;
///
/// let prompt = TemplatePrompt::new(
///     Prompt {
///         name: "hello".to_string(),
///         description: "Say hello".to_string(),
///         arguments: vec![],
///     },
///     "Hello, {{name}}!",
/// );
///
/// let mut args = HashMap::new();
/// args.insert("name".to_string(), "Ada".to_string());
/// let messages = prompt.render(args).await.unwrap();
/// assert_eq!(messages.len(), 1);
/// # });
/// ```
pub struct TemplatePrompt {
    definition: Prompt,
    template: String,
}

impl TemplatePrompt {
    pub fn new(definition: Prompt, template: impl Into<String>) -> Self {
        Self {
            definition,
            template: template.into(),
        }
    }
}

#[async_trait]
impl PromptHandler for TemplatePrompt {
    fn definition(&self) -> Prompt {
        self.definition.clone()
    }

    async fn render(&self, args: HashMap<String, String>) -> Result<Vec<PromptMessage>> {
        let text = render_template(&self.template, &args);
        Ok(vec![PromptMessage {
            role: Role::User,
            content: ContentBlock::Text { text },
        }])
    }
}

fn render_template(template: &str, args: &HashMap<String, String>) -> String {
    let mut text = apply_conditionals(template, args);
    for (key, value) in args {
        text = text.replace(&format!("{{{{{}}}}}", key), value);
    }
    strip_unfilled(&text)
}

/// Resolve `{{#if var}}body{{/if}}` sections against the supplied arguments.
/// Malformed sections are passed through untouched.
fn apply_conditionals(template: &str, args: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{#if ") {
        out.push_str(&rest[..start]);
        let after_tag = &rest[start + "{{#if ".len()..];

        let (name, body_and_tail) = match after_tag.split_once("}}") {
            Some(parts) => parts,
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        };
        let (body, tail) = match body_and_tail.split_once("{{/if}}") {
            Some(parts) => parts,
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        };

        let keep = args.get(name.trim()).map(|v| !v.is_empty()).unwrap_or(false);
        if keep {
            out.push_str(body);
        }
        rest = tail;
    }

    out.push_str(rest);
    out
}

fn strip_unfilled(text: &str) -> String {
    match Regex::new(r"\{\{[A-Za-z_][A-Za-z0-9_]*\}\}") {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// The prompt set registered at startup.
pub fn builtin_prompts() -> Vec<Arc<dyn PromptHandler>> {
    vec![
        Arc::new(TemplatePrompt::new(
            Prompt {
                name: "code_review".to_string(),
                description: "Review code for quality, bugs, and best practices".to_string(),
                arguments: vec![
                    PromptArgument {
                        name: "code".to_string(),
                        description: Some("The code to review".to_string()),
                        required: true,
                    },
                    PromptArgument {
                        name: "language".to_string(),
                        description: Some("Programming language".to_string()),
                        required: false,
                    },
                    PromptArgument {
                        name: "focus".to_string(),
                        description: Some("Areas to focus on (security, performance, style)".to_string()),
                        required: false,
                    },
                ],
            },
            r#"Please review the following code:

```{{language}}
{{code}}
```

{{#if focus}}Focus areas: {{focus}}{{/if}}

Analyze for:
1. Potential bugs or errors
2. Security vulnerabilities
3. Performance issues
4. Suggestions for improvement"#,
        )),
        Arc::new(TemplatePrompt::new(
            Prompt {
                name: "explain_code".to_string(),
                description: "Explain what a piece of code does".to_string(),
                arguments: vec![
                    PromptArgument {
                        name: "code".to_string(),
                        description: Some("The code to explain".to_string()),
                        required: true,
                    },
                    PromptArgument {
                        name: "level".to_string(),
                        description: Some("Explanation level: beginner, intermediate, advanced".to_string()),
                        required: false,
                    },
                ],
            },
            r#"Please explain the following code{{#if level}} at a {{level}} level{{/if}}:

```
{{code}}
```

Explain:
1. What the code does overall
2. How it works step by step
3. Any important patterns or techniques used"#,
        )),
    ]
}
