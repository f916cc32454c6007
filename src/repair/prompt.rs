//! Request rendering for the patch-generating model

use crate::backend_executor::BackendRequest;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that is great at fixing code and not breaking it.";

/// Default user message. Override with `repair.prompt_template`.
pub const DEFAULT_TEMPLATE: &str = r#"I have a program with errors, and I would like you to help me fix the issues in the code.
The original code of the program run ({{ file_path }}) and the output, including any error messages and stack traces, are provided below.

Please return a JSON object containing the suggested changes in a format similar to the git diff system, showing whether a line is added, removed, or edited for each file.
{% if intent %}
Intent: {{ intent }}
{% endif %}
Original Code:
{{ code }}

Output:
{{ output }}

For example, the JSON output should look like:
{
  "intent": "This should be what you think the program SHOULD do.",
  "explanation": "Explanation of what went wrong and the changes being made",
  "files": [
    {
      "file_name": "{{ file_path }}",
      "changes": [
        {
          "action": "edit",
          "line_number": 2,
          "original_line": "print(hello world')",
          "new_line": "print('hello world')"
        }
      ]
    }
  ]
}
In the "action" field, use "add" for adding a line, "remove" for removing a line, and "edit" for editing a line.
Line numbers are 1-based. Edits are applied in order, so account for lines added or removed by earlier edits in the same file.
Reply with the JSON object only."#;

const TEMPLATE_NAME: &str = "repair";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt template {path}: {source}")]
    ReadTemplate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid prompt template: {0}")]
    Template(#[from] minijinja::Error),
}

/// Values available to the template
#[derive(Debug, Serialize)]
pub struct PromptContext<'a> {
    pub file_path: &'a str,
    pub code: &'a str,
    pub output: &'a str,
    pub intent: Option<&'a str>,
}

/// Renders the system instruction and user message for one repair request
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    /// Build with the given template source, checking its syntax up front
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        env.add_template_owned(TEMPLATE_NAME, template.into())?;

        Ok(Self { env })
    }

    /// Use the template at `path`, or the built-in one
    pub fn from_path(path: Option<&Path>) -> Result<Self, PromptError> {
        match path {
            Some(path) => {
                let template =
                    std::fs::read_to_string(path).map_err(|e| PromptError::ReadTemplate {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Self::new(template)
            }
            None => Self::new(DEFAULT_TEMPLATE),
        }
    }

    pub fn build(&self, ctx: &PromptContext<'_>) -> Result<BackendRequest, PromptError> {
        let prompt = self.env.get_template(TEMPLATE_NAME)?.render(ctx)?;
        Ok(BackendRequest::new(prompt).with_system_prompt(SYSTEM_PROMPT))
    }
}
