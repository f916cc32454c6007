//! Repair loop configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the target is run and how long the loop keeps trying
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Interpreter used to run the target (`<interpreter> <target>`)
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Substring of the captured output that marks a failed run
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,

    /// Patch requests made before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Extra requests allowed when the model returns an unparseable patch
    #[serde(default = "default_malformed_retries")]
    pub malformed_retries: u32,

    /// Custom minijinja template for the user message
    pub prompt_template: Option<PathBuf>,
}

fn default_interpreter() -> String {
    "python3".into()
}

fn default_failure_marker() -> String {
    "Traceback".into()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_malformed_retries() -> u32 {
    2
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            failure_marker: default_failure_marker(),
            max_attempts: default_max_attempts(),
            malformed_retries: default_malformed_retries(),
            prompt_template: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RepairConfig = toml::from_str("").unwrap();
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.failure_marker, "Traceback");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.malformed_retries, 2);
        assert!(config.prompt_template.is_none());
    }

    #[test]
    fn test_node_target() {
        let toml = r#"
            interpreter = "node"
            failure_marker = "Error:"
            max_attempts = 3
        "#;
        let config: RepairConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.interpreter, "node");
        assert_eq!(config.failure_marker, "Error:");
        assert_eq!(config.max_attempts, 3);
    }
}
