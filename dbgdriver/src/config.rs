/// Driver configuration
///
/// Settings are plain serde data so they can be read from a JSON file and
/// overridden from the command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::DEFAULT_OUTPUT_CAPACITY;
use crate::parser::{PatternPrompt, PromptRecognizer, TrailingPrompt};

/// Invocation used when no command line is given
pub const DEFAULT_DEBUGGER_COMMAND: &str = "gdb --fullname --nx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid prompt pattern: {0}")]
    InvalidPrompt(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How the debugger prompt is recognized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PromptConfig {
    /// The output ends with `marker`
    Trailing { marker: String },
    /// First match of `regex`
    Pattern { regex: String },
}

impl Default for PromptConfig {
    fn default() -> Self {
        PromptConfig::Trailing {
            marker: "(gdb) ".to_string(),
        }
    }
}

impl PromptConfig {
    /// Build the recognizer described by this configuration
    pub fn recognizer(&self) -> Result<Box<dyn PromptRecognizer>> {
        let recognizer: Box<dyn PromptRecognizer> = match self {
            PromptConfig::Trailing { marker } => Box::new(TrailingPrompt::new(marker.as_bytes())),
            PromptConfig::Pattern { regex } => Box::new(PatternPrompt::new(regex)?),
        };
        Ok(recognizer)
    }
}

/// Settings of one debugger session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Command line started when `startup` gets none
    pub debugger_command: String,
    /// Where to mirror the conversation, if anywhere
    pub transcript: Option<PathBuf>,
    pub prompt: PromptConfig,
    /// Initial size of the output buffer in bytes
    pub output_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            debugger_command: DEFAULT_DEBUGGER_COMMAND.to_string(),
            transcript: None,
            prompt: PromptConfig::default(),
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DriverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading driver configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the parts that only fail when used
    pub fn validate(&self) -> Result<()> {
        self.prompt.recognizer().map(|_| ())
    }

    /// The command line to start, preferring `requested` unless it is blank
    pub fn command_line<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(cmd) if !cmd.trim().is_empty() => cmd,
            _ => &self.debugger_command,
        }
    }
}
