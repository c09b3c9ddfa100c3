/// Prompt detection
///
/// The driver knows a command is finished when the debugger prints its
/// prompt again. Each debugger dialect recognizes its prompt differently,
/// so detection goes through the [`PromptRecognizer`] trait.

use regex::bytes::Regex;

/// Finds the debugger prompt in accumulated output
pub trait PromptRecognizer: Send {
    /// Byte offset where the prompt starts, or `None` if it is not there yet
    fn find_prompt(&self, output: &[u8]) -> Option<usize>;
}

impl<F> PromptRecognizer for F
where
    F: Fn(&[u8]) -> Option<usize> + Send,
{
    fn find_prompt(&self, output: &[u8]) -> Option<usize> {
        self(output)
    }
}

/// A prompt that must sit at the very end of the output
///
/// This is how a line-oriented gdb behaves: after answering a command it
/// prints the prompt and waits, so nothing can follow it.
#[derive(Debug, Clone)]
pub struct TrailingPrompt {
    marker: Vec<u8>,
}

impl TrailingPrompt {
    pub fn new(marker: impl Into<Vec<u8>>) -> Self {
        Self { marker: marker.into() }
    }

    /// The stock gdb prompt, `"(gdb) "`
    pub fn gdb() -> Self {
        Self::new("(gdb) ")
    }

    pub fn marker(&self) -> &[u8] {
        &self.marker
    }
}

impl PromptRecognizer for TrailingPrompt {
    fn find_prompt(&self, output: &[u8]) -> Option<usize> {
        if !self.marker.is_empty() && output.ends_with(&self.marker) {
            Some(output.len() - self.marker.len())
        } else {
            None
        }
    }
}

/// A prompt matched by a regular expression anywhere in the output
///
/// The first match wins. Anchor the pattern with `(?m)^` to only accept
/// prompts at the start of a line.
#[derive(Debug, Clone)]
pub struct PatternPrompt {
    regex: Regex,
}

impl PatternPrompt {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl PromptRecognizer for PatternPrompt {
    fn find_prompt(&self, output: &[u8]) -> Option<usize> {
        self.regex.find(output).map(|m| m.start())
    }
}
