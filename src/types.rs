use serde::{Deserialize, Serialize};

/// One grading request: a snippet, the answer it should print, and any input
/// to feed it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code of the snippet to run
    pub code: String,
    /// Text the trimmed final output should match
    pub expected: String,
    /// Text served as the snippet's standard input
    #[serde(default)]
    pub stdin_data: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            expected: expected.into(),
            stdin_data: String::new(),
        }
    }

    pub fn with_stdin(mut self, stdin_data: impl Into<String>) -> Self {
        self.stdin_data = stdin_data.into();
        self
    }
}

/// Grading verdict returned to the host UI. The three field names are the
/// contract surface the host depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the output matched the expected answer
    pub ok: bool,
    /// Raw captured stdout, untrimmed
    pub output: String,
    /// Short diagnostic when execution failed, empty otherwise
    pub error: String,
}

impl ExecutionResult {
    pub(crate) fn passed(ok: bool, output: String) -> Self {
        Self {
            ok,
            output,
            error: String::new(),
        }
    }

    pub(crate) fn failed(output: String, error: String) -> Self {
        debug_assert!(!error.is_empty());
        Self {
            ok: false,
            output,
            error,
        }
    }
}
