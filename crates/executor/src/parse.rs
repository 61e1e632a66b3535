//! Extracts the single JSON object the agent CLI prints on stdout.

use crate::error::ExecutorError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AgentOutput {
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct ParsedOutput {
    pub session_id: Option<String>,
    pub messages: Vec<serde_json::Value>,
}

/// Locate the first `{` and its matching last `}` in `stdout`, tolerating banner text
/// before or after, and parse the enclosed object. `stderr` is only used to build the
/// error when stdout holds nothing usable.
pub fn parse_agent_output(stdout: &[u8], stderr: &[u8]) -> Result<ParsedOutput, ExecutorError> {
    let stdout = String::from_utf8_lossy(stdout);
    let object = extract_json_object(&stdout).ok_or_else(|| stderr_failure(stderr))?;

    let parsed: AgentOutput =
        serde_json::from_str(object).map_err(|_| stderr_failure(stderr))?;

    if let Some(message) = parsed.error.filter(|e| !e.is_empty()) {
        let details = Some(serde_json::json!({ "error": message }));
        return Err(ExecutorError::ExecutionFailed { message, details });
    }

    Ok(ParsedOutput { session_id: parsed.session_id, messages: parsed.messages })
}

fn stderr_failure(stderr: &[u8]) -> ExecutorError {
    let text = String::from_utf8_lossy(stderr);
    let truncated: String = text.chars().take(1024).collect();
    ExecutorError::ExecutionFailed {
        message: "agent produced no usable output".to_string(),
        details: Some(serde_json::json!({ "stderr": truncated })),
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
