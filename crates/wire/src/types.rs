//! Payload types shared by more than one message kind.

use serde::{Deserialize, Serialize};

/// The closed, server-version-gated set of `execute` options.
///
/// Unknown keys in the client's JSON are silently ignored by `serde`'s default behavior
/// (we do not `deny_unknown_fields`) — this is deliberate: it is what lets
/// forward-compatible clients send options a newer protocol understands without the
/// current server rejecting the whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub dangerous_permissions: bool,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub mcp_config: Option<String>,
    #[serde(default)]
    pub append_system_prompt: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub add_dirs: Vec<String>,
    #[serde(default)]
    pub strict_mcp: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored_not_rejected() {
        let json = serde_json::json!({
            "model": "opus",
            "some_future_flag": true,
        });
        let options: ExecuteOptions = serde_json::from_value(json).expect("ignores unknown keys");
        assert_eq!(options.model.as_deref(), Some("opus"));
    }

    #[test]
    fn all_fields_default_when_absent() {
        let options: ExecuteOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(options, ExecuteOptions::default());
    }
}
