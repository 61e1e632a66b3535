//! Builds the fixed-order argument list passed to the agent CLI.

use tether_wire::ExecuteOptions;

/// Build the argument vector for one execution. `session_id` is `Some` when the project
/// has a prior session to continue.
pub fn build_args(session_id: Option<&str>, cwd: &str, options: &ExecuteOptions, prompt: &str) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(session_id) = session_id {
        args.push("--continue".to_string());
        args.push(session_id.to_string());
    }
    args.push("--cwd".to_string());
    args.push(cwd.to_string());

    if options.dangerous_permissions {
        args.push("--dangerously-skip-permissions".to_string());
    }
    for tool in &options.allowed_tools {
        args.push("--allowed-tool".to_string());
        args.push(tool.clone());
    }
    for tool in &options.disallowed_tools {
        args.push("--disallowed-tool".to_string());
        args.push(tool.clone());
    }
    if let Some(mcp_config) = &options.mcp_config {
        args.push("--mcp-config".to_string());
        args.push(mcp_config.clone());
    }
    if let Some(append) = &options.append_system_prompt {
        args.push("--append-system-prompt".to_string());
        args.push(append.clone());
    }
    if let Some(mode) = &options.permission_mode {
        args.push("--permission-mode".to_string());
        args.push(mode.clone());
    }
    if let Some(model) = &options.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(fallback) = &options.fallback_model {
        args.push("--fallback-model".to_string());
        args.push(fallback.clone());
    }
    for dir in &options.add_dirs {
        args.push("--add-dir".to_string());
        args.push(dir.clone());
    }
    if options.strict_mcp {
        args.push("--strict-mcp-config".to_string());
    }

    args.push(prompt.to_string());
    args
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
