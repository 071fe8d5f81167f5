//! Runtime tool path resolution.
//!
//! External binaries are resolved through an environment-variable override:
//! `{TOOL}_BIN` (uppercase tool name + `_BIN`) wins, otherwise the bare tool
//! name is used and PATH lookup applies. This keeps CI images free to pin
//! exact binaries while local development just uses whatever is installed.

use std::env;

/// Get the path to an external tool, honoring the `{TOOL}_BIN` override.
pub fn get_tool_path(tool: &str) -> String {
    let env_var = format!("{}_BIN", tool.to_uppercase());
    env::var(&env_var).unwrap_or_else(|_| tool.to_string())
}
