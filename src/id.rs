//! ID generation utilities for agentmesh
//!
//! Provides functions for generating identifiers for agents, bus messages, and tool calls.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate an agent ID from its type
///
/// Format: `{agent_type}_{random_hex8}`
/// Example: `engineering_1a2b3c4d`
pub fn generate_agent_id(agent_type: &str) -> String {
    let random: u32 = rand::rng().random();
    format!("{}_{:08x}", agent_type, random)
}

/// Generate a bus message ID
///
/// Format: 12 lowercase hex characters
pub fn generate_message_id() -> String {
    let random: u64 = rand::rng().random();
    format!("{:012x}", random & 0xffff_ffff_ffff)
}

/// Generate a tool call ID for a given iteration
///
/// Format: `call-{iteration}-{random_hex}`
pub fn generate_call_id(iteration: u32) -> String {
    let random: u16 = rand::rng().random();
    format!("call-{}-{:04x}", iteration, random)
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
