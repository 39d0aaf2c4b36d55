//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_match_interval_secs() -> u64 {
    3
}

pub fn default_sweep_interval_secs() -> u64 {
    600
}

// =============================================================================
// Matching Defaults
// =============================================================================

pub fn default_tag_rotation() -> Vec<String> {
    vec!["A".to_string(), "B".to_string(), "C".to_string()]
}

pub fn default_solo_tag() -> String {
    "C".to_string()
}

pub fn default_pair_tags() -> [String; 2] {
    ["A".to_string(), "B".to_string()]
}

pub fn default_solo_wait_secs() -> u64 {
    60
}

pub fn default_session_create_attempts() -> u32 {
    2
}

// =============================================================================
// Session Defaults
// =============================================================================

pub fn default_name_pool() -> Vec<String> {
    ["Player A", "Player B", "Player C", "Player D", "Player E"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_max_slots() -> usize {
    5
}

// =============================================================================
// Responder Defaults
// =============================================================================

pub fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

pub fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_max_tokens() -> u32 {
    150
}

pub fn default_temperature() -> f32 {
    0.7
}

pub fn default_responder_timeout_secs() -> u64 {
    10
}

pub fn default_fallback_message() -> String {
    "Sorry, I couldn't come up with a reply.".to_string()
}

// =============================================================================
// Storage / Retention Defaults
// =============================================================================

pub fn default_storage_path() -> String {
    "parleyd.redb".to_string()
}

pub fn default_match_ttl_secs() -> u64 {
    86_400
}
