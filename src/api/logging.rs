use super::error::DecodeError;
use crate::util::parse_bool_str;
use serde_json::Value;

const DEBUG_PAYLOAD_ENV: &str = "AGENTDECK_DEBUG_PAYLOAD";
const MAX_LOGGED_DATA_CHARS: usize = 2_000;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "agentdeck::api",
        url = request_url,
        payload = %formatted_payload,
        "payload_request"
    );
}

pub fn emit_decode_failure(chat_id: &str, event_type: &str, data: &str, error: &DecodeError) {
    tracing::warn!(
        target: "agentdeck::api",
        chat_id,
        event_type,
        ordinal = ?error.ordinal(),
        data = %truncate_for_log(data),
        "dropping undecodable stream event: {error}"
    );
}

fn truncate_for_log(data: &str) -> String {
    if data.chars().count() <= MAX_LOGGED_DATA_CHARS {
        return data.to_string();
    }
    let mut out: String = data.chars().take(MAX_LOGGED_DATA_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_payload_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_PAYLOAD_ENV, "1");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "TRUE");
        assert!(debug_payload_enabled());
        std::env::remove_var(DEBUG_PAYLOAD_ENV);
        assert!(!debug_payload_enabled());
    }

    #[test]
    fn test_truncate_for_log_caps_long_payloads() {
        let long = "x".repeat(MAX_LOGGED_DATA_CHARS + 10);
        let truncated = truncate_for_log(&long);
        assert_eq!(truncated.chars().count(), MAX_LOGGED_DATA_CHARS + 3);
        assert_eq!(truncate_for_log("short"), "short");
    }
}
