use super::{single_user_turn, ChatReply, ChatTransform};
use chatmesh_common::types::{ApiEndpoint, MessageEnvelope};
use serde_json::{json, Map, Value};

/// `max_tokens` 未指定時の上限
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// Anthropic Messages API 形式
pub struct AnthropicChat;

impl ChatTransform for AnthropicChat {
    fn id(&self) -> &'static str {
        "anthropic_chat"
    }

    fn vendor(&self) -> &'static str {
        "ANTHROPIC"
    }

    fn build_request(&self, envelope: &MessageEnvelope, endpoint: &ApiEndpoint) -> Value {
        let mut body: Map<String, Value> = endpoint
            .model_config
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        body.insert("messages".to_string(), single_user_turn(envelope));
        body.entry("max_tokens")
            .or_insert_with(|| json!(DEFAULT_MAX_TOKENS));
        Value::Object(body)
    }

    fn parse_response(&self, body: &Value) -> ChatReply {
        match body.pointer("/content/0/text").and_then(Value::as_str) {
            Some(text) => ChatReply::success(self.vendor(), text),
            None => ChatReply::malformed(
                self.vendor(),
                "missing content[0].text",
                body,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmesh_common::defaults::default_bot_endpoint;

    fn endpoint(model_config: Value) -> ApiEndpoint {
        ApiEndpoint {
            host: "api.anthropic.com".to_string(),
            path: "/v1/messages".to_string(),
            model_config: model_config.as_object().cloned().unwrap(),
            ..default_bot_endpoint()
        }
    }

    #[test]
    fn request_defaults_max_tokens() {
        let envelope = MessageEnvelope {
            message: "hi".to_string(),
            ..Default::default()
        };
        let body = AnthropicChat.build_request(
            &envelope,
            &endpoint(json!({"model": "claude-3-opus-20240229", "temperature": 0.2})),
        );

        assert_eq!(body["model"], json!("claude-3-opus-20240229"));
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["max_tokens"], json!(1024));
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
    }

    #[test]
    fn request_keeps_configured_max_tokens() {
        let body = AnthropicChat.build_request(
            &MessageEnvelope::default(),
            &endpoint(json!({"max_tokens": 300, "top_p": null})),
        );

        assert_eq!(body["max_tokens"], json!(300));
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn response_extracts_text_block() {
        let reply = AnthropicChat.parse_response(&json!({
            "content": [{"type": "text", "text": "Hello from Claude"}]
        }));

        assert!(reply.is_success());
        assert_eq!(reply.message, "Hello from Claude");
        assert_eq!(reply.from.as_deref(), Some("ANTHROPIC"));
    }

    #[test]
    fn response_without_content_is_error() {
        let reply = AnthropicChat.parse_response(&json!({"id": "msg_1"}));
        assert!(!reply.is_success());
        assert_eq!(reply.raw_response, Some(json!({"id": "msg_1"})));
    }
}
