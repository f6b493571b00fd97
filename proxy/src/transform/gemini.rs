use super::{ChatReply, ChatTransform};
use chatmesh_common::types::{ApiEndpoint, MessageEnvelope};
use serde_json::{json, Map, Value};

/// Google Gemini generateContent 形式
pub struct GeminiChat;

impl ChatTransform for GeminiChat {
    fn id(&self) -> &'static str {
        "gemini_chat"
    }

    fn vendor(&self) -> &'static str {
        "GEMINI"
    }

    fn build_request(&self, envelope: &MessageEnvelope, endpoint: &ApiEndpoint) -> Value {
        // モデルはパスで指定するため generationConfig には含めない
        let generation_config: Map<String, Value> = endpoint
            .model_config
            .iter()
            .filter(|(key, value)| key.as_str() != "model" && !value.is_null())
            .map(|(key, value)| (snake_to_camel(key), value.clone()))
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": envelope.message}]
            }],
            "generationConfig": generation_config
        })
    }

    fn parse_response(&self, body: &Value) -> ChatReply {
        match body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            Some(text) => ChatReply::success(self.vendor(), text),
            None => ChatReply::malformed(
                self.vendor(),
                "missing candidates[0].content.parts[0].text",
                body,
            ),
        }
    }
}

/// `max_output_tokens` → `maxOutputTokens`
fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = !out.is_empty();
            continue;
        }
        if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmesh_common::defaults::default_bot_endpoint;

    #[test]
    fn converts_snake_case_keys() {
        assert_eq!(snake_to_camel("max_output_tokens"), "maxOutputTokens");
        assert_eq!(snake_to_camel("top_k"), "topK");
        assert_eq!(snake_to_camel("temperature"), "temperature");
        assert_eq!(snake_to_camel("topP"), "topP");
    }

    #[test]
    fn request_builds_generation_config() {
        let endpoint = ApiEndpoint {
            model_config: json!({
                "temperature": 0.7,
                "top_p": 1,
                "top_k": 40,
                "max_output_tokens": 2048,
                "candidate_count": null
            })
            .as_object()
            .cloned()
            .unwrap(),
            ..default_bot_endpoint()
        };
        let envelope = MessageEnvelope {
            message: "hi".to_string(),
            ..Default::default()
        };

        let body = GeminiChat.build_request(&envelope, &endpoint);
        assert_eq!(
            body["contents"],
            json!([{"role": "user", "parts": [{"text": "hi"}]}])
        );
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.7, "topP": 1, "topK": 40, "maxOutputTokens": 2048})
        );
    }

    #[test]
    fn response_extracts_candidate_text() {
        let reply = GeminiChat.parse_response(&json!({
            "candidates": [{"content": {"parts": [{"text": "Bonjour"}], "role": "model"}}]
        }));

        assert!(reply.is_success());
        assert_eq!(reply.message, "Bonjour");
        assert_eq!(reply.from.as_deref(), Some("GEMINI"));
    }
}
