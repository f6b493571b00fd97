use super::{single_user_turn, ChatReply, ChatTransform};
use chatmesh_common::types::{ApiEndpoint, MessageEnvelope, BOT_TARGET};
use serde_json::{Map, Value};

/// OpenAI Chat Completions 形式（Mistral 等の互換APIにも使う）
pub struct OpenAiChat;

impl ChatTransform for OpenAiChat {
    fn id(&self) -> &'static str {
        "openai_chat"
    }

    fn vendor(&self) -> &'static str {
        BOT_TARGET
    }

    fn build_request(&self, envelope: &MessageEnvelope, endpoint: &ApiEndpoint) -> Value {
        let mut body = Map::new();
        for (key, value) in &endpoint.model_config {
            body.insert(key.clone(), value.clone());
        }
        body.insert("messages".to_string(), single_user_turn(envelope));
        Value::Object(body)
    }

    fn parse_response(&self, body: &Value) -> ChatReply {
        match body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        {
            Some(text) => ChatReply::success(self.vendor(), text),
            None => ChatReply::malformed(
                self.vendor(),
                "missing choices[0].message.content",
                body,
            ),
        }
    }
}
