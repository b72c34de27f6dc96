//! Response bodies shaped like the OpenAI chat completion API.

use serde_json::{json, Value};

pub fn completion_json(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 12,
            "completion_tokens": content.split_whitespace().count(),
            "total_tokens": 12 + content.split_whitespace().count()
        }
    })
}

pub fn error_json(message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "code": "invalid_api_key"
        }
    })
}
