/// 生成サービスのレスポンススキーマ。
use once_cell::sync::Lazy;
use serde_json::{Value, json};

/// `POST /v1/questions/generate` のレスポンス。
pub(crate) static GENERATED_QUESTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Generated True/False Question",
        "description": "One candidate daily-challenge question produced by the generation service",
        "type": "object",
        "properties": {
            "question_text": {
                "type": "string",
                "minLength": 1,
                "maxLength": 2000
            },
            "correct_answer": {
                "type": "boolean"
            },
            "explanation": {
                "type": "string",
                "minLength": 1,
                "maxLength": 4000
            },
            "confidence": {
                "type": "number",
                "minimum": 0,
                "maximum": 1
            }
        },
        "required": ["question_text", "correct_answer", "explanation", "confidence"]
    })
});
