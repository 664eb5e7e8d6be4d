use serde::{Deserialize, Serialize};

use crate::{ChatMessage, Role};

/// Default base URL of the hosted generative-language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model used for portfolio chat.
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Returned when the upstream succeeds but carries no candidate text.
pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm having trouble responding right now. Please try again!";

// -- Gemini request types ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// The four content-safety categories the relay always sends, each blocked at
/// medium probability and above.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    pub system_instruction: GeminiSystemInstruction,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    /// Build the outbound request for a conversation and its system prompt.
    pub fn from_conversation(messages: &[ChatMessage], context: &str) -> Self {
        let contents = messages
            .iter()
            .map(|msg| GeminiContent {
                role: gemini_role(msg.role).to_string(),
                parts: vec![GeminiPart { text: msg.content.clone() }],
            })
            .collect();

        Self {
            contents,
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart { text: context.to_string() }],
            },
            generation_config: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }
}

/// Map the chat vocabulary onto the roles Gemini accepts.
pub fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

// -- Gemini response types --------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeminiResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponseContent {
    #[serde(default)]
    pub parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiResponseContent>,
    #[allow(dead_code)]
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

impl GenerateContentResponse {
    /// Text of the first candidate's first part. Empty text counts as none.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
            .filter(|t| !t.is_empty())
    }
}

/// Full `generateContent` URL for `model`, without the credential.
pub fn generate_content_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_role_mapping() {
        assert_eq!(gemini_role(Role::User), "user");
        assert_eq!(gemini_role(Role::Assistant), "model");
    }

    #[test]
    fn test_request_uses_camel_case_keys() {
        let req = GenerateContentRequest::from_conversation(
            &[ChatMessage::user("Hi")],
            "You are a helpful assistant.",
        );
        let v = serde_json::to_value(&req).expect("serialize");
        assert!(v.get("systemInstruction").is_some());
        assert_eq!(v["generationConfig"]["topK"], 40);
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 500);
        assert_eq!(v["safetySettings"].as_array().map(|a| a.len()), Some(4));
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "Hi");
        assert_eq!(
            v["systemInstruction"]["parts"][0]["text"],
            "You are a helpful assistant."
        );
    }

    #[test]
    fn test_request_maps_assistant_to_model() {
        let req = GenerateContentRequest::from_conversation(
            &[ChatMessage::assistant("Hey!"), ChatMessage::user("Who are you?")],
            "",
        );
        assert_eq!(req.contents[0].role, "model");
        assert_eq!(req.contents[1].role, "user");
    }

    #[test]
    fn test_generation_config_defaults() {
        let cfg = GenerationConfig::default();
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
        assert!((cfg.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(cfg.top_k, 40);
        assert_eq!(cfg.max_output_tokens, 500);
    }

    #[test]
    fn test_safety_settings_all_block_medium() {
        let settings = default_safety_settings();
        assert!(settings.iter().all(|s| s.threshold == "BLOCK_MEDIUM_AND_ABOVE"));
        assert!(settings.iter().any(|s| s.category == "HARM_CATEGORY_HATE_SPEECH"));
    }

    #[test]
    fn test_first_text_extracts_first_part() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Hello!"},{"text":"ignored"}],"role":"model"},"finishReason":"STOP"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.first_text(), Some("Hello!"));
    }

    #[test]
    fn test_first_text_none_without_candidates() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").expect("parse");
        assert_eq!(resp.first_text(), None);
    }

    #[test]
    fn test_first_text_none_when_blocked() {
        // Safety-blocked candidates come back without content.
        let json = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.first_text(), None);
    }

    #[test]
    fn test_first_text_none_when_empty() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":""}],"role":"model"}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.first_text(), None);
    }

    #[test]
    fn test_generate_content_url() {
        assert_eq!(
            generate_content_url("https://example.test/", "gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
