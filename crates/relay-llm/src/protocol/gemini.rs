//! Gemini-style wire types shared by the direct and cloud backends.
//!
//! - Messages are called "contents"
//! - Role is "user" or "model"
//! - Content is an array of "parts"
//! - System instructions are separate from messages
//!
//! # Example Request
//! ```json
//! {
//!   "contents": [
//!     { "role": "user", "parts": [{"text": "Hello"}] }
//!   ],
//!   "systemInstruction": { "parts": [{"text": "You are helpful"}] },
//!   "generationConfig": { "maxOutputTokens": 1024 }
//! }
//! ```

use relay_core::{Author, ContentPart, Message, MessageContent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::{ProtocolError, ProtocolResult, ToProvider};
use crate::types::{CompletionRequest, GenerationParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    /// "user" or "model"; absent on system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GeminiBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<GeminiFileData>,
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            max_output_tokens: params.max_output_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }
}

/// Non-streamed response body (also the shape of each streamed event).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<Map<String, Value>>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

fn check_part(part: &ContentPart) -> ProtocolResult<()> {
    let (mime_type, reason) = match part {
        ContentPart::InlineData { mime_type, data } if data.is_empty() => (mime_type, "inline data is empty"),
        ContentPart::FileData { mime_type, file_uri } if file_uri.is_empty() => (mime_type, "file_uri is empty"),
        _ => return Ok(()),
    };
    Err(ProtocolError::InvalidPart {
        mime_type: mime_type.clone(),
        reason: reason.to_string(),
    })
}

/// Check that a request converts cleanly without building the payload.
pub fn validate_request(request: &CompletionRequest) -> ProtocolResult<()> {
    if request.messages.is_empty() {
        return Err(ProtocolError::EmptyConversation);
    }

    request
        .messages
        .iter()
        .filter_map(|message| match &message.content {
            MessageContent::Parts(parts) => Some(parts),
            MessageContent::Text(_) => None,
        })
        .flatten()
        .try_for_each(check_part)
}

impl ToProvider<GeminiPart> for ContentPart {
    fn to_provider(&self) -> ProtocolResult<GeminiPart> {
        check_part(self)?;
        Ok(match self {
            ContentPart::Text { text } => GeminiPart::text(text.clone()),
            ContentPart::InlineData { mime_type, data } => {
                GeminiPart {
                    inline_data: Some(GeminiBlob {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }),
                    ..GeminiPart::default()
                }
            }
            ContentPart::FileData {
                mime_type,
                file_uri,
            } => {
                GeminiPart {
                    file_data: Some(GeminiFileData {
                        mime_type: mime_type.clone(),
                        file_uri: file_uri.clone(),
                    }),
                    ..GeminiPart::default()
                }
            }
        })
    }
}

impl ToProvider<GeminiContent> for Message {
    fn to_provider(&self) -> ProtocolResult<GeminiContent> {
        let role = match self.author {
            Author::User => "user",
            Author::Model => "model",
        };

        let parts = match &self.content {
            MessageContent::Text(text) => vec![GeminiPart::text(text.clone())],
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| part.to_provider())
                .collect::<ProtocolResult<Vec<GeminiPart>>>()?,
        };

        Ok(GeminiContent {
            role: Some(role.to_string()),
            parts,
        })
    }
}

/// Convert a message list, merging consecutive same-role messages so the
/// contents strictly alternate between user and model.
pub fn to_contents(messages: &[Message]) -> ProtocolResult<Vec<GeminiContent>> {
    let mut contents: Vec<GeminiContent> = Vec::new();

    for message in messages {
        let content: GeminiContent = message.to_provider()?;
        match contents.last_mut() {
            Some(last) if last.role == content.role => last.parts.extend(content.parts),
            _ => contents.push(content),
        }
    }

    Ok(contents)
}

impl ToProvider<GeminiRequest> for CompletionRequest {
    fn to_provider(&self) -> ProtocolResult<GeminiRequest> {
        validate_request(self)?;

        let generation_config = GenerationConfig::from(&self.generation);
        Ok(GeminiRequest {
            contents: to_contents(&self.messages)?,
            system_instruction: self
                .system_instruction
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| GeminiContent::text(None, s)),
            generation_config: (generation_config != GenerationConfig::default())
                .then_some(generation_config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let request = GeminiRequest {
            contents: vec![GeminiContent::text(Some("user"), "Hello")],
            system_instruction: Some(GeminiContent::text(None, "Be brief")),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(256),
                ..GenerationConfig::default()
            }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
        assert!(json["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn attachments_become_data_parts() {
        let message = Message::user(MessageContent::Parts(vec![
            ContentPart::Text {
                text: "what is this?".to_string(),
            },
            ContentPart::FileData {
                mime_type: "application/pdf".to_string(),
                file_uri: "gs://bucket/doc.pdf".to_string(),
            },
        ]));

        let content: GeminiContent = message.to_provider().unwrap();
        assert_eq!(content.parts.len(), 2);
        assert_eq!(
            content.parts[1].file_data.as_ref().unwrap().file_uri,
            "gs://bucket/doc.pdf"
        );
    }

    #[test]
    fn empty_inline_data_is_rejected() {
        let message = Message::user(MessageContent::Parts(vec![ContentPart::InlineData {
            mime_type: "image/png".to_string(),
            data: String::new(),
        }]));

        let result: ProtocolResult<GeminiContent> = message.to_provider();
        assert!(matches!(result, Err(ProtocolError::InvalidPart { .. })));
    }

    #[test]
    fn consecutive_roles_are_merged() {
        let messages = vec![
            Message::user("one"),
            Message::user("two"),
            Message::model("three"),
        ];

        let contents = to_contents(&messages).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].parts.len(), 2);
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"world"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2}}"#,
        )
        .unwrap();

        assert_eq!(response.text(), "Hello world");
        assert_eq!(response.usage_metadata.unwrap()["promptTokenCount"], 3);
    }

    #[test]
    fn completion_request_maps_to_payload() {
        let request = CompletionRequest::new(vec![Message::user("hi")])
            .with_system_instruction("  be brief ")
            .with_generation(GenerationParams {
                max_output_tokens: Some(512),
                ..GenerationParams::default()
            });

        let payload: GeminiRequest = request.to_provider().unwrap();
        assert_eq!(payload.contents.len(), 1);
        assert_eq!(
            payload.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("be brief")
        );
        assert_eq!(payload.generation_config.unwrap().max_output_tokens, Some(512));

        let bare: GeminiRequest = CompletionRequest::new(vec![Message::user("hi")])
            .to_provider()
            .unwrap();
        assert!(bare.generation_config.is_none());
        assert!(bare.system_instruction.is_none());
    }

    #[test]
    fn validation_matches_conversion() {
        let valid = CompletionRequest::new(vec![Message::user("hi")]);
        assert!(validate_request(&valid).is_ok());

        let bad_file = CompletionRequest::new(vec![
            Message::user("see attached"),
            Message::user(MessageContent::Parts(vec![ContentPart::FileData {
                mime_type: "application/pdf".to_string(),
                file_uri: String::new(),
            }])),
        ]);
        let expected = ProtocolError::InvalidPart {
            mime_type: "application/pdf".to_string(),
            reason: "file_uri is empty".to_string(),
        };
        assert_eq!(validate_request(&bad_file).unwrap_err(), expected);
        let converted: ProtocolResult<GeminiRequest> = bad_file.to_provider();
        assert_eq!(converted.unwrap_err(), expected);

        assert_eq!(
            validate_request(&CompletionRequest::new(Vec::new())).unwrap_err(),
            ProtocolError::EmptyConversation
        );
    }

    #[test]
    fn empty_request_is_rejected() {
        let result: ProtocolResult<GeminiRequest> = CompletionRequest::new(Vec::new()).to_provider();
        assert_eq!(result.unwrap_err(), ProtocolError::EmptyConversation);
    }
}
