use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::diagnosis::ImageInput;

/// Wire payload for one generateContent call. Both transports send the exact
/// same body; only the endpoint differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "safetySettings")]
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateRequest {
    /// Single-turn request carrying the given parts and the standard safety
    /// settings.
    pub fn single_turn(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { parts }],
            safety_settings: default_safety_settings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_image(image: &ImageInput) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64.encode(&image.data),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_LOW_AND_ABOVE"),
        ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_MEDIUM_AND_ABOVE"),
        ("HARM_CATEGORY_HARASSMENT", "BLOCK_MEDIUM_AND_ABOVE"),
        ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_MEDIUM_AND_ABOVE"),
    ]
    .into_iter()
    .map(|(category, threshold)| SafetySetting {
        category: category.to_string(),
        threshold: threshold.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn image_parts_are_base64_inline_data() {
        let image = ImageInput::new(vec![1, 2, 3], "image/png");
        let request = GenerateRequest::single_turn(vec![
            Part::text("describe the plant"),
            Part::inline_image(&image),
        ]);

        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "describe the plant");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
    }
}
