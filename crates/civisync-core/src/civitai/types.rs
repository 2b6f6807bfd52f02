//! Typed shapes of the Civitai API responses.
//!
//! Only the fields the engine actually reads are typed; everything else is
//! preserved verbatim through a flattened map so persisted records keep the
//! full payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One preview image (or video) attached to a model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionImage {
    pub url: String,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VersionImage {
    pub fn is_video(&self) -> bool {
        self.media_type.as_deref() == Some("video")
    }
}

/// Response of the model-versions/by-hash lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub id: u64,
    #[serde(rename = "modelId")]
    pub model_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
    /// Compared verbatim for staleness; never parsed into a datetime so the
    /// comparison is exactly the service's own representation.
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub images: Vec<VersionImage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of the models/{id} lookup; structural pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_JSON: &str = r#"{
        "id": 128713,
        "modelId": 112902,
        "name": "v2.0",
        "createdAt": "2023-07-28T19:59:01.855Z",
        "updatedAt": "2023-08-01T10:00:00.000Z",
        "baseModel": "SDXL 1.0",
        "trainedWords": ["zoomed out"],
        "images": [
            {"url": "https://image.civitai.com/xG1n/width=450/1.jpeg", "nsfw": false,
             "width": 450, "height": 640, "hash": "UBCP", "type": "image"},
            {"url": "https://image.civitai.com/xG1n/width=450/2.mp4", "type": "video"}
        ]
    }"#;

    #[test]
    fn test_version_deserialize() {
        let version: VersionResponse = serde_json::from_str(VERSION_JSON).unwrap();
        assert_eq!(version.id, 128713);
        assert_eq!(version.model_id, 112902);
        assert_eq!(version.updated_at.as_deref(), Some("2023-08-01T10:00:00.000Z"));
        assert_eq!(version.images.len(), 2);
        assert!(!version.images[0].is_video());
        assert!(version.images[1].is_video());
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let version: VersionResponse = serde_json::from_str(VERSION_JSON).unwrap();
        assert_eq!(
            version.extra.get("baseModel").and_then(Value::as_str),
            Some("SDXL 1.0")
        );

        let reserialized = serde_json::to_value(&version).unwrap();
        assert_eq!(reserialized["baseModel"], "SDXL 1.0");
        assert_eq!(reserialized["trainedWords"][0], "zoomed out");
    }

    #[test]
    fn test_model_passthrough() {
        let model: ModelResponse = serde_json::from_str(
            r#"{"id": 7, "name": "thing", "type": "LORA", "nsfw": false, "tags": ["style"]}"#,
        )
        .unwrap();
        assert_eq!(model.id, 7);
        assert_eq!(model.model_type.as_deref(), Some("LORA"));
        let back = serde_json::to_value(&model).unwrap();
        assert_eq!(back["tags"][0], "style");
    }

    #[test]
    fn test_missing_optional_fields() {
        let version: VersionResponse =
            serde_json::from_str(r#"{"id": 1, "modelId": 2}"#).unwrap();
        assert!(version.updated_at.is_none());
        assert!(version.images.is_empty());
    }
}
