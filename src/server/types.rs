use serde::{Deserialize, Serialize};

use crate::diagnosis::{Diagnosis, Language, ModelOutcome};

#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    /// Absent on the first frame; echoes the issued id on the macro frame.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub plant_type: Option<String>,
    /// Base64 image payload, with or without a data-URL prefix.
    pub image: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Debug, Serialize)]
pub struct DiagnoseResponse {
    pub session_id: String,
    pub phase: &'static str,
    pub outcome: ModelOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnalysisRequest {
    pub user_id: String,
    #[serde(default)]
    pub plant_type: Option<String>,
    pub main_image: String,
    #[serde(default)]
    pub macro_image: Option<String>,
    pub diagnosis: Diagnosis,
}

#[derive(Debug, Serialize)]
pub struct SaveAnalysisResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct AppendUpdateRequest {
    pub note: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default = "default_author_name")]
    pub author_name: String,
}

fn default_author_name() -> String {
    "Gardener".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub user_id: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub plant_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct LikesResponse {
    pub likes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
