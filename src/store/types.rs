use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diagnosis::Diagnosis;

/// A finalized diagnosis a user chose to keep: the outcome, the originating
/// images, and an ordered trail of follow-up updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAnalysis {
    pub id: String,
    pub user_id: String,
    pub plant_type: Option<String>,
    /// Base64 payload as captured by the client.
    pub main_image: String,
    pub macro_image: Option<String>,
    pub diagnosis: Diagnosis,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updates: Vec<AnalysisUpdate>,
}

/// Follow-up entry appended after the session ended: a note and optionally a
/// fresh photo of the same plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisUpdate {
    pub note: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Community feed entry, possibly derived from a saved analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub plant_type: Option<String>,
    pub likes: Vec<String>,
    pub comments: Vec<Comment>,
    pub related_analysis_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(user_id: String, user_name: String, text: String) -> Self {
        Self {
            user_id,
            user_name,
            text,
            created_at: Utc::now(),
        }
    }
}

impl Post {
    /// Composes the shareable feed entry for a finished analysis: treatment
    /// steps when the condition is treatable, preventive measures otherwise.
    pub fn from_analysis(analysis: &SavedAnalysis, author_name: &str) -> Self {
        let diagnosis = &analysis.diagnosis;
        let plant = analysis
            .plant_type
            .clone()
            .unwrap_or_else(|| diagnosis.plant_name.clone());

        let mut content = format!("{}\n\n{}", diagnosis.disease_name, diagnosis.description);
        let (heading, steps) = if diagnosis.is_treatable {
            ("Treatment steps", &diagnosis.treatment_steps)
        } else {
            ("Preventive measures", &diagnosis.preventive_measures)
        };
        if !steps.is_empty() {
            content.push_str(&format!("\n\n{heading}:\n"));
            let lines: Vec<String> = steps.iter().map(|step| format!("- {step}")).collect();
            content.push_str(&lines.join("\n"));
        }

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: analysis.user_id.clone(),
            author_name: author_name.to_string(),
            title: format!("{} - {}", plant, diagnosis.disease_name),
            content,
            image: Some(analysis.main_image.clone()),
            plant_type: analysis.plant_type.clone(),
            likes: Vec::new(),
            comments: Vec::new(),
            related_analysis_id: Some(analysis.id.clone()),
            created_at: Utc::now(),
        }
    }
}
