use serde::{Deserialize, Serialize};

/// One photographic frame: opaque bytes plus the declared MIME type.
/// Immutable once captured; owned by a single session for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(data, "image/jpeg")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Tr,
    En,
}

impl Language {
    /// Language name as spelled inside the instruction template.
    pub fn instruction_name(&self) -> &'static str {
        match self {
            Language::En => "ENGLISH",
            Language::Tr => "TURKISH",
        }
    }
}

/// Optional user-supplied context for one scan, passed through to the model
/// unmodified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosisContext {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub plant_hint: Option<String>,
}

impl DiagnosisContext {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            plant_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.plant_hint = Some(hint.into());
        self
    }
}

/// A structurally validated diagnosis. Numeric scores are always in 0..=100
/// and `treatment_steps` is non-empty whenever `is_treatable` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub plant_name: String,
    pub plant_latin_name: String,
    pub disease_name: String,
    pub disease_latin_name: String,
    pub confidence: u8,
    pub urgency: u8,
    pub spread_risk: u8,
    pub is_treatable: bool,
    pub description: String,
    pub treatment_steps: Vec<String>,
    pub preventive_measures: Vec<String>,
}

/// Normalized result of one model round. Exactly one case is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Success(Diagnosis),
    #[serde(rename = "needs_details")]
    NeedsMoreDetail { message: String },
    #[serde(rename = "not_plant")]
    NotAPlant,
    TransientFailure { cause: String },
    FatalFailure { cause: String },
}

impl ModelOutcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelOutcome::TransientFailure { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ModelOutcome::Success(_))
    }
}
