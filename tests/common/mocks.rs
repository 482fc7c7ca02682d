use async_trait::async_trait;
use phytoscan::diagnosis::{
    Analyzer, Diagnosis, DiagnosisContext, ImageInput, Language, ModelOutcome,
};
use phytoscan::model::Moderator;
use std::sync::Mutex;

/// What one analysis round received, for asserting on protocol behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRound {
    pub image_count: usize,
    pub language: Language,
    pub plant_hint: Option<String>,
}

/// Scripted analyzer: pops outcomes in order and records every round.
pub struct ScriptedAnalyzer {
    outcomes: Mutex<Vec<ModelOutcome>>,
    rounds: Mutex<Vec<RecordedRound>>,
}

impl ScriptedAnalyzer {
    pub fn new(outcomes: Vec<ModelOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            rounds: Mutex::new(Vec::new()),
        }
    }

    pub fn rounds(&self) -> Vec<RecordedRound> {
        self.rounds.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, images: &[ImageInput], context: &DiagnosisContext) -> ModelOutcome {
        self.rounds.lock().unwrap().push(RecordedRound {
            image_count: images.len(),
            language: context.language,
            plant_hint: context.plant_hint.clone(),
        });

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return ModelOutcome::FatalFailure {
                cause: "no more scripted outcomes".to_string(),
            };
        }
        outcomes.remove(0)
    }
}

/// Moderator with a fixed verdict.
pub struct FixedModerator {
    verdict: bool,
    calls: Mutex<Vec<String>>,
}

impl FixedModerator {
    pub fn allowing() -> Self {
        Self {
            verdict: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn blocking() -> Self {
        Self {
            verdict: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn moderated_texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Moderator for FixedModerator {
    async fn check_safety(&self, text: &str, _image: Option<&ImageInput>) -> bool {
        self.calls.lock().unwrap().push(text.to_string());
        self.verdict
    }
}

pub fn sample_diagnosis() -> Diagnosis {
    Diagnosis {
        plant_name: "Tomato".to_string(),
        plant_latin_name: "Solanum lycopersicum".to_string(),
        disease_name: "Leaf Spot".to_string(),
        disease_latin_name: "Septoria lycopersici".to_string(),
        confidence: 92,
        urgency: 60,
        spread_risk: 45,
        is_treatable: true,
        description: "Dark circular lesions on the lower leaves.".to_string(),
        treatment_steps: vec![
            "Remove affected leaves".to_string(),
            "Apply copper fungicide".to_string(),
        ],
        preventive_measures: vec!["Water at the base".to_string()],
    }
}

pub fn success() -> ModelOutcome {
    ModelOutcome::Success(sample_diagnosis())
}

pub fn needs_detail() -> ModelOutcome {
    ModelOutcome::NeedsMoreDetail {
        message: "take a closer photo".to_string(),
    }
}
