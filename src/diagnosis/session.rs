use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::outcome::{DiagnosisContext, ImageInput, ModelOutcome};
use crate::{Error, Result};

/// Runs one full diagnosis round: a single model attempt wrapped in whatever
/// retry policy the implementation carries. Expected failures come back as
/// outcome values, never as errors.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, images: &[ImageInput], context: &DiagnosisContext) -> ModelOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingMain,
    Analyzing,
    AwaitingMacro,
    Done,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::AwaitingMain => "awaiting_main",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::AwaitingMacro => "awaiting_macro",
            SessionPhase::Done => "done",
        }
    }
}

/// Short-lived state machine for one scan.
///
/// `AwaitingMain → Analyzing → (AwaitingMacro → Analyzing)? → Done`. The
/// session owns its images exclusively and performs at most two invocation
/// rounds: the main frame alone, then main plus macro when the model asks for
/// a closer look. A second clarification request terminates the session.
pub struct DiagnosisSession {
    context: DiagnosisContext,
    images: Vec<ImageInput>,
    phase: SessionPhase,
    rounds: u32,
    clarified: bool,
    outcome: Option<ModelOutcome>,
}

impl DiagnosisSession {
    pub fn new(context: DiagnosisContext) -> Self {
        Self {
            context,
            images: Vec::with_capacity(2),
            phase: SessionPhase::AwaitingMain,
            rounds: 0,
            clarified: false,
            outcome: None,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_done(&self) -> bool {
        self.phase == SessionPhase::Done
    }

    /// Final outcome once the session is done.
    pub fn outcome(&self) -> Option<&ModelOutcome> {
        self.outcome.as_ref()
    }

    /// Feeds the next frame into the machine and runs one analysis round with
    /// every image collected so far. Only legal while the session is waiting
    /// for a frame.
    pub async fn submit_image<A>(&mut self, image: ImageInput, analyzer: &A) -> Result<ModelOutcome>
    where
        A: Analyzer + ?Sized,
    {
        match self.phase {
            SessionPhase::AwaitingMain | SessionPhase::AwaitingMacro => self.images.push(image),
            SessionPhase::Analyzing | SessionPhase::Done => {
                return Err(Error::InvalidTransition {
                    current: self.phase.as_str().to_string(),
                    requested: "submit_image".to_string(),
                });
            }
        }

        self.phase = SessionPhase::Analyzing;
        self.rounds += 1;
        debug!(
            round = self.rounds,
            images = self.images.len(),
            "starting analysis round"
        );

        let outcome = analyzer.analyze(&self.images, &self.context).await;
        Ok(self.settle(outcome))
    }

    fn settle(&mut self, outcome: ModelOutcome) -> ModelOutcome {
        match outcome {
            ModelOutcome::NeedsMoreDetail { .. } if !self.clarified => {
                self.clarified = true;
                self.phase = SessionPhase::AwaitingMacro;
                info!("model requested a macro shot, awaiting second frame");
                outcome
            }
            ModelOutcome::NeedsMoreDetail { .. } => {
                warn!("model asked for more detail twice, terminating session");
                let fatal = ModelOutcome::FatalFailure {
                    cause: "unable to clarify".to_string(),
                };
                self.finish(fatal.clone());
                fatal
            }
            other => {
                self.finish(other.clone());
                other
            }
        }
    }

    fn finish(&mut self, outcome: ModelOutcome) {
        debug_assert!(self.rounds <= 2, "session ran more than two rounds");
        self.phase = SessionPhase::Done;
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::{Diagnosis, Language};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Scripted analyzer: pops outcomes in order and records how many images
    /// each round received.
    struct ScriptedAnalyzer {
        outcomes: Mutex<Vec<ModelOutcome>>,
        image_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedAnalyzer {
        fn new(outcomes: Vec<ModelOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                image_counts: Mutex::new(Vec::new()),
            }
        }

        fn rounds_seen(&self) -> Vec<usize> {
            self.image_counts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn analyze(
            &self,
            images: &[ImageInput],
            _context: &DiagnosisContext,
        ) -> ModelOutcome {
            self.image_counts.lock().unwrap().push(images.len());
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn success() -> ModelOutcome {
        ModelOutcome::Success(Diagnosis {
            plant_name: "Tomato".to_string(),
            plant_latin_name: "Solanum lycopersicum".to_string(),
            disease_name: "Leaf Spot".to_string(),
            disease_latin_name: "Septoria lycopersici".to_string(),
            confidence: 92,
            urgency: 60,
            spread_risk: 45,
            is_treatable: true,
            description: "Dark circular lesions.".to_string(),
            treatment_steps: vec!["Remove affected leaves".to_string()],
            preventive_measures: vec![],
        })
    }

    fn needs_detail() -> ModelOutcome {
        ModelOutcome::NeedsMoreDetail {
            message: "take a closer photo".to_string(),
        }
    }

    fn frame() -> ImageInput {
        ImageInput::jpeg(vec![0xff, 0xd8, 0xff])
    }

    #[tokio::test]
    async fn happy_path_finishes_on_first_round() {
        let analyzer = ScriptedAnalyzer::new(vec![success()]);
        let mut session = DiagnosisSession::new(DiagnosisContext::new(Language::En));

        let outcome = session.submit_image(frame(), &analyzer).await.unwrap();

        assert_eq!(outcome, success());
        assert!(session.is_done());
        assert_eq!(session.rounds(), 1);
        assert_eq!(session.outcome(), Some(&success()));
        assert_eq!(analyzer.rounds_seen(), vec![1]);
    }

    #[tokio::test]
    async fn clarification_round_sends_both_images() {
        let analyzer = ScriptedAnalyzer::new(vec![needs_detail(), success()]);
        let mut session = DiagnosisSession::new(DiagnosisContext::new(Language::En));

        let first = session.submit_image(frame(), &analyzer).await.unwrap();
        assert_eq!(first, needs_detail());
        assert_eq!(*session.phase(), SessionPhase::AwaitingMacro);
        assert!(!session.is_done());

        let second = session.submit_image(frame(), &analyzer).await.unwrap();
        assert_eq!(second, success());
        assert!(session.is_done());

        // Second round must carry the main frame and the macro frame.
        assert_eq!(analyzer.rounds_seen(), vec![1, 2]);
    }

    #[tokio::test]
    async fn second_clarification_request_terminates_fatally() {
        let analyzer = ScriptedAnalyzer::new(vec![needs_detail(), needs_detail()]);
        let mut session = DiagnosisSession::new(DiagnosisContext::default());

        session.submit_image(frame(), &analyzer).await.unwrap();
        let outcome = session.submit_image(frame(), &analyzer).await.unwrap();

        assert_eq!(
            outcome,
            ModelOutcome::FatalFailure {
                cause: "unable to clarify".to_string()
            }
        );
        assert!(session.is_done());
        assert_eq!(session.rounds(), 2);
        assert_eq!(analyzer.rounds_seen().len(), 2);
    }

    #[tokio::test]
    async fn not_a_plant_is_terminal() {
        let analyzer = ScriptedAnalyzer::new(vec![ModelOutcome::NotAPlant]);
        let mut session = DiagnosisSession::new(DiagnosisContext::default());

        let outcome = session.submit_image(frame(), &analyzer).await.unwrap();

        assert_eq!(outcome, ModelOutcome::NotAPlant);
        assert!(session.is_done());
        assert_eq!(session.rounds(), 1);
    }

    #[tokio::test]
    async fn submitting_after_done_is_rejected() {
        let analyzer = ScriptedAnalyzer::new(vec![success()]);
        let mut session = DiagnosisSession::new(DiagnosisContext::default());

        session.submit_image(frame(), &analyzer).await.unwrap();
        let err = session.submit_image(frame(), &analyzer).await.unwrap_err();

        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn fatal_failure_is_terminal() {
        let analyzer = ScriptedAnalyzer::new(vec![ModelOutcome::FatalFailure {
            cause: "incomplete diagnosis".to_string(),
        }]);
        let mut session = DiagnosisSession::new(DiagnosisContext::default());

        let outcome = session.submit_image(frame(), &analyzer).await.unwrap();

        assert!(matches!(outcome, ModelOutcome::FatalFailure { .. }));
        assert!(session.is_done());
    }
}
