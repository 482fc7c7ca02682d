mod normalizer;
mod outcome;
mod session;

pub use normalizer::{extract_payload, normalize};
pub use outcome::{Diagnosis, DiagnosisContext, ImageInput, Language, ModelOutcome};
pub use session::{Analyzer, DiagnosisSession, SessionPhase};
