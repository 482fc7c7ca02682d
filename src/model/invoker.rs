use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::Result;
use crate::config::AiConfig;
use crate::diagnosis::{
    Analyzer, DiagnosisContext, ImageInput, ModelOutcome, extract_payload, normalize,
};

use super::retry::{RetryPolicy, with_retries};
use super::transport::{DirectTransport, ModelTransport, ProxyTransport, TransportError};
use super::types::{GenerateRequest, Part};

/// Content-moderation seam. Verdicts are booleans, failures included: any
/// problem reaching the model blocks the content.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check_safety(&self, text: &str, image: Option<&ImageInput>) -> bool;
}

/// One model attempt: primary transport, direct fallback when the primary
/// path fails outright, then normalization of whichever body won.
pub struct ModelInvoker {
    primary: Box<dyn ModelTransport>,
    fallback: Option<Box<dyn ModelTransport>>,
}

impl ModelInvoker {
    pub fn new(
        primary: Box<dyn ModelTransport>,
        fallback: Option<Box<dyn ModelTransport>>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Builds the transport pair from configuration. Whether a direct
    /// fallback exists is decided here, once, by credential presence; it is
    /// never rediscovered per call.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let primary: Box<dyn ModelTransport> =
            Box::new(ProxyTransport::new(client.clone(), config.proxy_url.clone()));

        let fallback: Option<Box<dyn ModelTransport>> = match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                info!("direct model fallback enabled");
                Some(Box::new(DirectTransport::new(
                    client,
                    &config.api_base_url,
                    &config.model,
                    key,
                )))
            }
            _ => {
                warn!("no model credential configured, direct fallback disabled");
                None
            }
        };

        Ok(Self::new(primary, fallback))
    }

    /// Single attempt against the model; retries happen above this layer.
    pub async fn invoke(&self, images: &[ImageInput], context: &DiagnosisContext) -> ModelOutcome {
        let request = build_diagnosis_request(images, context);
        match self.primary.generate(&request).await {
            Ok(body) => normalize(&body),
            Err(err) if err.is_transient() => ModelOutcome::TransientFailure {
                cause: err.to_string(),
            },
            Err(err) => self.attempt_fallback(&request, err).await,
        }
    }

    async fn attempt_fallback(
        &self,
        request: &GenerateRequest,
        primary_err: TransportError,
    ) -> ModelOutcome {
        let Some(fallback) = &self.fallback else {
            warn!(error = %primary_err, "primary transport failed, no fallback configured");
            return match primary_err {
                TransportError::Unavailable(_) => ModelOutcome::FatalFailure {
                    cause: "service unavailable".to_string(),
                },
                other => ModelOutcome::FatalFailure {
                    cause: other.to_string(),
                },
            };
        };

        warn!(
            error = %primary_err,
            transport = fallback.name(),
            "primary transport failed, finishing attempt on fallback"
        );
        match fallback.generate(request).await {
            Ok(body) => normalize(&body),
            Err(err) if err.is_transient() => ModelOutcome::TransientFailure {
                cause: err.to_string(),
            },
            Err(err) => ModelOutcome::FatalFailure {
                cause: err.to_string(),
            },
        }
    }

    async fn moderation_body(&self, request: &GenerateRequest) -> Option<String> {
        match self.primary.generate(request).await {
            Ok(body) => Some(body),
            Err(err) => {
                let fallback = self.fallback.as_ref()?;
                warn!(error = %err, "moderation call falling back to direct transport");
                fallback.generate(request).await.ok()
            }
        }
    }
}

#[async_trait]
impl Moderator for ModelInvoker {
    async fn check_safety(&self, text: &str, image: Option<&ImageInput>) -> bool {
        let request = build_moderation_request(text, image);
        let Some(body) = self.moderation_body(&request).await else {
            warn!("moderation call failed, blocking content");
            return false;
        };

        let safe = extract_payload(&body)
            .and_then(|value| value.get("safe").and_then(Value::as_bool))
            .unwrap_or(false);
        if !safe {
            warn!("content blocked by moderation");
        }
        safe
    }
}

/// Production analyzer: the invoker wrapped in the retry schedule.
pub struct RetryingInvoker {
    invoker: ModelInvoker,
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(invoker: ModelInvoker, policy: RetryPolicy) -> Self {
        Self { invoker, policy }
    }

    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let invoker = ModelInvoker::from_config(config)?;
        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.retry_delay_ms),
        };
        Ok(Self::new(invoker, policy))
    }
}

#[async_trait]
impl Analyzer for RetryingInvoker {
    async fn analyze(&self, images: &[ImageInput], context: &DiagnosisContext) -> ModelOutcome {
        with_retries(&self.policy, || self.invoker.invoke(images, context)).await
    }
}

#[async_trait]
impl Moderator for RetryingInvoker {
    async fn check_safety(&self, text: &str, image: Option<&ImageInput>) -> bool {
        self.invoker.check_safety(text, image).await
    }
}

fn build_diagnosis_request(images: &[ImageInput], context: &DiagnosisContext) -> GenerateRequest {
    let mut parts = vec![Part::text(diagnosis_instruction(context))];
    parts.extend(images.iter().map(Part::inline_image));
    GenerateRequest::single_turn(parts)
}

fn build_moderation_request(text: &str, image: Option<&ImageInput>) -> GenerateRequest {
    let mut parts = vec![Part::text(moderation_instruction(text))];
    if let Some(image) = image {
        parts.push(Part::inline_image(image));
    }
    GenerateRequest::single_turn(parts)
}

fn diagnosis_instruction(context: &DiagnosisContext) -> String {
    let hint = match context.plant_hint.as_deref().map(str::trim) {
        Some(hint) if !hint.is_empty() => format!(
            "The user identifies this plant as \"{hint}\". Use this as context but verify visually.\n"
        ),
        _ => String::new(),
    };

    format!(
        r#"You are an expert Phytopathologist. Analyze the provided plant image(s).
{hint}OUTPUT MUST BE IN {language}.

PROTOCOL:
1. If the image is not a plant, return {{"status": "error", "error": "NOT_PLANT"}}
2. If the ailment is unclear, the image is blurry, or you need a closer look (macro shot) to be at least 70% confident, return:
   {{"status": "needs_details", "message": "Please take a closer photo of the affected leaf or area."}}
3. If confident, return a valid JSON object:
{{
    "status": "success",
    "plant_name": "Common plant name",
    "plant_latin_name": "Scientific plant name",
    "disease_name": "Disease name or 'Healthy'",
    "disease_latin_name": "Scientific name or 'Plantae sanus'",
    "confidence": 90,
    "urgency": 50,
    "spread_risk": 40,
    "is_treatable": true,
    "description": "Short description (max 2 sentences).",
    "treatment_steps": ["Step 1", "Step 2", "Step 3"],
    "preventive_measures": ["Tip 1", "Tip 2"]
}}

Return ONLY valid raw JSON (no markdown, no backticks)."#,
        language = context.language.instruction_name(),
    )
}

fn moderation_instruction(text: &str) -> String {
    format!(
        r#"You are a content moderator. Analyze the following text and image.
Text: "{text}"

Is this content SAFE and APPROPRIATE for a general audience (farmers, students)?
It must NOT contain hate speech, explicit violence, sexual content (+18), or illegal acts.

Return JSON: {{"safe": true}} or {{"safe": false, "reason": "reason"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Language;
    use pretty_assertions::assert_eq;

    #[test]
    fn instruction_names_the_target_language() {
        let context = DiagnosisContext::new(Language::En);
        assert!(diagnosis_instruction(&context).contains("OUTPUT MUST BE IN ENGLISH."));

        let context = DiagnosisContext::new(Language::Tr);
        assert!(diagnosis_instruction(&context).contains("OUTPUT MUST BE IN TURKISH."));
    }

    #[test]
    fn instruction_carries_the_plant_hint_verbatim() {
        let context = DiagnosisContext::new(Language::En).with_hint("heirloom tomato");
        let instruction = diagnosis_instruction(&context);
        assert!(instruction.contains("\"heirloom tomato\""));
    }

    #[test]
    fn blank_hint_is_omitted() {
        let context = DiagnosisContext::new(Language::En).with_hint("   ");
        let instruction = diagnosis_instruction(&context);
        assert!(!instruction.contains("identifies this plant"));
    }

    #[test]
    fn diagnosis_request_orders_prompt_before_images() {
        let images = vec![
            ImageInput::jpeg(vec![1]),
            ImageInput::jpeg(vec![2]),
        ];
        let request = build_diagnosis_request(&images, &DiagnosisContext::default());

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], Part::Text { .. }));
        assert!(matches!(parts[1], Part::InlineData { .. }));
        assert!(matches!(parts[2], Part::InlineData { .. }));
    }

    #[test]
    fn moderation_request_embeds_the_text() {
        let request = build_moderation_request("hello feed", None);
        let Part::Text { text } = &request.contents[0].parts[0] else {
            panic!("first part should be the instruction");
        };
        assert!(text.contains("hello feed"));
        assert_eq!(request.contents[0].parts.len(), 1);
    }
}
