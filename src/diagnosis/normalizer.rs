use serde_json::Value;

use super::outcome::{Diagnosis, ModelOutcome};

/// Turns raw model text into a typed outcome.
///
/// Pure function: no I/O, deterministic for a given input. Malformed input
/// never panics or errors, it maps to `FatalFailure`.
pub fn normalize(raw: &str) -> ModelOutcome {
    let Some(value) = extract_payload(raw) else {
        return ModelOutcome::FatalFailure {
            cause: "unparseable response".to_string(),
        };
    };

    if value.get("error").and_then(Value::as_str) == Some("NOT_PLANT") {
        return ModelOutcome::NotAPlant;
    }

    if value.get("status").and_then(Value::as_str) == Some("needs_details") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return ModelOutcome::NeedsMoreDetail { message };
    }

    match validate(&value) {
        Some(diagnosis) => ModelOutcome::Success(diagnosis),
        None => ModelOutcome::FatalFailure {
            cause: "incomplete diagnosis".to_string(),
        },
    }
}

/// Strips fence markup, parses the remaining text as JSON, and unwraps the
/// upstream generateContent envelope down to the innermost payload. A proxied
/// body may carry the envelope instead of the bare fields; the model's own
/// text may be fenced inside it.
pub fn extract_payload(raw: &str) -> Option<Value> {
    let cleaned = strip_fences(raw);
    let value: Value = serde_json::from_str(&cleaned).ok()?;
    if let Some(inner) = candidate_text(&value) {
        let inner = inner.to_string();
        return extract_payload(&inner);
    }
    Some(value)
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

fn candidate_text(value: &Value) -> Option<&str> {
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

/// Structural validation of a success payload. The model's output is trusted
/// only after every field checks out; nothing is coerced or defaulted.
fn validate(value: &Value) -> Option<Diagnosis> {
    let diagnosis = Diagnosis {
        plant_name: string_field(value, "plant_name")?,
        plant_latin_name: string_field(value, "plant_latin_name")?,
        disease_name: string_field(value, "disease_name")?,
        disease_latin_name: string_field(value, "disease_latin_name")?,
        confidence: score_field(value, "confidence")?,
        urgency: score_field(value, "urgency")?,
        spread_risk: score_field(value, "spread_risk")?,
        is_treatable: value.get("is_treatable")?.as_bool()?,
        description: string_field(value, "description")?,
        treatment_steps: string_list_field(value, "treatment_steps")?,
        preventive_measures: string_list_field(value, "preventive_measures")?,
    };

    if diagnosis.is_treatable && diagnosis.treatment_steps.is_empty() {
        return None;
    }

    Some(diagnosis)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

fn score_field(value: &Value, key: &str) -> Option<u8> {
    let number = value.get(key)?.as_f64()?;
    if !(0.0..=100.0).contains(&number) {
        return None;
    }
    Some(number.round() as u8)
}

fn string_list_field(value: &Value, key: &str) -> Option<Vec<String>> {
    value
        .get(key)?
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const VALID_BODY: &str = r#"{
        "status": "success",
        "plant_name": "Tomato",
        "plant_latin_name": "Solanum lycopersicum",
        "disease_name": "Leaf Spot",
        "disease_latin_name": "Septoria lycopersici",
        "confidence": 92,
        "urgency": 60,
        "spread_risk": 45,
        "is_treatable": true,
        "description": "Dark circular lesions on lower leaves.",
        "treatment_steps": ["Remove affected leaves", "Apply copper fungicide"],
        "preventive_measures": ["Water at the base", "Rotate crops yearly"]
    }"#;

    fn expect_success(outcome: ModelOutcome) -> Diagnosis {
        match outcome {
            ModelOutcome::Success(diagnosis) => diagnosis,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn parses_plain_json_body() {
        let diagnosis = expect_success(normalize(VALID_BODY));
        assert_eq!(diagnosis.disease_name, "Leaf Spot");
        assert_eq!(diagnosis.confidence, 92);
        assert_eq!(diagnosis.treatment_steps.len(), 2);
    }

    #[rstest]
    #[case(format!("```json\n{VALID_BODY}\n```"))]
    #[case(format!("```\n{VALID_BODY}\n```"))]
    #[case(format!("\n\n   {VALID_BODY}   \n"))]
    fn fence_and_whitespace_noise_is_ignored(#[case] wrapped: String) {
        let reference = expect_success(normalize(VALID_BODY));
        let diagnosis = expect_success(normalize(&wrapped));
        assert_eq!(diagnosis, reference);
    }

    #[test]
    fn unwraps_generate_content_envelope() {
        let envelope = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": format!("```json\n{VALID_BODY}\n```") }]
                }
            }]
        });
        let diagnosis = expect_success(normalize(&envelope.to_string()));
        assert_eq!(diagnosis.plant_name, "Tomato");
    }

    #[rstest]
    #[case(r#"{"status": "error", "error": "NOT_PLANT"}"#)]
    #[case(r#"{"error": "NOT_PLANT"}"#)]
    fn maps_not_plant_signal(#[case] body: &str) {
        assert_eq!(normalize(body), ModelOutcome::NotAPlant);
    }

    #[test]
    fn maps_needs_details_signal() {
        let body = r#"{"status": "needs_details", "message": "Please take a closer photo."}"#;
        assert_eq!(
            normalize(body),
            ModelOutcome::NeedsMoreDetail {
                message: "Please take a closer photo.".to_string()
            }
        );
    }

    #[test]
    fn needs_details_without_message_keeps_it_empty() {
        let body = r#"{"status": "needs_details"}"#;
        assert_eq!(
            normalize(body),
            ModelOutcome::NeedsMoreDetail {
                message: String::new()
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("the plant looks sick to me")]
    #[case("{not json at all")]
    fn unparseable_text_is_fatal(#[case] body: &str) {
        assert_eq!(
            normalize(body),
            ModelOutcome::FatalFailure {
                cause: "unparseable response".to_string()
            }
        );
    }

    #[rstest]
    // missing required field
    #[case(r#"{"plant_name": "Tomato"}"#)]
    // score outside 0..=100
    #[case(&VALID_BODY.replace("\"confidence\": 92", "\"confidence\": 140"))]
    #[case(&VALID_BODY.replace("\"urgency\": 60", "\"urgency\": -5"))]
    // wrong type
    #[case(&VALID_BODY.replace("\"confidence\": 92", "\"confidence\": \"high\""))]
    #[case(&VALID_BODY.replace("\"is_treatable\": true", "\"is_treatable\": \"yes\""))]
    // treatable but nothing to do
    #[case(&VALID_BODY.replace(
        "\"treatment_steps\": [\"Remove affected leaves\", \"Apply copper fungicide\"]",
        "\"treatment_steps\": []"
    ))]
    fn structural_defects_are_fatal(#[case] body: &str) {
        assert_eq!(
            normalize(body),
            ModelOutcome::FatalFailure {
                cause: "incomplete diagnosis".to_string()
            }
        );
    }

    #[test]
    fn untreatable_diagnosis_may_have_no_treatment_steps() {
        let body = VALID_BODY
            .replace("\"is_treatable\": true", "\"is_treatable\": false")
            .replace(
                "\"treatment_steps\": [\"Remove affected leaves\", \"Apply copper fungicide\"]",
                "\"treatment_steps\": []",
            );
        let diagnosis = expect_success(normalize(&body));
        assert!(!diagnosis.is_treatable);
        assert!(diagnosis.treatment_steps.is_empty());
    }

    #[test]
    fn fractional_scores_within_range_are_accepted() {
        let body = VALID_BODY.replace("\"confidence\": 92", "\"confidence\": 92.4");
        let diagnosis = expect_success(normalize(&body));
        assert_eq!(diagnosis.confidence, 92);
    }
}
