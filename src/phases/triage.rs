//! Phase 1 — Triage. Cleans text, detects language, attempts translation
//! for non-Spanish input, then asks the LLM adapter to judge relevance.

use serde_json::json;

use crate::adapters::ChatCompletionRequest;
use crate::errors::FallbackCause;
use crate::model::{Fragment, Phase1Output, TriageDecision};
use crate::resilience::ResilientLlmClient;

fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coarse heuristic, not a real language model: counts Spanish-only stopword
/// hits against a handful of common English ones. Good enough to decide
/// whether the translation sub-step needs to run at all.
fn detect_language(text: &str) -> &'static str {
    const SPANISH_MARKERS: &[&str] = &["que", "los", "las", "del", "para", "con", "una", "por"];
    const ENGLISH_MARKERS: &[&str] = &["the", "and", "that", "with", "from", "this"];

    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let spanish_hits = words.iter().filter(|w| SPANISH_MARKERS.contains(w)).count();
    let english_hits = words.iter().filter(|w| ENGLISH_MARKERS.contains(w)).count();

    if english_hits > spanish_hits {
        "en"
    } else {
        "es"
    }
}

/// Attempts translation to Spanish for non-Spanish input. A translation
/// failure is not a whole-phase fallback: the phase continues with the
/// original text and records `translation_attempted=false`.
async fn maybe_translate(cleaned: &str, language: &str, llm: &ResilientLlmClient) -> (String, bool) {
    if language == "es" {
        return (cleaned.to_string(), false);
    }

    let request = ChatCompletionRequest {
        system_prompt: "translate".to_string(),
        prompt: cleaned.to_string(),
        max_tokens: 2048,
        temperature: 0.0,
    };

    match llm.complete_json(request).await {
        Ok(value) => match value.get("translated_text").and_then(|v| v.as_str()) {
            Some(text) => (text.to_string(), true),
            None => (cleaned.to_string(), false),
        },
        Err(_) => (cleaned.to_string(), false),
    }
}

pub async fn run(fragment: &Fragment, llm: &ResilientLlmClient) -> Result<Phase1Output, (FallbackCause, String)> {
    let cleaned = clean_text(&fragment.texto_original);
    if cleaned.is_empty() {
        return Err((FallbackCause::PreprocessingError, "preprocessing produced empty text".to_string()));
    }

    let language = detect_language(&cleaned);
    let (text_for_relevance, translation_attempted) = maybe_translate(&cleaned, language, llm).await;

    let request = ChatCompletionRequest {
        system_prompt: "triage".to_string(),
        prompt: text_for_relevance.clone(),
        max_tokens: 512,
        temperature: 0.0,
    };

    let value = llm
        .complete_json(request)
        .await
        .map_err(|e| (FallbackCause::LlmError, format!("llm relevance call failed: {e}")))?;

    let is_relevant = value.get("is_relevant").and_then(|v| v.as_bool()).unwrap_or(false);
    let score = value.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    let category = value.get("category").and_then(|v| v.as_str()).unwrap_or("uncategorized").to_string();
    let justification = value.get("justification").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let keywords = value
        .get("keywords")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|k| k.as_str().map(String::from)).collect())
        .unwrap_or_default();

    Ok(Phase1Output {
        is_relevant,
        decision: if is_relevant { TriageDecision::Process } else { TriageDecision::Discard },
        justification,
        category,
        keywords,
        score,
        cleaned_text_for_next_phase: text_for_relevance,
        translation_attempted,
        model_metadata: value.get("model_metadata").cloned().unwrap_or(json!({})),
    })
}

/// Fallback policy: preprocessing/LLM failures accept the fragment as
/// relevant (best-effort forward progress), tagged with which cause drove
/// the fallback.
pub fn fallback(fragment: &Fragment, cause: FallbackCause) -> Phase1Output {
    let decision = match cause {
        FallbackCause::PreprocessingError => TriageDecision::FallbackAcceptedPreprocessingError,
        _ => TriageDecision::FallbackAcceptedLlmError,
    };
    Phase1Output {
        is_relevant: true,
        decision,
        justification: format!("fase 1 fallback: {cause}"),
        category: "unknown".to_string(),
        keywords: vec![],
        score: 0.0,
        cleaned_text_for_next_phase: fragment.texto_original.clone(),
        translation_attempted: false,
        model_metadata: json!({ "fallback_cause": cause.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fragment(text: &str) -> Fragment {
        Fragment {
            fragment_id: "f1".into(),
            texto_original: text.into(),
            id_articulo_fuente: "a1".into(),
            orden: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn fallback_accepts_as_relevant() {
        let out = fallback(&fragment("  multi   space   text "), FallbackCause::LlmError);
        assert!(out.is_relevant);
        assert_eq!(out.decision, TriageDecision::FallbackAcceptedLlmError);
        assert_eq!(out.cleaned_text_for_next_phase, "  multi   space   text ");
    }

    #[test]
    fn fallback_preprocessing_cause_maps_to_distinct_decision() {
        let out = fallback(&fragment("texto"), FallbackCause::PreprocessingError);
        assert_eq!(out.decision, TriageDecision::FallbackAcceptedPreprocessingError);
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a   b\tc\n d "), "a b c d");
    }

    #[test]
    fn detect_language_prefers_spanish_markers() {
        assert_eq!(detect_language("el gobierno anuncia una reduccion para los contribuyentes"), "es");
        assert_eq!(detect_language("the government announced that and this reduction"), "en");
    }
}
