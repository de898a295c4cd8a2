//! Phase 2 — Element Extraction. LLM call returns Facts and Entities for
//! the fragment; integer IDs are dense starting at 1, scoped to the
//! fragment.

use serde_json::json;

use crate::adapters::ChatCompletionRequest;
use crate::errors::FallbackCause;
use crate::model::{Entity, EntityType, Fact, FactType, Fragment, Phase1Output, Phase2Metadata, Phase2Output};
use crate::resilience::ResilientLlmClient;

fn parse_fact_type(raw: Option<&str>) -> FactType {
    match raw.unwrap_or("").to_uppercase().as_str() {
        "EVENT" => FactType::Event,
        "STATEMENT" => FactType::Statement,
        "ANNOUNCEMENT" => FactType::Announcement,
        _ => FactType::Other,
    }
}

fn parse_entity_type(raw: Option<&str>) -> EntityType {
    match raw.unwrap_or("").to_uppercase().as_str() {
        "PERSON" => EntityType::Person,
        "ORGANIZATION" => EntityType::Organization,
        "PLACE" => EntityType::Place,
        _ => EntityType::Other,
    }
}

pub async fn run(
    phase1: &Phase1Output,
    fragment: &Fragment,
    llm: &ResilientLlmClient,
) -> Result<Phase2Output, (FallbackCause, String)> {
    let request = ChatCompletionRequest {
        system_prompt: "extract_elements".to_string(),
        prompt: phase1.cleaned_text_for_next_phase.clone(),
        max_tokens: 2048,
        temperature: 0.1,
    };

    let value = llm
        .complete_json(request)
        .await
        .map_err(|e| (FallbackCause::LlmError, format!("element extraction call failed: {e}")))?;

    let facts: Vec<Fact> = value
        .get("facts")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(idx, f)| Fact {
                    id: (idx + 1) as u32,
                    source_fragment_id: fragment.fragment_id.clone(),
                    text: f.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    confidence: f.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32,
                    kind: parse_fact_type(f.get("type").and_then(|v| v.as_str())),
                    temporal_precision: f
                        .get("temporal_precision")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let entities: Vec<Entity> = value
        .get("entities")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(idx, e)| Entity {
                    id: (idx + 1) as u32,
                    source_fragment_id: fragment.fragment_id.clone(),
                    text: e.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    kind: parse_entity_type(e.get("type").and_then(|v| v.as_str())),
                    relevance: e.get("relevance").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32,
                    descriptors: e
                        .get("descriptors")
                        .and_then(|v| v.as_array())
                        .map(|arr| arr.iter().filter_map(|d| d.as_str().map(String::from)).collect())
                        .unwrap_or_default(),
                    normalized_id: None,
                    normalized_name: None,
                    normalization_similarity: None,
                })
                .collect()
        })
        .unwrap_or_default();

    let summary = value.get("summary").and_then(|v| v.as_str()).unwrap_or("").to_string();

    Ok(Phase2Output {
        facts,
        entities,
        summary,
        metadata: Phase2Metadata { is_fallback: false },
    })
}

/// Synthesizes one Fact from the headline and one Entity from the medium
/// name, both confidence-capped at 0.3 and dense IDs starting at 1 within
/// the fragment.
pub fn fallback(fragment: &Fragment, cause: FallbackCause) -> Phase2Output {
    let titular = fragment.titular();
    let medio = fragment.medio();

    let fact = Fact {
        id: 1,
        source_fragment_id: fragment.fragment_id.clone(),
        text: titular.clone(),
        confidence: 0.3,
        kind: FactType::Other,
        temporal_precision: "unknown".to_string(),
    };

    let entity = Entity {
        id: 1,
        source_fragment_id: fragment.fragment_id.clone(),
        text: medio,
        kind: EntityType::Organization,
        relevance: 0.3,
        descriptors: vec![],
        normalized_id: None,
        normalized_name: None,
        normalization_similarity: None,
    };

    Phase2Output {
        facts: vec![fact],
        entities: vec![entity],
        summary: format!("fase 2 fallback ({cause}): {titular}"),
        metadata: Phase2Metadata { is_fallback: true },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json as j;
    use std::collections::HashMap;

    fn fragment_with_headline() -> Fragment {
        let mut metadata = HashMap::new();
        metadata.insert("titular".to_string(), j!("Ministro anuncia reduccion del IVA"));
        metadata.insert("medio".to_string(), j!("El Diario"));
        Fragment {
            fragment_id: "f1".into(),
            texto_original: "texto".into(),
            id_articulo_fuente: "a1".into(),
            orden: 0,
            metadata,
        }
    }

    #[test]
    fn fallback_synthesizes_one_fact_and_one_entity() {
        let out = fallback(&fragment_with_headline(), FallbackCause::LlmError);
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.facts[0].text, "Ministro anuncia reduccion del IVA");
        assert_eq!(out.entities[0].text, "El Diario");
        assert!((out.facts[0].confidence - 0.3).abs() < f32::EPSILON);
        assert!(out.metadata.is_fallback);
    }

    #[test]
    fn parse_fact_type_defaults_to_other() {
        assert_eq!(parse_fact_type(Some("EVENT")), FactType::Event);
        assert_eq!(parse_fact_type(Some("bogus")), FactType::Other);
        assert_eq!(parse_fact_type(None), FactType::Other);
    }
}
