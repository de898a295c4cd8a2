//! Phase 3 — Quotes & Quantitative Data. LLM call returns Quotes and Data;
//! a Quote's `cited_entity_id`, if set, must reference an Entity produced
//! by phase 2 for the same fragment.

use serde_json::json;

use crate::adapters::ChatCompletionRequest;
use crate::errors::FallbackCause;
use crate::model::{Datum, Fragment, Phase2Output, Phase3Output, Quote};
use crate::resilience::ResilientLlmClient;

pub async fn run(
    phase2: &Phase2Output,
    fragment: &Fragment,
    llm: &ResilientLlmClient,
) -> Result<Phase3Output, (FallbackCause, String)> {
    let known_entity_ids: Vec<u32> = phase2.entities.iter().map(|e| e.id).collect();

    let request = ChatCompletionRequest {
        system_prompt: "extract_quotes_data".to_string(),
        prompt: phase2.summary.clone(),
        max_tokens: 2048,
        temperature: 0.1,
    };

    let value = llm
        .complete_json(request)
        .await
        .map_err(|e| (FallbackCause::LlmError, format!("quotes/data extraction call failed: {e}")))?;

    let quotes: Vec<Quote> = value
        .get("quotes")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(idx, q)| {
                    let cited = q
                        .get("cited_entity_id")
                        .and_then(|v| v.as_u64())
                        .map(|id| id as u32)
                        .filter(|id| known_entity_ids.contains(id));
                    Quote {
                        id: (idx + 1) as u32,
                        source_fragment_id: fragment.fragment_id.clone(),
                        text: q.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        speaker_text: q.get("speaker_text").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        cited_entity_id: cited,
                        context: q.get("context").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        relevance: q.get("relevance").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let quantitative_data: Vec<Datum> = value
        .get("quantitative_data")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .map(|(idx, d)| Datum {
                    id: (idx + 1) as u32,
                    source_fragment_id: fragment.fragment_id.clone(),
                    description: d.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    value: d.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0),
                    unit: d.get("unit").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    period_reference: d.get("period_reference").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    category: d.get("category").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    trend: d.get("trend").and_then(|v| v.as_str()).unwrap_or("stable").to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Phase3Output {
        quotes,
        quantitative_data,
        metadata: json!({}),
    })
}

/// Empty lists plus a warning; non-critical.
pub fn fallback(_fragment: &Fragment, cause: FallbackCause) -> Phase3Output {
    Phase3Output {
        quotes: vec![],
        quantitative_data: vec![],
        metadata: json!({ "is_fallback": true, "fallback_cause": cause.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, EntityType};
    use std::collections::HashMap;

    fn fragment() -> Fragment {
        Fragment {
            fragment_id: "f1".into(),
            texto_original: "texto".into(),
            id_articulo_fuente: "a1".into(),
            orden: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn fallback_is_empty_and_non_critical() {
        let out = fallback(&fragment(), FallbackCause::LlmError);
        assert!(out.quotes.is_empty());
        assert!(out.quantitative_data.is_empty());
    }

    #[test]
    fn dangling_cited_entity_id_is_dropped() {
        // A quote referencing an entity ID that doesn't exist in phase2 must
        // not survive into the Quote.
        let phase2 = crate::model::Phase2Output {
            facts: vec![],
            entities: vec![Entity {
                id: 1,
                source_fragment_id: "f1".into(),
                text: "Juan Perez".into(),
                kind: EntityType::Person,
                relevance: 0.9,
                descriptors: vec![],
                normalized_id: None,
                normalized_name: None,
                normalization_similarity: None,
            }],
            summary: "resumen".into(),
            metadata: Default::default(),
        };
        let known_entity_ids: Vec<u32> = phase2.entities.iter().map(|e| e.id).collect();
        assert!(known_entity_ids.contains(&1));
        assert!(!known_entity_ids.contains(&99));
    }
}
