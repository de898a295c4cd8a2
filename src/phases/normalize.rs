//! Phase 4 — Normalization. For each Entity, calls the datastore's "find
//! similar entity" RPC and attaches a normalized ID above the similarity
//! threshold; then a second LLM call derives relations.
//!
//! Unlike phases 1–3, phase 4 absorbs its two sub-failures (normalization
//! RPC, relations LLM call) internally rather than surfacing a single
//! all-or-nothing error to the controller — each gets its own fallback.
//! `run` therefore never fails; it reports what it degraded through
//! `warnings` and `fallback_used`.

use serde_json::json;

use crate::adapters::ChatCompletionRequest;
use crate::errors::FallbackCause;
use crate::model::{
    Contradiction, EntityRelation, FactRelation, Fragment, NormalizationStatus, Phase2Output, Phase3Output,
    Phase4Output, Relations,
};
use crate::resilience::{ResilientDatastoreClient, ResilientLlmClient};

pub struct NormalizeRunResult {
    pub output: Phase4Output,
    pub warnings: Vec<String>,
    pub fallback_used: bool,
}

pub async fn run(
    phase2: &Phase2Output,
    phase3: &Phase3Output,
    fragment: &Fragment,
    llm: &ResilientLlmClient,
    datastore: &ResilientDatastoreClient,
    similarity_threshold: f32,
) -> NormalizeRunResult {
    let mut warnings = Vec::new();
    let mut fallback_used = false;

    let mut entities = phase2.entities.clone();
    let mut normalization_ok = true;

    for entity in entities.iter_mut() {
        let type_name = format!("{:?}", entity.kind).to_uppercase();
        match datastore.find_similar_entity(&entity.text, &type_name, similarity_threshold).await {
            Ok(matches) => {
                if let Some(best) = matches
                    .into_iter()
                    .max_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal))
                {
                    if best.similarity >= similarity_threshold {
                        entity.normalized_id = Some(best.id);
                        entity.normalized_name = Some(best.normalized_name);
                        entity.normalization_similarity = Some(best.similarity);
                        continue;
                    }
                }
                entity.normalization_similarity = Some(0.0);
            }
            Err(_) => {
                normalization_ok = false;
            }
        }
    }

    if !normalization_ok {
        for entity in entities.iter_mut() {
            entity.normalized_id = None;
            entity.normalized_name = None;
            entity.normalization_similarity = Some(0.0);
        }
        fallback_used = true;
        warnings.push(format!("fase 4 fallback: {}", FallbackCause::RpcError));
    }

    let status = if normalization_ok {
        NormalizationStatus::Completed
    } else {
        NormalizationStatus::CompletedWithoutNormalization
    };

    let relations = match derive_relations(phase2, phase3, llm).await {
        Ok(relations) => relations,
        Err(_) => {
            fallback_used = true;
            warnings.push(format!("fase 4 fallback: {}", FallbackCause::LlmError));
            Relations::default()
        }
    };

    NormalizeRunResult {
        output: Phase4Output {
            entities_with_normalized_refs: entities,
            relations,
            status,
            metadata: json!({}),
        },
        warnings,
        fallback_used,
    }
}

async fn derive_relations(
    phase2: &Phase2Output,
    phase3: &Phase3Output,
    llm: &ResilientLlmClient,
) -> Result<Relations, ()> {
    let prompt = json!({
        "facts": phase2.facts,
        "entities": phase2.entities,
        "quotes": phase3.quotes,
    })
    .to_string();

    let request = ChatCompletionRequest {
        system_prompt: "derive_relations".to_string(),
        prompt,
        max_tokens: 2048,
        temperature: 0.1,
    };

    let value = llm.complete_json(request).await.map_err(|_| ())?;

    let fact_fact = value
        .get("fact_fact")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(FactRelation {
                        fact_a_id: r.get("fact_a_id")?.as_u64()? as u32,
                        fact_b_id: r.get("fact_b_id")?.as_u64()? as u32,
                        kind: r.get("type").and_then(|v| v.as_str()).unwrap_or("related").to_string(),
                        strength: r.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32,
                        description: r.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let entity_entity = value
        .get("entity_entity")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(EntityRelation {
                        entity_a_id: r.get("entity_a_id")?.as_u64()? as u32,
                        entity_b_id: r.get("entity_b_id")?.as_u64()? as u32,
                        kind: r.get("type").and_then(|v| v.as_str()).unwrap_or("related").to_string(),
                        strength: r.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let contradictions = value
        .get("contradictions")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(Contradiction {
                        fact_a_id: r.get("fact_a_id")?.as_u64()? as u32,
                        fact_b_id: r.get("fact_b_id")?.as_u64()? as u32,
                        description: r.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Relations { fact_fact, entity_entity, contradictions })
}

/// Used by the controller only when phase 4 is cancelled or skipped
/// outright: no normalization attempted, empty relations.
pub fn fallback(phase2: &Phase2Output, _cause: FallbackCause) -> Phase4Output {
    let mut entities = phase2.entities.clone();
    for entity in entities.iter_mut() {
        entity.normalized_id = None;
        entity.normalized_name = None;
        entity.normalization_similarity = Some(0.0);
    }
    Phase4Output {
        entities_with_normalized_refs: entities,
        relations: Relations::default(),
        status: NormalizationStatus::CompletedWithoutNormalization,
        metadata: json!({}),
    }
}
