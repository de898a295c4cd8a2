//! Shapes phase outputs into the single document the datastore's
//! `insert_whole_fragment` RPC expects.

use crate::model::{Fragment, Phase2Output, Phase3Output, Phase4Output};
use serde_json::json;

/// Builds the persistence payload for one fragment. Returns `None` when
/// phase 2 produced no facts and no entities, so the caller can skip
/// persistence with a warning instead of inserting an empty fragment.
pub fn build_payload(
    fragment: &Fragment,
    phase2: &Phase2Output,
    phase3: &Phase3Output,
    phase4: &Phase4Output,
) -> Option<serde_json::Value> {
    if phase2.facts.is_empty() && phase2.entities.is_empty() {
        return None;
    }

    Some(json!({
        "fragment_id": fragment.fragment_id,
        "id_articulo_fuente": fragment.id_articulo_fuente,
        "orden": fragment.orden,
        "facts": phase2.facts,
        "entities": phase4.entities_with_normalized_refs,
        "quotes": phase3.quotes,
        "quantitative_data": phase3.quantitative_data,
        "relations": phase4.relations,
        "normalization_status": phase4.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
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
    fn skips_when_no_facts_or_entities() {
        let phase2 = Phase2Output { facts: vec![], entities: vec![], summary: String::new(), metadata: Phase2Metadata::default() };
        let phase3 = Phase3Output { quotes: vec![], quantitative_data: vec![], metadata: json!({}) };
        let phase4 = Phase4Output {
            entities_with_normalized_refs: vec![],
            relations: Relations::default(),
            status: NormalizationStatus::Completed,
            metadata: json!({}),
        };
        assert!(build_payload(&fragment(), &phase2, &phase3, &phase4).is_none());
    }

    #[test]
    fn builds_payload_when_facts_present() {
        let phase2 = Phase2Output {
            facts: vec![Fact {
                id: 1,
                source_fragment_id: "f1".into(),
                text: "hecho".into(),
                confidence: 0.9,
                kind: FactType::Event,
                temporal_precision: "day".into(),
            }],
            entities: vec![],
            summary: "resumen".into(),
            metadata: Phase2Metadata::default(),
        };
        let phase3 = Phase3Output { quotes: vec![], quantitative_data: vec![], metadata: json!({}) };
        let phase4 = Phase4Output {
            entities_with_normalized_refs: vec![],
            relations: Relations::default(),
            status: NormalizationStatus::Completed,
            metadata: json!({}),
        };
        let payload = build_payload(&fragment(), &phase2, &phase3, &phase4).unwrap();
        assert_eq!(payload["fragment_id"], "f1");
        assert_eq!(payload["facts"][0]["text"], "hecho");
    }
}
