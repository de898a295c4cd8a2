//! End-to-end exercise of validation gating + the four-phase controller
//! chain + persistence, using the real (in-memory) adapters from
//! `pipeline-llm`/`pipeline-datastore` rather than ad-hoc test doubles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::clock::SystemClock;
use pipeline_core::controller::Controller;
use pipeline_core::metrics::MetricsCollector;
use pipeline_core::model::Article;
use pipeline_core::resilience::{ResilientDatastoreClient, ResilientLlmClient};
use pipeline_core::validation::{validate_article, ValidationConfig};
use pipeline_datastore::MockDatastoreClient;
use pipeline_llm::MockLlmClient;

fn valid_article() -> Article {
    Article {
        medio: "El Diario".into(),
        pais: "ES".into(),
        tipo_medio: "digital".into(),
        titular: "El gobierno aprueba nuevo presupuesto".into(),
        fecha_publicacion: chrono::Utc::now(),
        contenido_texto: "El gobierno aprobo hoy el nuevo presupuesto nacional para el proximo ano fiscal.".into(),
        idioma: None,
        autor: None,
        url: None,
        seccion: None,
        es_opinion: false,
        es_oficial: true,
        metadata: HashMap::new(),
    }
}

#[test]
fn invalid_article_is_rejected_before_any_phase_runs() {
    let mut article = valid_article();
    article.contenido_texto = String::new();
    let errors = validate_article(&article, &ValidationConfig::default());
    assert!(errors.iter().any(|e| e.field == "contenido_texto"));
}

#[tokio::test]
async fn valid_article_flows_through_all_four_phases_and_persists() {
    let llm = Arc::new(MockLlmClient::new(vec![
        Ok(serde_json::json!({
            "is_relevant": true, "score": 0.95, "category": "politica",
            "justification": "menciona presupuesto nacional", "keywords": ["presupuesto", "gobierno"],
        })
        .to_string()),
        Ok(serde_json::json!({
            "facts": [{"text": "El gobierno aprobo el presupuesto", "confidence": 0.95, "type": "ANNOUNCEMENT", "temporal_precision": "day"}],
            "entities": [{"text": "Gobierno", "type": "ORGANIZATION", "relevance": 0.9, "descriptors": []}],
            "summary": "Aprobacion del presupuesto nacional",
        })
        .to_string()),
        Ok(serde_json::json!({"quotes": [], "quantitative_data": []}).to_string()),
        Ok(serde_json::json!({"fact_fact": [], "entity_entity": [], "contradictions": []}).to_string()),
    ]));

    let datastore = Arc::new(MockDatastoreClient::default());
    datastore.similar_entities.lock().unwrap().push(pipeline_core::adapters::SimilarEntityMatch {
        id: "entity-gov-1".into(),
        normalized_name: "Gobierno de Espana".into(),
        similarity: 0.92,
    });

    let llm = Arc::new(ResilientLlmClient::new(llm, 5, Duration::from_secs(30), Duration::from_secs(30)));
    let ds = Arc::new(ResilientDatastoreClient::new(
        datastore.clone(),
        5,
        Duration::from_secs(30),
        Duration::from_secs(10),
        10,
        Duration::from_millis(200),
    ));
    let controller = Controller::new(llm, ds, Arc::new(MetricsCollector::new()), Arc::new(SystemClock), 0.85);

    let result = controller.process_article(&valid_article(), "req-full", None).await;
    let fragment = &result.fragments[0];

    assert!(!fragment.partial_processing);
    assert_eq!(fragment.metrics.overall_success_rate, 1.0);
    assert!(fragment.persistence.matches_ok());
    assert_eq!(fragment.phase_outputs.phase2.facts.len(), 1);
    assert_eq!(
        fragment.phase_outputs.phase4.entities_with_normalized_refs[0].normalized_name.as_deref(),
        Some("Gobierno de Espana")
    );
    assert_eq!(datastore.inserted_payloads.lock().unwrap().len(), 1);
}
