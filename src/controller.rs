//! Phase orchestrator / controller. For one fragment, runs phases 1→4 in
//! order, honors each phase's fallback policy, aggregates metrics, and
//! hands the bundle to persistence. A single phase's failure never aborts
//! the chain — every phase is best-effort.

use std::sync::Arc;
use std::time::Instant;

use crate::adapters::DatastoreCallError;
use crate::clock::{Clock, Stopwatch};
use crate::errors::FallbackCause;
use crate::metrics::MetricsCollector;
use crate::model::{
    Article, ArticleResult, ElementCounts, Fragment, FragmentResult, Metrics, PersistenceOutcome, PhaseMeta,
    PhaseOutputs,
};
use crate::persistence;
use crate::phases::{elements, normalize, quotes, triage};
use crate::resilience::{ResilientDatastoreClient, ResilientLlmClient};

/// Shared, long-lived dependencies injected once at startup. Explicit
/// construction and passing replaces module-level "get or create"
/// singletons.
pub struct Controller {
    pub llm: Arc<ResilientLlmClient>,
    pub datastore: Arc<ResilientDatastoreClient>,
    pub metrics: Arc<MetricsCollector>,
    pub clock: Arc<dyn Clock>,
    pub similarity_threshold: f32,
}

impl Controller {
    pub fn new(
        llm: Arc<ResilientLlmClient>,
        datastore: Arc<ResilientDatastoreClient>,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
        similarity_threshold: f32,
    ) -> Self {
        Controller { llm, datastore, metrics, clock, similarity_threshold }
    }

    /// Validates nothing itself (the HTTP surface validates before
    /// dispatch); splits into one fragment in the base case and runs it
    /// through `process_fragment`.
    pub async fn process_article(&self, article: &Article, request_id: &str, deadline: Option<Instant>) -> ArticleResult {
        let article_id = uuid::Uuid::new_v4().to_string();
        let fragment = Fragment::from_article(article, &article_id);
        self.metrics.incr("articles_processed_total", 1);
        let result = self.process_fragment(&fragment, request_id, deadline).await;
        ArticleResult { request_id: request_id.to_string(), fragments: vec![result] }
    }

    pub async fn process_fragment(&self, fragment: &Fragment, request_id: &str, deadline: Option<Instant>) -> FragmentResult {
        let fragment_uuid = uuid::Uuid::new_v4();
        let total_stopwatch = Stopwatch::start(self.clock.as_ref());

        let mut warnings: Vec<String> = Vec::new();
        let mut per_phase_success = [false; 4];
        let mut per_phase_duration_ms = [0u64; 4];

        let cancelled_already = |deadline: Option<Instant>, clock: &Arc<dyn Clock>| {
            deadline.map(|d| clock.now() >= d).unwrap_or(false)
        };

        // --- Phase 1: Triage -------------------------------------------------
        let phase1_sw = Stopwatch::start(self.clock.as_ref());
        let (phase1, phase1_fallback) = if cancelled_already(deadline, &self.clock) {
            (triage::fallback(fragment, FallbackCause::Cancelled), true)
        } else {
            match triage::run(fragment, &self.llm).await {
                Ok(out) => (out, false),
                Err((cause, msg)) => {
                    tracing::warn!(phase = 1, %request_id, fragment_id = %fragment.fragment_id, error = %msg, "phase 1 fallback");
                    (triage::fallback(fragment, cause), true)
                }
            }
        };
        per_phase_duration_ms[0] = phase1_sw.elapsed_ms(self.clock.as_ref());
        per_phase_success[0] = !phase1_fallback;
        if phase1_fallback {
            warnings.push(format!("fase 1 fallback: {}", phase1.justification));
        }

        // --- Phase 2: Element Extraction -------------------------------------
        let phase2_sw = Stopwatch::start(self.clock.as_ref());
        let (phase2, phase2_fallback) = if cancelled_already(deadline, &self.clock) {
            (elements::fallback(fragment, FallbackCause::Cancelled), true)
        } else {
            match elements::run(&phase1, fragment, &self.llm).await {
                Ok(out) => (out, false),
                Err((cause, msg)) => {
                    tracing::warn!(phase = 2, %request_id, fragment_id = %fragment.fragment_id, error = %msg, "phase 2 fallback");
                    (elements::fallback(fragment, cause), true)
                }
            }
        };
        per_phase_duration_ms[1] = phase2_sw.elapsed_ms(self.clock.as_ref());
        per_phase_success[1] = !phase2_fallback;
        if phase2_fallback {
            warnings.push(format!("fase 2 fallback: {}", phase2.summary));
        }

        // --- Phase 3: Quotes & Quantitative Data -----------------------------
        let phase3_sw = Stopwatch::start(self.clock.as_ref());
        let (phase3, phase3_fallback, phase3_cause) = if cancelled_already(deadline, &self.clock) {
            (quotes::fallback(fragment, FallbackCause::Cancelled), true, Some(FallbackCause::Cancelled))
        } else {
            match quotes::run(&phase2, fragment, &self.llm).await {
                Ok(out) => (out, false, None),
                Err((cause, msg)) => {
                    tracing::warn!(phase = 3, %request_id, fragment_id = %fragment.fragment_id, error = %msg, "phase 3 fallback");
                    (quotes::fallback(fragment, cause), true, Some(cause))
                }
            }
        };
        per_phase_duration_ms[2] = phase3_sw.elapsed_ms(self.clock.as_ref());
        per_phase_success[2] = !phase3_fallback;
        if let Some(cause) = phase3_cause {
            warnings.push(format!("fase 3 fallback: {cause}"));
        }

        // --- Phase 4: Normalization -------------------------------------------
        let phase4_sw = Stopwatch::start(self.clock.as_ref());
        let (phase4, phase4_fallback) = if cancelled_already(deadline, &self.clock) {
            (normalize::fallback(&phase2, FallbackCause::Cancelled), true)
        } else {
            let result = normalize::run(&phase2, &phase3, fragment, &self.llm, &self.datastore, self.similarity_threshold).await;
            warnings.extend(result.warnings);
            (result.output, result.fallback_used)
        };
        per_phase_duration_ms[3] = phase4_sw.elapsed_ms(self.clock.as_ref());
        per_phase_success[3] = !phase4_fallback;

        self.metrics.record_fragment(per_phase_success, per_phase_duration_ms, None);

        let element_counts = ElementCounts {
            facts: phase2.facts.len(),
            entities: phase4.entities_with_normalized_refs.len(),
            quotes: phase3.quotes.len(),
            data: phase3.quantitative_data.len(),
        };
        // --- Persistence --------------------------------------------------
        let persistence = if phase2.facts.is_empty() && phase2.entities.is_empty() {
            warnings.push("no_data_to_persist".to_string());
            PersistenceOutcome::Ok { ok: true, inserted_counts: Default::default() }
        } else if let Some(payload) = persistence::build_payload(fragment, &phase2, &phase3, &phase4) {
            match self.datastore.insert_whole_fragment(payload).await {
                Ok(counts) => {
                    self.metrics.incr("persistence_success_total", 1);
                    let mut inserted_counts = std::collections::HashMap::new();
                    inserted_counts.insert("facts".to_string(), counts.facts);
                    inserted_counts.insert("entities".to_string(), counts.entities);
                    inserted_counts.insert("quotes".to_string(), counts.quotes);
                    inserted_counts.insert("data".to_string(), counts.data);
                    inserted_counts.insert("relations".to_string(), counts.relations);
                    PersistenceOutcome::Ok { ok: true, inserted_counts }
                }
                Err(err) => {
                    self.metrics.incr("persistence_failure_total", 1);
                    tracing::error!(%request_id, fragment_id = %fragment.fragment_id, error = %err, "persistence failed");
                    PersistenceOutcome::Err { ok: false, error: err.to_string() }
                }
            }
        } else {
            warnings.push("no_data_to_persist".to_string());
            PersistenceOutcome::Ok { ok: true, inserted_counts: Default::default() }
        };

        let phases_succeeded = per_phase_success.iter().filter(|s| **s).count();
        let overall_success_rate = phases_succeeded as f32 / 4.0;
        let total_duration_ms = total_stopwatch.elapsed_ms(self.clock.as_ref());

        FragmentResult {
            request_id: request_id.to_string(),
            fragment_id: fragment.fragment_id.clone(),
            fragment_uuid,
            phase_outputs: PhaseOutputs {
                phase1_meta: PhaseMeta { fallback_used: phase1_fallback, success: !phase1_fallback, duration_ms: per_phase_duration_ms[0] },
                phase1,
                phase2_meta: PhaseMeta { fallback_used: phase2_fallback, success: !phase2_fallback, duration_ms: per_phase_duration_ms[1] },
                phase2,
                phase3_meta: PhaseMeta { fallback_used: phase3_fallback, success: !phase3_fallback, duration_ms: per_phase_duration_ms[2] },
                phase3,
                phase4_meta: PhaseMeta { fallback_used: phase4_fallback, success: !phase4_fallback, duration_ms: per_phase_duration_ms[3] },
                phase4,
            },
            metrics: Metrics {
                per_phase_durations_ms: per_phase_duration_ms,
                per_phase_success,
                total_duration_ms,
                element_counts,
                overall_success_rate,
            },
            persistence,
            partial_processing: phase1_fallback || phase2_fallback || phase3_fallback || phase4_fallback,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        ChatCompletionRequest, ChatCompletionResponse, DatastoreClient, InsertCounts, LlmCallError, LlmClient,
        SimilarEntityMatch,
    };
    use crate::clock::SystemClock;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct AlwaysFailsLlm;
    #[async_trait]
    impl LlmClient for AlwaysFailsLlm {
        async fn complete(&self, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError> {
            Err(LlmCallError::ServerError(500))
        }
    }

    struct ScriptedLlm {
        triage_calls: AtomicUsize,
    }
    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError> {
            let text = match request.system_prompt.as_str() {
                "triage" => {
                    self.triage_calls.fetch_add(1, Ordering::SeqCst);
                    serde_json::json!({"is_relevant": true, "score": 0.9, "category": "economia", "justification": "ok", "keywords": ["iva"]}).to_string()
                }
                "extract_elements" => serde_json::json!({
                    "facts": [{"text": "El ministro anuncio una reduccion del IVA", "confidence": 0.9, "type": "ANNOUNCEMENT", "temporal_precision": "day"}],
                    "entities": [{"text": "Ministerio de Economia", "type": "ORGANIZATION", "relevance": 0.8, "descriptors": []}],
                    "summary": "Reduccion del IVA anunciada"
                }).to_string(),
                "extract_quotes_data" => serde_json::json!({"quotes": [], "quantitative_data": []}).to_string(),
                "derive_relations" => serde_json::json!({"fact_fact": [], "entity_entity": [], "contradictions": []}).to_string(),
                _ => serde_json::json!({}).to_string(),
            };
            Ok(ChatCompletionResponse { text })
        }
    }

    struct MockDatastore;
    #[async_trait]
    impl DatastoreClient for MockDatastore {
        async fn find_similar_entity(
            &self,
            _name: &str,
            _entity_type: &str,
            _threshold: f32,
        ) -> Result<Vec<SimilarEntityMatch>, DatastoreCallError> {
            Ok(vec![])
        }

        async fn insert_whole_fragment(&self, _payload: Value) -> Result<InsertCounts, DatastoreCallError> {
            Ok(InsertCounts { facts: 1, entities: 1, quotes: 0, data: 0, relations: 0 })
        }
    }

    fn article() -> Article {
        use std::collections::HashMap;
        Article {
            medio: "El Diario".into(),
            pais: "ES".into(),
            tipo_medio: "digital".into(),
            titular: "Ministro anuncia reduccion del IVA".into(),
            fecha_publicacion: chrono::Utc::now(),
            contenido_texto: "El ministro de economia anuncio hoy una reduccion del IVA para bienes basicos en todo el pais.".into(),
            idioma: None,
            autor: None,
            url: None,
            seccion: None,
            es_opinion: false,
            es_oficial: false,
            metadata: HashMap::new(),
        }
    }

    fn controller_with(llm: Arc<dyn LlmClient>, datastore: Arc<dyn DatastoreClient>) -> Controller {
        let llm = Arc::new(ResilientLlmClient::new(llm, 5, Duration::from_secs(30), Duration::from_secs(30)));
        let datastore = Arc::new(ResilientDatastoreClient::new(
            datastore,
            5,
            Duration::from_secs(30),
            Duration::from_secs(10),
            10,
            Duration::from_millis(200),
        ));
        Controller::new(llm, datastore, Arc::new(MetricsCollector::new()), Arc::new(SystemClock), 0.85)
    }

    #[tokio::test]
    async fn happy_path_all_phases_succeed() {
        let controller = controller_with(Arc::new(ScriptedLlm { triage_calls: AtomicUsize::new(0) }), Arc::new(MockDatastore));
        let result = controller.process_article(&article(), "req-1", None).await;
        let fragment = &result.fragments[0];
        assert!(!fragment.partial_processing);
        assert_eq!(fragment.metrics.overall_success_rate, 1.0);
        assert!(fragment.persistence.matches_ok());
        assert!(!fragment.phase_outputs.phase2.facts.is_empty());
    }

    #[tokio::test]
    async fn fallback_cascade_when_llm_always_fails() {
        let controller = controller_with(Arc::new(AlwaysFailsLlm), Arc::new(MockDatastore));
        let result = controller.process_article(&article(), "req-2", None).await;
        let fragment = &result.fragments[0];
        assert!(fragment.partial_processing);
        assert_eq!(fragment.metrics.per_phase_success, [false, false, false, false]);
        assert_eq!(fragment.metrics.overall_success_rate, 0.0);
        assert_eq!(fragment.phase_outputs.phase2.facts.len(), 1);
        assert!(fragment.phase_outputs.phase4.relations.fact_fact.is_empty());
        let warning_count = fragment.warnings.len();
        assert!(warning_count >= 4);
    }

    #[tokio::test]
    async fn no_facts_or_entities_skips_persistence() {
        struct EmptyLlm;
        #[async_trait]
        impl LlmClient for EmptyLlm {
            async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmCallError> {
                let text = match request.system_prompt.as_str() {
                    "triage" => serde_json::json!({"is_relevant": true, "score": 0.9, "category": "x", "justification": "ok", "keywords": []}).to_string(),
                    "extract_elements" => serde_json::json!({"facts": [], "entities": [], "summary": "nada"}).to_string(),
                    "extract_quotes_data" => serde_json::json!({"quotes": [], "quantitative_data": []}).to_string(),
                    "derive_relations" => serde_json::json!({"fact_fact": [], "entity_entity": [], "contradictions": []}).to_string(),
                    _ => serde_json::json!({}).to_string(),
                };
                Ok(ChatCompletionResponse { text })
            }
        }
        let controller = controller_with(Arc::new(EmptyLlm), Arc::new(MockDatastore));
        let result = controller.process_article(&article(), "req-3", None).await;
        let fragment = &result.fragments[0];
        assert!(fragment.warnings.contains(&"no_data_to_persist".to_string()));
        assert!(fragment.persistence.matches_ok());
    }

    #[tokio::test]
    async fn persistence_failure_is_isolated_from_processing_success() {
        struct FailingDatastore;
        #[async_trait]
        impl DatastoreClient for FailingDatastore {
            async fn find_similar_entity(
                &self,
                _name: &str,
                _entity_type: &str,
                _threshold: f32,
            ) -> Result<Vec<SimilarEntityMatch>, DatastoreCallError> {
                Ok(vec![])
            }
            async fn insert_whole_fragment(&self, _payload: Value) -> Result<InsertCounts, DatastoreCallError> {
                Err(DatastoreCallError::ValidationError)
            }
        }
        let controller = controller_with(Arc::new(ScriptedLlm { triage_calls: AtomicUsize::new(0) }), Arc::new(FailingDatastore));
        let result = controller.process_article(&article(), "req-4", None).await;
        let fragment = &result.fragments[0];
        assert!(!fragment.partial_processing);
        assert!(!fragment.persistence.matches_ok());
    }

    #[tokio::test]
    async fn cancelled_deadline_falls_back_every_remaining_phase() {
        let controller = controller_with(Arc::new(ScriptedLlm { triage_calls: AtomicUsize::new(0) }), Arc::new(MockDatastore));
        let already_passed = Instant::now() - Duration::from_secs(1);
        let result = controller.process_article(&article(), "req-5", Some(already_passed)).await;
        let fragment = &result.fragments[0];
        assert!(fragment.partial_processing);
        assert_eq!(fragment.metrics.overall_success_rate, 0.0);
    }
}
