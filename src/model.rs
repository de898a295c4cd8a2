//! Domain entities shared by the phase chain, the persistence payload
//! builder, and the HTTP surface's response bodies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw article as received by the HTTP surface. Immutable; discarded after
/// fragmentation by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub medio: String,
    pub pais: String,
    pub tipo_medio: String,
    pub titular: String,
    pub fecha_publicacion: chrono::DateTime<chrono::Utc>,
    pub contenido_texto: String,
    #[serde(default)]
    pub idioma: Option<String>,
    #[serde(default)]
    pub autor: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub seccion: Option<String>,
    #[serde(default)]
    pub es_opinion: bool,
    #[serde(default)]
    pub es_oficial: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Unit of work handed to the controller. One per article in the base case;
/// the Connector may also submit fragments directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub fragment_id: String,
    pub texto_original: String,
    pub id_articulo_fuente: String,
    #[serde(default)]
    pub orden: u32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Fragment {
    /// The trivial one-fragment-per-article split that is the base case for
    /// splitting an article into fragments.
    ///
    /// Stashes `titular`/`medio` into metadata: phase 2's fallback
    /// synthesizes a Fact from the headline and an Entity from the
    /// medium name, and the fragment — not the article — is what survives
    /// into the phase chain.
    pub fn from_article(article: &Article, article_id: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("titular".to_string(), serde_json::Value::String(article.titular.clone()));
        metadata.insert("medio".to_string(), serde_json::Value::String(article.medio.clone()));
        Fragment {
            fragment_id: format!("{article_id}-f0"),
            texto_original: article.contenido_texto.clone(),
            id_articulo_fuente: article_id.to_string(),
            orden: 0,
            metadata,
        }
    }

    pub fn titular(&self) -> String {
        self.metadata
            .get("titular")
            .and_then(|v| v.as_str())
            .unwrap_or("(sin titular)")
            .to_string()
    }

    pub fn medio(&self) -> String {
        self.metadata
            .get("medio")
            .and_then(|v| v.as_str())
            .unwrap_or("(medio desconocido)")
            .to_string()
    }
}

/// Phase-1 (Triage) decision. `FALLBACK_ACCEPTED_*` variants are emitted only
/// by `phases::triage::fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageDecision {
    Process,
    Discard,
    FallbackAcceptedPreprocessingError,
    FallbackAcceptedLlmError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase1Output {
    pub is_relevant: bool,
    pub decision: TriageDecision,
    pub justification: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub score: f32,
    pub cleaned_text_for_next_phase: String,
    pub translation_attempted: bool,
    pub model_metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FactType {
    Event,
    Statement,
    Announcement,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: u32,
    pub source_fragment_id: String,
    pub text: String,
    pub confidence: f32,
    #[serde(rename = "type")]
    pub kind: FactType,
    pub temporal_precision: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Person,
    Organization,
    Place,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub source_fragment_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub relevance: f32,
    pub descriptors: Vec<String>,
    #[serde(default)]
    pub normalized_id: Option<String>,
    #[serde(default)]
    pub normalized_name: Option<String>,
    #[serde(default)]
    pub normalization_similarity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase2Output {
    pub facts: Vec<Fact>,
    pub entities: Vec<Entity>,
    pub summary: String,
    pub metadata: Phase2Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Phase2Metadata {
    #[serde(default)]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: u32,
    pub source_fragment_id: String,
    pub text: String,
    pub speaker_text: String,
    #[serde(default)]
    pub cited_entity_id: Option<u32>,
    pub context: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datum {
    pub id: u32,
    pub source_fragment_id: String,
    pub description: String,
    pub value: f64,
    pub unit: String,
    pub period_reference: String,
    pub category: String,
    pub trend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase3Output {
    pub quotes: Vec<Quote>,
    pub quantitative_data: Vec<Datum>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRelation {
    pub fact_a_id: u32,
    pub fact_b_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub strength: f32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelation {
    pub entity_a_id: u32,
    pub entity_b_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub strength: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub fact_a_id: u32,
    pub fact_b_id: u32,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relations {
    pub fact_fact: Vec<FactRelation>,
    pub entity_entity: Vec<EntityRelation>,
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationStatus {
    Completed,
    CompletedWithoutNormalization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase4Output {
    pub entities_with_normalized_refs: Vec<Entity>,
    pub relations: Relations,
    pub status: NormalizationStatus,
    pub metadata: serde_json::Value,
}

/// One phase's outcome, carried alongside `fallback_used`/duration by the
/// controller, which folds each phase's `Result<T, (FallbackCause, String)>`
/// into this for the final response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMeta {
    pub fallback_used: bool,
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutputs {
    pub phase1: Phase1Output,
    pub phase1_meta: PhaseMeta,
    pub phase2: Phase2Output,
    pub phase2_meta: PhaseMeta,
    pub phase3: Phase3Output,
    pub phase3_meta: PhaseMeta,
    pub phase4: Phase4Output,
    pub phase4_meta: PhaseMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementCounts {
    pub facts: usize,
    pub entities: usize,
    pub quotes: usize,
    pub data: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub per_phase_durations_ms: [u64; 4],
    pub per_phase_success: [bool; 4],
    pub total_duration_ms: u64,
    pub element_counts: ElementCounts,
    pub overall_success_rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistenceOutcome {
    Ok {
        ok: bool,
        inserted_counts: HashMap<String, usize>,
    },
    Err {
        ok: bool,
        error: String,
    },
}

impl PersistenceOutcome {
    pub fn matches_ok(&self) -> bool {
        matches!(self, PersistenceOutcome::Ok { ok: true, .. })
    }
}

/// Aggregated, protocol-free result of processing one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentResult {
    pub request_id: String,
    pub fragment_id: String,
    pub fragment_uuid: uuid::Uuid,
    pub phase_outputs: PhaseOutputs,
    pub metrics: Metrics,
    pub persistence: PersistenceOutcome,
    pub partial_processing: bool,
    pub warnings: Vec<String>,
}

/// Result of `process_article`: one `FragmentResult` per fragment produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResult {
    pub request_id: String,
    pub fragments: Vec<FragmentResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}
