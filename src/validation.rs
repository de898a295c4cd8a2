//! Input validation rules, applied by the HTTP surface before dispatch.
//! Kept in `pipeline-core` rather than `pipeline-web` because the
//! required-field list is a domain rule, not a transport concern —
//! `pipeline-web` only maps the resulting `FieldError`s to a 400.

use crate::errors::FieldError;
use crate::model::{Article, Fragment};
use serde_json::Value;

/// Minimum article/fragment body length in characters, configurable via
/// `MIN_CONTENT_LENGTH`; the constructor below reads that env var once at
/// startup.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    pub min_content_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig { min_content_length: 10 }
    }
}

impl ValidationConfig {
    pub fn from_env() -> Self {
        let min_content_length = std::env::var("MIN_CONTENT_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        ValidationConfig { min_content_length }
    }
}

fn field_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(|v| v.as_str())
}

/// Required-field presence check against the *raw* request body. Unlike
/// checking a already-deserialized `Article`/`Fragment`, this also catches
/// fields that are entirely absent from the JSON (a missing required
/// `String` field would otherwise fail serde deserialization before any
/// validation ran, surfacing as a bare 422 instead of a 400 with
/// `detalles`).
fn check_required(value: &Value, fields: &[&str], errors: &mut Vec<FieldError>) {
    for field in fields {
        match field_str(value, field) {
            Some(s) if !s.trim().is_empty() => {}
            _ => errors.push(FieldError { field: field.to_string(), error: "required".to_string() }),
        }
    }
}

/// Validates an article payload before it is deserialized into the typed
/// `Article`. Operates on the raw JSON so a missing key is reported as a
/// `required` field error rather than a deserialization failure.
pub fn validate_article_json(value: &Value, config: &ValidationConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_required(value, &["medio", "pais", "tipo_medio", "titular", "contenido_texto"], &mut errors);

    if let Some(text) = field_str(value, "contenido_texto") {
        if !text.trim().is_empty() && text.chars().count() < config.min_content_length {
            errors.push(FieldError {
                field: "contenido_texto".to_string(),
                error: format!("must be at least {} characters", config.min_content_length),
            });
        }
    }

    match value.get("fecha_publicacion") {
        Some(Value::String(s)) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => {}
        Some(Value::Null) | None => {
            errors.push(FieldError { field: "fecha_publicacion".to_string(), error: "required".to_string() });
        }
        _ => errors.push(FieldError {
            field: "fecha_publicacion".to_string(),
            error: "must be a parseable date".to_string(),
        }),
    }

    errors
}

/// Validates a fragment payload before it is deserialized into the typed
/// `Fragment`, for the same reason `validate_article_json` operates on raw
/// JSON rather than the typed struct.
pub fn validate_fragment_json(value: &Value, config: &ValidationConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_required(value, &["fragment_id", "texto_original", "id_articulo_fuente"], &mut errors);

    if let Some(text) = field_str(value, "texto_original") {
        if !text.trim().is_empty() && text.chars().count() < config.min_content_length {
            errors.push(FieldError {
                field: "texto_original".to_string(),
                error: format!("must be at least {} characters", config.min_content_length),
            });
        }
    }

    errors
}

/// Convenience wrapper for callers that already hold a typed `Article`
/// (internal tests, non-HTTP callers) — re-runs the same JSON-based rules
/// against its serialized form so there is exactly one validation
/// implementation.
pub fn validate_article(article: &Article, config: &ValidationConfig) -> Vec<FieldError> {
    validate_article_json(&serde_json::to_value(article).unwrap_or(Value::Null), config)
}

/// See `validate_article`.
pub fn validate_fragment(fragment: &Fragment, config: &ValidationConfig) -> Vec<FieldError> {
    validate_fragment_json(&serde_json::to_value(fragment).unwrap_or(Value::Null), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_article() -> Article {
        Article {
            medio: "El Diario".into(),
            pais: "ES".into(),
            tipo_medio: "digital".into(),
            titular: "Ministro anuncia reduccion del IVA".into(),
            fecha_publicacion: chrono::Utc::now(),
            contenido_texto: "El ministro de economia anuncio hoy una reduccion del IVA para bienes basicos.".into(),
            idioma: None,
            autor: None,
            url: None,
            seccion: None,
            es_opinion: false,
            es_oficial: false,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn valid_article_has_no_errors() {
        assert!(validate_article(&base_article(), &ValidationConfig::default()).is_empty());
    }

    #[test]
    fn missing_titular_is_reported() {
        let mut article = base_article();
        article.titular = String::new();
        let errors = validate_article(&article, &ValidationConfig::default());
        assert!(errors.iter().any(|e| e.field == "titular" && e.error == "required"));
    }

    #[test]
    fn content_below_minimum_length_is_rejected() {
        let mut article = base_article();
        article.contenido_texto = "corto".into();
        let errors = validate_article(&article, &ValidationConfig { min_content_length: 50 });
        assert!(errors.iter().any(|e| e.field == "contenido_texto"));
    }
}
