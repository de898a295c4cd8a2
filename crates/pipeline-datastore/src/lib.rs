//! `pipeline-datastore`: a `tonic` gRPC client implementing
//! `pipeline_core::adapters::DatastoreClient`, grounded in
//! `entity-gateway`'s `build.rs`/`tonic`/`prost` stack (this repo's closest
//! example of a hand-rolled gRPC service over a proto contract compiled at
//! build time).

pub mod proto;

use async_trait::async_trait;
use pipeline_core::adapters::{DatastoreCallError, DatastoreClient, InsertCounts, SimilarEntityMatch};
use proto::ob::pipeline::v1::{
    pipeline_datastore_client::PipelineDatastoreClient, FindSimilarEntityRequest, InsertWholeFragmentRequest,
};
use tonic::transport::Channel;

/// Thin wrapper around the generated tonic client. `connect_lazy` (rather
/// than an eager `connect`) matches `entity-gateway`'s client construction:
/// the channel is usable immediately and resolves the connection on first
/// call, so `pipeline-web`'s startup doesn't block on datastore
/// reachability (that's `/health/detailed`'s job).
#[derive(Clone)]
pub struct GrpcDatastoreClient {
    inner: PipelineDatastoreClient<Channel>,
}

impl GrpcDatastoreClient {
    pub fn connect_lazy(endpoint: String) -> anyhow::Result<Self> {
        let channel = Channel::from_shared(endpoint)?.connect_lazy();
        Ok(GrpcDatastoreClient { inner: PipelineDatastoreClient::new(channel) })
    }
}

fn classify_status(status: &tonic::Status) -> DatastoreCallError {
    use tonic::Code;
    let classified = match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Aborted | Code::Cancelled => {
            DatastoreCallError::ConnectionError
        }
        Code::ResourceExhausted => DatastoreCallError::PoolExhausted,
        _ => DatastoreCallError::ValidationError,
    };
    tracing::warn!(code = ?status.code(), message = status.message(), "datastore rpc returned an error status");
    classified
}

#[async_trait]
impl DatastoreClient for GrpcDatastoreClient {
    async fn find_similar_entity(
        &self,
        name: &str,
        entity_type: &str,
        threshold: f32,
    ) -> Result<Vec<SimilarEntityMatch>, DatastoreCallError> {
        let mut client = self.inner.clone();
        let request = tonic::Request::new(FindSimilarEntityRequest {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            threshold,
        });
        let response = client.find_similar_entity(request).await.map_err(|s| classify_status(&s))?;
        Ok(response
            .into_inner()
            .matches
            .into_iter()
            .map(|m| SimilarEntityMatch { id: m.id, normalized_name: m.normalized_name, similarity: m.similarity })
            .collect())
    }

    async fn insert_whole_fragment(&self, payload: serde_json::Value) -> Result<InsertCounts, DatastoreCallError> {
        let mut client = self.inner.clone();
        let request = tonic::Request::new(InsertWholeFragmentRequest { payload_json: payload.to_string() });
        let response = client.insert_whole_fragment(request).await.map_err(|s| classify_status(&s))?;
        let body = response.into_inner();
        Ok(InsertCounts {
            facts: body.facts as usize,
            entities: body.entities as usize,
            quotes: body.quotes as usize,
            data: body.data as usize,
            relations: body.relations as usize,
        })
    }
}

/// In-memory test double: records every `insert_whole_fragment` payload and
/// plays back a scripted `find_similar_entity` response, instead of
/// monkey-patching a mock client's attributes.
pub struct MockDatastoreClient {
    pub similar_entities: std::sync::Mutex<Vec<SimilarEntityMatch>>,
    pub insert_result: std::sync::Mutex<Result<InsertCounts, DatastoreCallError>>,
    pub inserted_payloads: std::sync::Mutex<Vec<serde_json::Value>>,
}

impl Default for MockDatastoreClient {
    fn default() -> Self {
        MockDatastoreClient {
            similar_entities: std::sync::Mutex::new(vec![]),
            insert_result: std::sync::Mutex::new(Ok(InsertCounts::default())),
            inserted_payloads: std::sync::Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl DatastoreClient for MockDatastoreClient {
    async fn find_similar_entity(
        &self,
        _name: &str,
        _entity_type: &str,
        _threshold: f32,
    ) -> Result<Vec<SimilarEntityMatch>, DatastoreCallError> {
        Ok(self.similar_entities.lock().unwrap().clone())
    }

    async fn insert_whole_fragment(&self, payload: serde_json::Value) -> Result<InsertCounts, DatastoreCallError> {
        self.inserted_payloads.lock().unwrap().push(payload);
        self.insert_result.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_inserted_payloads() {
        let mock = MockDatastoreClient::default();
        mock.insert_whole_fragment(serde_json::json!({"fragment_id": "f1"})).await.unwrap();
        assert_eq!(mock.inserted_payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mock_returns_scripted_similar_entities() {
        let mock = MockDatastoreClient::default();
        mock.similar_entities.lock().unwrap().push(SimilarEntityMatch {
            id: "e1".into(),
            normalized_name: "Banco Central".into(),
            similarity: 0.92,
        });
        let matches = mock.find_similar_entity("Banco Central", "ORGANIZATION", 0.85).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "e1");
    }
}
