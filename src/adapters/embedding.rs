//! `embedding` adapter (C2): batches texts up to `maxBatchSize` per
//! request, running up to `maxConcurrentBatches` requests concurrently
//! under a local semaphore; results preserve input order (§4.2).

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::ports::ModelAdapterError;
use crate::infrastructure::provider::ProviderClient;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    extra_body: EmbeddingExtraBody,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingExtraBody {
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Whether `input` vectors are queries or passages being indexed, per the
/// wire contract's `extra_body.input_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInputType {
    Query,
    Passage,
}

impl EmbeddingInputType {
    const fn as_wire_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Passage => "passage",
        }
    }
}

pub struct EmbeddingAdapter {
    provider_model_id: String,
    client: ProviderClient,
    max_batch_size: usize,
    max_concurrent_batches: usize,
}

impl EmbeddingAdapter {
    #[must_use]
    pub fn new(provider_model_id: impl Into<String>, client: ProviderClient) -> Self {
        Self {
            provider_model_id: provider_model_id.into(),
            client,
            max_batch_size: 100,
            max_concurrent_batches: 5,
        }
    }

    #[must_use]
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Embed `texts`, preserving input order regardless of the order batches
    /// complete in.
    #[instrument(skip(self, texts, cancel))]
    pub async fn embed_batch(
        &self,
        texts: &[String],
        input_type: EmbeddingInputType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, ModelAdapterError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<(usize, &[String])> = texts
            .chunks(self.max_batch_size)
            .scan(0usize, |offset, chunk| {
                let start = *offset;
                *offset += chunk.len();
                Some((start, chunk))
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_batches));

        let futures = chunks.into_iter().map(|(offset, chunk)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Err(ModelAdapterError::Internal("request cancelled".to_string()));
                    }
                    permit = semaphore.acquire() => permit.map_err(|e| {
                        ModelAdapterError::Internal(format!("semaphore closed: {e}"))
                    })?,
                };

                let embeddings = self.send_batch(chunk, input_type, cancel).await?;
                Ok::<_, ModelAdapterError>((offset, embeddings))
            }
        });

        let mut results = try_join_all(futures).await?;
        results.sort_by_key(|(offset, _)| *offset);

        let mut ordered = Vec::with_capacity(texts.len());
        for (_, embeddings) in results {
            ordered.extend(embeddings);
        }
        Ok(ordered)
    }

    async fn send_batch(
        &self,
        chunk: &[String],
        input_type: EmbeddingInputType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, ModelAdapterError> {
        let body = EmbeddingRequest {
            model: &self.provider_model_id,
            input: chunk,
            encoding_format: "float",
            extra_body: EmbeddingExtraBody {
                input_type: input_type.as_wire_str(),
                truncate: "NONE",
            },
        };

        let response: EmbeddingResponse = self
            .client
            .send_json(&body, "/v1/embeddings", cancel)
            .await
            .map_err(super::chat::map_provider_error)?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_size_matches_spec() {
        let client = ProviderClient::new(crate::infrastructure::provider::ProviderClientConfig::new(
            "test",
            "https://example.invalid",
            "key",
        ))
        .unwrap();
        let adapter = EmbeddingAdapter::new("embed-1", client);
        assert_eq!(adapter.max_batch_size(), 100);
    }
}
