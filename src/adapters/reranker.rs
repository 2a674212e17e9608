//! `reranker` adapter (C2): scores passages against a query, returning
//! them sorted descending and filtered below a threshold. Splits inputs
//! larger than `maxPassagesPerRequest` into parallel chunks, then merges
//! and re-sorts globally (§4.2).

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::ports::ModelAdapterError;
use crate::infrastructure::provider::ProviderClient;

#[derive(Debug, Clone, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: RerankQuery<'a>,
    passages: Vec<RerankPassage<'a>>,
    truncate: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct RerankQuery<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct RerankPassage<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct RerankResponse {
    rankings: Vec<RerankRanking>,
}

#[derive(Debug, Clone, Deserialize)]
struct RerankRanking {
    index: usize,
    score: f32,
}

/// One passage's rank relative to the original, unchunked input order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPassage {
    pub original_index: usize,
    pub score: f32,
}

pub struct RerankerAdapter {
    provider_model_id: String,
    client: ProviderClient,
    threshold: f32,
    max_passages_per_request: usize,
}

impl RerankerAdapter {
    #[must_use]
    pub fn new(provider_model_id: impl Into<String>, client: ProviderClient) -> Self {
        Self {
            provider_model_id: provider_model_id.into(),
            client,
            threshold: 0.7,
            max_passages_per_request: 1000,
        }
    }

    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Rerank `passages` against `query`, returning only those scoring at
    /// or above the configured threshold, sorted descending by score.
    #[instrument(skip(self, query, passages, cancel))]
    pub async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedPassage>, ModelAdapterError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<(usize, &[String])> = passages
            .chunks(self.max_passages_per_request)
            .scan(0usize, |offset, chunk| {
                let start = *offset;
                *offset += chunk.len();
                Some((start, chunk))
            })
            .collect();

        let futures = chunks.into_iter().map(|(offset, chunk)| {
            let query = query.to_string();
            async move {
                let body = RerankRequest {
                    model: &self.provider_model_id,
                    query: RerankQuery { text: &query },
                    passages: chunk.iter().map(|t| RerankPassage { text: t }).collect(),
                    truncate: "END",
                };
                let response: RerankResponse = self
                    .client
                    .send_json(&body, "/v1/rerank", cancel)
                    .await
                    .map_err(super::chat::map_provider_error)?;

                Ok::<_, ModelAdapterError>(
                    response
                        .rankings
                        .into_iter()
                        .map(|r| RankedPassage {
                            original_index: offset + r.index,
                            score: r.score,
                        })
                        .collect::<Vec<_>>(),
                )
            }
        });

        let mut ranked: Vec<RankedPassage> = try_join_all(futures).await?.into_iter().flatten().collect();
        ranked.retain(|r| r.score >= self.threshold);
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_matches_spec() {
        let client = ProviderClient::new(crate::infrastructure::provider::ProviderClientConfig::new(
            "test",
            "https://example.invalid",
            "key",
        ))
        .unwrap();
        let adapter = RerankerAdapter::new("rerank-1", client);
        assert!((adapter.threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_global_sort_is_descending() {
        let mut ranked = vec![
            RankedPassage { original_index: 0, score: 0.5 },
            RankedPassage { original_index: 1, score: 0.9 },
            RankedPassage { original_index: 2, score: 0.71 },
        ];
        ranked.retain(|r| r.score >= 0.7);
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        assert_eq!(ranked[0].original_index, 1);
        assert_eq!(ranked[1].original_index, 2);
        assert_eq!(ranked.len(), 2);
    }
}
