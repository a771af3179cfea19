use std::collections::HashSet;

use serde::Deserialize;

use crate::{Result, invalid_response};

#[derive(Debug, Deserialize)]
struct RerankResponse {
	#[serde(alias = "data")]
	results: Vec<RerankDatum>,
}

#[derive(Debug, Deserialize)]
struct RerankDatum {
	index: usize,
	#[serde(alias = "score")]
	relevance_score: f32,
}

/// Scores `docs` against `query` through a Cohere/Jina-style `/rerank` endpoint.
///
/// Returns `(doc index, score)` for the documents the provider ranked, in the provider's order.
/// Documents it left out are absent.
pub async fn rerank(
	cfg: &prism_config::ProviderConfig,
	query: &str,
	docs: &[String],
	top_n: usize,
) -> Result<Vec<(usize, f32)>> {
	let body = serde_json::json!({
		"model": cfg.model,
		"query": query,
		"documents": docs,
		"top_n": top_n,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let response: RerankResponse =
		crate::post_json(cfg.timeout_ms, &cfg.api_base, &cfg.path, headers, &body).await?;

	ranked(response, docs.len())
}

fn ranked(response: RerankResponse, doc_count: usize) -> Result<Vec<(usize, f32)>> {
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(response.results.len());

	for datum in response.results {
		if datum.index >= doc_count {
			return Err(invalid_response(format!(
				"Rerank index {} is out of range for {doc_count} documents.",
				datum.index
			)));
		}
		if !datum.relevance_score.is_finite() {
			return Err(invalid_response(format!("Rerank score for {} is not finite.", datum.index)));
		}
		if seen.insert(datum.index) {
			out.push((datum.index, datum.relevance_score));
		}
	}

	Ok(out)
}
