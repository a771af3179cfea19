use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use serde_json::{Map, Value};
use uuid::Uuid;

use prism_domain::{
	model::{EmbeddingVector, SearchResult},
	score::{clamp_score, sort_ranked},
};

use crate::{RerankCandidate, RerankOptions, RerankedItem, Reranker, SearchContext, query_hash};

const SYNTHETIC_CONTENT_TYPE: &str = "reranked";
const SYNTHETIC_MODEL: &str = "reranker";

/// Optional final stage. Never fails: reranker errors leave the input untouched.
#[derive(Clone)]
pub struct RerankAdapter {
	reranker: Arc<dyn Reranker>,
}
impl RerankAdapter {
	pub fn new(reranker: Arc<dyn Reranker>) -> Self {
		Self { reranker }
	}

	/// Returns `Ok` with the reranked list, or `Err` with the untouched input after logging why the
	/// reranker could not be used.
	pub async fn rerank(
		&self,
		ctx: &SearchContext,
		query: &str,
		results: Vec<SearchResult>,
		top_k: usize,
	) -> Result<Vec<SearchResult>, Vec<SearchResult>> {
		if results.is_empty() {
			return Ok(results);
		}

		let candidates: Vec<RerankCandidate> = results.iter().map(to_candidate).collect();
		let options = RerankOptions { top_k: top_k.max(1) };
		let reranked =
			ctx.run("rerank", self.reranker.rerank(query, &candidates, &options)).await;

		match reranked {
			Ok(items) => Ok(reconcile(ctx.tenant_id, results, items)),
			Err(err) => {
				tracing::warn!(
					tenant_id = %ctx.tenant_id,
					correlation_id = %ctx.correlation_id,
					query_hash = %query_hash(query),
					candidates = candidates.len(),
					error = %err,
					"Rerank failed; keeping pre-rerank order."
				);

				Err(results)
			},
		}
	}
}

fn to_candidate(result: &SearchResult) -> RerankCandidate {
	let text = result
		.content
		.text()
		.map(str::to_string)
		.unwrap_or_else(|| result.content_id().to_string());

	RerankCandidate {
		id: result.content_id(),
		text,
		score: result.score,
		metadata: result.content.metadata.clone(),
	}
}

/// Folds reranker verdicts onto the original results. Results the reranker did not return are
/// dropped; verdicts for unknown ids become minimal synthesized results.
fn reconcile(
	tenant_id: Uuid,
	results: Vec<SearchResult>,
	items: Vec<RerankedItem>,
) -> Vec<SearchResult> {
	let mut originals: HashMap<Uuid, SearchResult> =
		results.into_iter().map(|result| (result.content_id(), result)).collect();
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(items.len());

	for item in items {
		let id = item.id.unwrap_or_else(|| synthetic_id(item.text.as_deref().unwrap_or_default()));

		if !seen.insert(id) {
			continue;
		}

		let score = clamp_score(item.score);
		let mut result = match originals.remove(&id) {
			Some(mut original) => {
				original.record_match("pre_rerank_score", original.score);

				original
			},
			None => synthesize(tenant_id, id, item.text.as_deref()),
		};

		merge_metadata(&mut result.content.metadata, item.metadata);
		result.score = score;
		result.record_match("rerank_score", score);
		out.push(result);
	}

	sort_ranked(&mut out, |result| (result.score, result.content_id()));

	out
}

fn merge_metadata(target: &mut Map<String, Value>, added: Map<String, Value>) {
	for (key, value) in added {
		target.insert(key, value);
	}
}

fn synthesize(tenant_id: Uuid, id: Uuid, text: Option<&str>) -> SearchResult {
	let mut metadata = Map::new();

	if let Some(text) = text {
		metadata.insert("content".to_string(), Value::from(text));
	}

	SearchResult::new(
		EmbeddingVector {
			content_id: id,
			tenant_id,
			content_type: SYNTHETIC_CONTENT_TYPE.to_string(),
			model: SYNTHETIC_MODEL.to_string(),
			vector: Vec::new(),
			metadata,
		},
		0.0,
	)
}

fn synthetic_id(text: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes())
}
