use std::sync::Arc;

use tokio::{
	sync::{Semaphore, mpsc},
	task::JoinSet,
};

use prism_domain::{
	fanout::{self as merge, VariantResults},
	model::SearchResult,
};

use crate::{
	EmbeddingService, Error, Result, SearchContext, SearchOptions, VectorSearchExecutor, query_hash,
};

const QUERY_CONTENT_TYPE: &str = "query";

struct VariantReport {
	index: usize,
	query: String,
	outcome: Result<Vec<SearchResult>>,
}

/// Searches every query variant concurrently and merges the results by content id.
#[derive(Clone)]
pub struct MultiQueryFanout {
	executor: VectorSearchExecutor,
	embedding: Arc<dyn EmbeddingService>,
	max_concurrency: usize,
}
impl MultiQueryFanout {
	pub fn new(
		executor: VectorSearchExecutor,
		embedding: Arc<dyn EmbeddingService>,
		max_concurrency: usize,
	) -> Self {
		Self { executor, embedding, max_concurrency: max_concurrency.max(1) }
	}

	/// Variant 0 is the original query. Fails only when every variant failed, with the error of
	/// the lowest-index variant. The merged list is truncated to `options.window()`.
	pub async fn run(
		&self,
		ctx: &SearchContext,
		queries: &[String],
		options: &SearchOptions,
	) -> Result<Vec<SearchResult>> {
		if queries.is_empty() {
			return Ok(Vec::new());
		}

		let permits = Arc::new(Semaphore::new(self.max_concurrency));
		let (tx, mut rx) = mpsc::channel::<VariantReport>(queries.len());
		let mut tasks = JoinSet::new();

		for (index, query) in queries.iter().enumerate() {
			let tx = tx.clone();
			let ctx = ctx.clone();
			let query = query.clone();
			let options = options.clone();
			let permits = permits.clone();
			let executor = self.executor.clone();
			let embedding = self.embedding.clone();

			tasks.spawn(async move {
				let outcome = match permits.acquire_owned().await {
					Ok(_permit) =>
						search_variant(&ctx, &executor, embedding.as_ref(), &query, &options).await,
					Err(_) => Err(Error::Cancelled { stage: "fanout".to_string() }),
				};
				let _ = tx.send(VariantReport { index, query, outcome }).await;
			});
		}

		drop(tx);

		let mut variants = Vec::with_capacity(queries.len());
		let mut failures: Vec<(usize, Error)> = Vec::new();

		for _ in 0..queries.len() {
			// `None` only when a task died without reporting; the rest still count.
			let Some(report) = rx.recv().await else { break };

			match report.outcome {
				Ok(results) => variants.push(VariantResults {
					index: report.index,
					query: report.query,
					results,
				}),
				Err(err) => {
					tracing::warn!(
						tenant_id = %ctx.tenant_id,
						correlation_id = %ctx.correlation_id,
						variant = report.index,
						query_hash = %query_hash(&report.query),
						error = %err,
						"Query variant failed; excluding it from the merge."
					);

					failures.push((report.index, err));
				},
			}
		}

		tasks.abort_all();

		if variants.is_empty() {
			failures.sort_by_key(|(index, _)| *index);

			return Err(failures.into_iter().map(|(_, err)| err).next().unwrap_or_else(|| {
				Error::Provider { message: "fan-out: no query variant reported.".to_string() }
			}));
		}

		tracing::debug!(
			tenant_id = %ctx.tenant_id,
			correlation_id = %ctx.correlation_id,
			variants = queries.len(),
			succeeded = variants.len(),
			failed = failures.len(),
			"Fan-out merged."
		);

		Ok(merge::merge_weighted(variants, options.window() as usize))
	}
}

async fn search_variant(
	ctx: &SearchContext,
	executor: &VectorSearchExecutor,
	embedding: &dyn EmbeddingService,
	query: &str,
	options: &SearchOptions,
) -> Result<Vec<SearchResult>> {
	let vector = embed_query(ctx, embedding, query, options.model_hint.as_deref()).await?;

	executor.search_by_vector(ctx, &vector.vector, Some(vector.model.as_str()), options).await
}

pub(crate) async fn embed_query(
	ctx: &SearchContext,
	embedding: &dyn EmbeddingService,
	query: &str,
	model_hint: Option<&str>,
) -> Result<prism_domain::model::EmbeddingVector> {
	let vector = ctx
		.run("embed", embedding.generate_embedding(query, QUERY_CONTENT_TYPE, model_hint))
		.await
		.map_err(|err| err.context("generate embedding"))?;

	if vector.vector.is_empty() {
		return Err(Error::Provider {
			message: "generate embedding: provider returned an empty vector.".to_string(),
		});
	}

	Ok(vector)
}
