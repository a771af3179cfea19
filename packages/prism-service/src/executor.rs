use std::sync::Arc;

use uuid::Uuid;

use prism_domain::{model::SearchResult, score::clamp_score};

use crate::{
	KeywordMatch, RankingAlgorithm, RepositoryHit, RepositoryOptions, Result, SearchContext,
	SearchOptions, SearchRepository,
};

/// Translates engine options into repository calls and repository rows back into engine results.
/// Every row passes the tenant guard before it leaves this type.
#[derive(Clone)]
pub struct VectorSearchExecutor {
	repository: Arc<dyn SearchRepository>,
}
impl VectorSearchExecutor {
	pub fn new(repository: Arc<dyn SearchRepository>) -> Self {
		Self { repository }
	}

	pub fn repository_options(
		ctx: &SearchContext,
		options: &SearchOptions,
		model: Option<&str>,
	) -> RepositoryOptions {
		RepositoryOptions {
			tenant_id: ctx.tenant_id,
			limit: options.window(),
			min_similarity: options.min_similarity,
			metadata_filter: options.metadata_filter.clone(),
			content_types: options.content_types.clone(),
			include_models: model.map(|model| vec![model.to_string()]).unwrap_or_default(),
			exclude_models: Vec::new(),
			algorithm: RankingAlgorithm::Cosine,
		}
	}

	/// Same-model vector search. `model` restricts rows to the embedding space of `vector`.
	pub async fn search_by_vector(
		&self,
		ctx: &SearchContext,
		vector: &[f32],
		model: Option<&str>,
		options: &SearchOptions,
	) -> Result<Vec<SearchResult>> {
		let repo_options = Self::repository_options(ctx, options, model);
		let hits = ctx
			.run("retrieve", self.repository.search_by_vector(vector, &repo_options))
			.await
			.map_err(|err| err.context("search by vector"))?;

		Ok(into_results(ctx, "search by vector", hits))
	}

	pub async fn search_by_content_id(
		&self,
		ctx: &SearchContext,
		content_id: Uuid,
		options: &SearchOptions,
	) -> Result<Vec<SearchResult>> {
		let repo_options = Self::repository_options(ctx, options, options.model_hint.as_deref());
		let hits = ctx
			.run("retrieve", self.repository.search_by_content_id(content_id, &repo_options))
			.await
			.map_err(|err| err.context("search by content id"))?;

		Ok(into_results(ctx, "search by content id", hits))
	}

	pub async fn cross_model_candidates(
		&self,
		ctx: &SearchContext,
		vector: &[f32],
		options: &RepositoryOptions,
	) -> Result<Vec<RepositoryHit>> {
		let hits = ctx
			.run("retrieve", self.repository.cross_model_candidates(vector, options))
			.await
			.map_err(|err| err.context("cross-model search"))?
			.unwrap_or_default();
		let hits = retain_tenant(ctx, "cross-model search", hits, |hit| hit.content.tenant_id);

		Ok(hits.into_iter().filter(is_well_formed).collect())
	}

	pub async fn keyword_search(
		&self,
		ctx: &SearchContext,
		query: &str,
		options: &RepositoryOptions,
	) -> Result<Vec<KeywordMatch>> {
		let matches = ctx
			.run("retrieve", self.repository.keyword_search(query, options))
			.await
			.map_err(|err| err.context("keyword search"))?
			.unwrap_or_default();
		let matches = retain_tenant(ctx, "keyword search", matches, |hit| hit.content.tenant_id);

		Ok(matches
			.into_iter()
			.filter(|hit| !hit.content.content_id.is_nil() && hit.rank.is_finite())
			.collect())
	}
}

fn into_results(
	ctx: &SearchContext,
	op: &'static str,
	hits: Option<Vec<RepositoryHit>>,
) -> Vec<SearchResult> {
	let Some(hits) = hits else { return Vec::new() };
	let hits = retain_tenant(ctx, op, hits, |hit| hit.content.tenant_id);

	hits.into_iter().filter(is_well_formed).map(to_search_result).collect()
}

fn is_well_formed(hit: &RepositoryHit) -> bool {
	!hit.content.content_id.is_nil() && hit.similarity.is_finite()
}

fn to_search_result(hit: RepositoryHit) -> SearchResult {
	let mut result = SearchResult::new(hit.content, hit.similarity);

	result.record_match("similarity", result.score);
	result.record_match("raw_similarity", clamp_score(hit.raw_similarity));
	result.record_match("model_dimensions", hit.model_dimensions);

	result
}

/// Drops rows that belong to another tenant. The repository already filters by tenant; this is the
/// last line before results leave the engine.
pub(crate) fn retain_tenant<T>(
	ctx: &SearchContext,
	op: &'static str,
	items: Vec<T>,
	tenant_of: impl Fn(&T) -> Uuid,
) -> Vec<T> {
	let before = items.len();
	let kept: Vec<T> = items.into_iter().filter(|item| tenant_of(item) == ctx.tenant_id).collect();
	let dropped = before - kept.len();

	if dropped > 0 {
		tracing::warn!(
			tenant_id = %ctx.tenant_id,
			correlation_id = %ctx.correlation_id,
			operation = op,
			dropped,
			"Dropped rows from another tenant."
		);
	}

	kept
}
