use std::time::Instant;

use prism_domain::{
	hybrid::{HybridMerger, KeywordCandidate},
	model::{CrossModelSearchResult, HybridSearchResult, SearchResult},
	score::clamp_score,
};

use crate::{
	Error, HybridSearchRequest, KeywordMatch, RankingAlgorithm, Result, SearchContext,
	SearchCoordinator,
	cross_model::CrossModelQuery,
	query_hash,
	stage::{Stage, StageOutcome, StageRecorder},
	types::{normalize_limit, normalize_min_similarity},
};

impl SearchCoordinator {
	/// Cross-model semantic ranking blended with full-text ranking over the same tenant rows.
	pub async fn hybrid_search(
		&self,
		ctx: &SearchContext,
		request: &HybridSearchRequest,
	) -> Result<Vec<HybridSearchResult>> {
		let mut stages = StageRecorder::new(ctx, "hybrid_search");
		let started = Instant::now();
		let query = request.query.trim();

		if query.is_empty() {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("hybrid search query cannot be empty"));
		}

		let embedding = request.query_embedding.as_deref().filter(|vector| !vector.is_empty());

		if embedding.is_some_and(|vector| vector.iter().any(|value| !value.is_finite())) {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("query embedding must contain only finite values"));
		}

		let limit = normalize_limit(request.limit, &self.defaults);
		let weight = request
			.hybrid_weight
			.filter(|weight| weight.is_finite())
			.map(clamp_score)
			.unwrap_or(self.defaults.hybrid_weight);
		let multiplier = self.cfg.search.hybrid.keyword_candidate_multiplier.max(1);
		let plan = CrossModelQuery {
			include_models: &request.include_models,
			exclude_models: &request.exclude_models,
			content_types: &request.content_types,
			metadata_filter: &request.metadata_filter,
			min_similarity: normalize_min_similarity(request.min_similarity, &self.defaults),
			candidates: limit.saturating_mul(multiplier),
			task: self.task_type(request.task_type),
		};

		stages.record(Stage::Validate, StageOutcome::Ok, started);
		stages.skip(Stage::Expand);

		tracing::info!(
			tenant_id = %ctx.tenant_id,
			correlation_id = %ctx.correlation_id,
			query_hash = %query_hash(query),
			limit,
			weight,
			task_type = plan.task.as_str(),
			"Hybrid search started."
		);

		let target = self
			.query_target(ctx, &mut stages, Some(query), embedding, request.query_model.as_deref())
			.await?;
		let semantic = self.cross_model_scored(ctx, &mut stages, &target, &plan).await?;
		let keyword_options = plan.repository_options(ctx, RankingAlgorithm::FullText);
		let keyword_started = Instant::now();
		let keyword = match self.executor.keyword_search(ctx, query, &keyword_options).await {
			Ok(matches) => {
				stages.record(Stage::Retrieve, StageOutcome::Ok, keyword_started);

				matches
			},
			Err(err) if matches!(err, Error::Cancelled { .. } | Error::DeadlineExceeded { .. }) =>
				return Err(err),
			Err(err) => {
				tracing::warn!(
					tenant_id = %ctx.tenant_id,
					correlation_id = %ctx.correlation_id,
					query_hash = %query_hash(query),
					error = %err,
					"Keyword search failed; ranking on semantic scores only."
				);
				stages.record(Stage::Retrieve, StageOutcome::Degraded, keyword_started);

				Vec::new()
			},
		};
		let keyword: Vec<KeywordCandidate> =
			keyword.into_iter().map(|hit| self.keyword_candidate(hit)).collect();
		let merger = HybridMerger::with_rank_scale(weight, self.cfg.search.hybrid.keyword_rank_scale);
		let mut merged = merger.merge(semantic, keyword);

		merged.truncate(limit as usize);
		stages.skip(Stage::Rerank);
		stages.finish();

		Ok(merged)
	}

	/// Keyword-only matches carry no semantic evidence; their model quality still comes from the
	/// calibration tables.
	fn keyword_candidate(&self, hit: KeywordMatch) -> KeywordCandidate {
		let model_name = hit.content.model.clone();
		let model_quality = self.normalizer.tables().quality(&model_name);
		let mut result = SearchResult::new(hit.content, 0.0);

		result.record_match("keyword_rank", hit.rank);

		KeywordCandidate {
			result: CrossModelSearchResult {
				result,
				model_name,
				model_dimensions: hit.model_dimensions,
				raw_similarity: 0.0,
				model_quality: clamp_score(model_quality),
				final_score: 0.0,
			},
			rank: hit.rank,
		}
	}
}
