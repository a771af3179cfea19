use std::{collections::HashSet, time::Instant};

use serde_json::{Map, Value};

use prism_domain::{
	model::{CrossModelSearchResult, SearchResult},
	normalizer::TaskType,
	score::{clamp_score, sort_ranked},
};

use crate::{
	CrossModelSearchRequest, Error, RankingAlgorithm, RepositoryHit, RepositoryOptions, Result,
	SearchContext, SearchCoordinator,
	fanout::embed_query,
	query_hash,
	stage::{Stage, StageOutcome, StageRecorder},
	types::{normalize_limit, normalize_min_similarity},
};

/// Over-fetch factor for cross-model candidates; one content item may be stored under several
/// models and only its best match survives.
const CANDIDATE_FACTOR: u32 = 3;

/// The query side of a cross-model comparison.
pub(crate) struct QueryTarget {
	pub(crate) vector: Vec<f32>,
	pub(crate) model: String,
}
impl QueryTarget {
	pub(crate) fn dimensions(&self) -> u32 {
		self.vector.len() as u32
	}
}

/// Filters and knobs shared by cross-model and hybrid retrieval.
pub(crate) struct CrossModelQuery<'a> {
	pub(crate) include_models: &'a [String],
	pub(crate) exclude_models: &'a [String],
	pub(crate) content_types: &'a [String],
	pub(crate) metadata_filter: &'a Map<String, Value>,
	pub(crate) min_similarity: f32,
	pub(crate) candidates: u32,
	pub(crate) task: TaskType,
}
impl CrossModelQuery<'_> {
	pub(crate) fn repository_options(
		&self,
		ctx: &SearchContext,
		algorithm: RankingAlgorithm,
	) -> RepositoryOptions {
		RepositoryOptions {
			tenant_id: ctx.tenant_id,
			limit: self.candidates,
			min_similarity: self.min_similarity,
			metadata_filter: self.metadata_filter.clone(),
			content_types: self.content_types.to_vec(),
			include_models: self.include_models.to_vec(),
			exclude_models: self.exclude_models.to_vec(),
			algorithm,
		}
	}
}

impl SearchCoordinator {
	/// Retrieval across every stored embedding model, with scores calibrated into the query
	/// model's space and blended with model quality per task type.
	pub async fn cross_model_search(
		&self,
		ctx: &SearchContext,
		request: &CrossModelSearchRequest,
	) -> Result<Vec<CrossModelSearchResult>> {
		let mut stages = StageRecorder::new(ctx, "cross_model_search");
		let started = Instant::now();
		let query = request.query.as_deref().map(str::trim).filter(|text| !text.is_empty());
		let embedding = request.query_embedding.as_deref().filter(|vector| !vector.is_empty());

		if query.is_none() && embedding.is_none() {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid(
				"cross-model search requires a query or a query embedding",
			));
		}
		if embedding.is_some_and(|vector| vector.iter().any(|value| !value.is_finite())) {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("query embedding must contain only finite values"));
		}

		let limit = normalize_limit(request.limit, &self.defaults);
		let plan = CrossModelQuery {
			include_models: &request.include_models,
			exclude_models: &request.exclude_models,
			content_types: &request.content_types,
			metadata_filter: &request.metadata_filter,
			min_similarity: normalize_min_similarity(request.min_similarity, &self.defaults),
			candidates: limit.saturating_mul(CANDIDATE_FACTOR),
			task: self.task_type(request.task_type),
		};

		stages.record(Stage::Validate, StageOutcome::Ok, started);

		tracing::info!(
			tenant_id = %ctx.tenant_id,
			correlation_id = %ctx.correlation_id,
			query_hash = %query.map(query_hash).unwrap_or_default(),
			limit,
			task_type = plan.task.as_str(),
			"Cross-model search started."
		);

		let target = self
			.query_target(ctx, &mut stages, query, embedding, request.query_model.as_deref())
			.await?;
		let mut results = self.cross_model_scored(ctx, &mut stages, &target, &plan).await?;

		results.truncate(limit as usize);
		stages.skip(Stage::Rerank);
		stages.finish();

		Ok(results)
	}

	/// Uses the supplied embedding when present, otherwise embeds `query`.
	pub(crate) async fn query_target(
		&self,
		ctx: &SearchContext,
		stages: &mut StageRecorder<'_>,
		query: Option<&str>,
		embedding: Option<&[f32]>,
		query_model: Option<&str>,
	) -> Result<QueryTarget> {
		if let Some(vector) = embedding {
			stages.skip(Stage::Embed);

			let model = query_model
				.map(str::to_string)
				.unwrap_or_else(|| self.cfg.providers.embedding.model.clone());

			return Ok(QueryTarget { vector: vector.to_vec(), model });
		}

		let Some(query) = query else {
			return Err(Error::invalid("a query is required when no query embedding is given"));
		};
		let vector = stages
			.track(
				Stage::Embed,
				embed_query(ctx, self.providers.embedding.as_ref(), query, query_model),
			)
			.await?;

		Ok(QueryTarget { vector: vector.vector, model: vector.model })
	}

	/// Candidates from every model, normalized against `target`, best match per content id,
	/// ordered by final score.
	pub(crate) async fn cross_model_scored(
		&self,
		ctx: &SearchContext,
		stages: &mut StageRecorder<'_>,
		target: &QueryTarget,
		plan: &CrossModelQuery<'_>,
	) -> Result<Vec<CrossModelSearchResult>> {
		let options = plan.repository_options(ctx, RankingAlgorithm::CrossModelCosine);
		let hits = stages
			.track(
				Stage::Retrieve,
				self.executor.cross_model_candidates(ctx, &target.vector, &options),
			)
			.await?;
		let mut results: Vec<CrossModelSearchResult> =
			hits.into_iter().map(|hit| self.score_hit(hit, target, plan.task)).collect();

		sort_ranked(&mut results, |result| (result.final_score, result.content_id()));

		let mut seen = HashSet::new();

		results.retain(|result| seen.insert(result.content_id()));

		Ok(results)
	}

	fn score_hit(
		&self,
		hit: RepositoryHit,
		target: &QueryTarget,
		task: TaskType,
	) -> CrossModelSearchResult {
		let model_name = hit.content.model.clone();
		let scored = self.normalizer.score(
			hit.raw_similarity,
			&model_name,
			&target.model,
			hit.model_dimensions,
			target.dimensions(),
			task,
		);
		let mut result = SearchResult::new(hit.content, scored.final_score);

		result.record_match("raw_similarity", clamp_score(hit.raw_similarity));
		result.record_match("similarity", clamp_score(hit.similarity));
		result.record_match("dimension_penalty", scored.dimension_penalty);
		result.record_match("calibration", scored.calibration);
		result.record_match("calibrated_similarity", scored.calibrated_similarity);
		result.record_match("model_quality", scored.quality);

		CrossModelSearchResult {
			result,
			model_name,
			model_dimensions: hit.model_dimensions,
			raw_similarity: clamp_score(hit.raw_similarity),
			model_quality: clamp_score(scored.quality),
			final_score: scored.final_score,
		}
	}

	pub(crate) fn task_type(&self, requested: Option<TaskType>) -> TaskType {
		requested
			.or_else(|| TaskType::parse(&self.cfg.cross_model.default_task_type))
			.unwrap_or_default()
	}
}
