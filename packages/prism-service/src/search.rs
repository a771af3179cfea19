use std::time::Instant;

use uuid::Uuid;

use prism_domain::{model::SearchResult, query::normalize_variants, score::sort_ranked};

use crate::{
	Error, ExpansionOptions, Result, SearchContext, SearchCoordinator, SearchOptions, SearchResults,
	fanout::embed_query,
	query_hash,
	stage::{Stage, StageOutcome, StageRecorder},
};

impl SearchCoordinator {
	/// Text search: optional expansion and fan-out, embedding, same-model retrieval, optional
	/// rerank against the original text.
	pub async fn search(
		&self,
		ctx: &SearchContext,
		text: &str,
		options: &SearchOptions,
	) -> Result<SearchResults> {
		let mut stages = StageRecorder::new(ctx, "search");
		let started = Instant::now();
		let query = text.trim();

		if query.is_empty() {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("search text cannot be empty"));
		}

		let options = options.normalized(&self.defaults);

		stages.record(Stage::Validate, StageOutcome::Ok, started);

		tracing::info!(
			tenant_id = %ctx.tenant_id,
			correlation_id = %ctx.correlation_id,
			query_hash = %query_hash(query),
			limit = options.limit,
			offset = options.offset,
			expansion = options.use_query_expansion,
			rerank = options.use_reranking,
			"Search started."
		);

		let queries = self.expand_queries(ctx, &mut stages, query, &options).await;
		let candidates = if queries.len() > 1 {
			stages.track(Stage::Fanout, self.fanout.run(ctx, &queries, &options)).await?
		} else {
			stages.skip(Stage::Fanout);

			let vector = stages
				.track(
					Stage::Embed,
					embed_query(
						ctx,
						self.providers.embedding.as_ref(),
						query,
						options.model_hint.as_deref(),
					),
				)
				.await?;

			stages
				.track(
					Stage::Retrieve,
					self.executor.search_by_vector(
						ctx,
						&vector.vector,
						Some(vector.model.as_str()),
						&options,
					),
				)
				.await?
		};
		let ranked = self.rank(ctx, &mut stages, Some(query), candidates, &options).await;

		Ok(paginate(ctx, stages, queries, ranked, &options))
	}

	/// Vector search in the space named by `options.model_hint`, or across every stored model of
	/// the same dimensionality when no hint is given.
	pub async fn search_by_vector(
		&self,
		ctx: &SearchContext,
		vector: &[f32],
		options: &SearchOptions,
	) -> Result<SearchResults> {
		let mut stages = StageRecorder::new(ctx, "search_by_vector");
		let started = Instant::now();

		if vector.is_empty() {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("search vector cannot be empty"));
		}
		if vector.iter().any(|value| !value.is_finite()) {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("search vector must contain only finite values"));
		}

		let options = options.normalized(&self.defaults);

		stages.record(Stage::Validate, StageOutcome::Ok, started);
		stages.skip(Stage::Expand);
		stages.skip(Stage::Embed);

		let candidates = stages
			.track(
				Stage::Retrieve,
				self.executor.search_by_vector(ctx, vector, options.model_hint.as_deref(), &options),
			)
			.await?;
		let rerank_query = options.rerank_query.clone();
		let ranked =
			self.rank(ctx, &mut stages, rerank_query.as_deref(), candidates, &options).await;

		Ok(paginate(ctx, stages, Vec::new(), ranked, &options))
	}

	/// "More like this": items similar to the stored embedding of `content_id`, excluding itself.
	pub async fn search_by_content_id(
		&self,
		ctx: &SearchContext,
		content_id: Uuid,
		options: &SearchOptions,
	) -> Result<SearchResults> {
		let mut stages = StageRecorder::new(ctx, "search_by_content_id");
		let started = Instant::now();

		if content_id.is_nil() {
			stages.record(Stage::Validate, StageOutcome::Failed, started);

			return Err(Error::invalid("content id cannot be empty"));
		}

		let options = options.normalized(&self.defaults);

		stages.record(Stage::Validate, StageOutcome::Ok, started);
		stages.skip(Stage::Expand);
		stages.skip(Stage::Embed);

		let candidates = stages
			.track(Stage::Retrieve, self.executor.search_by_content_id(ctx, content_id, &options))
			.await?;
		let rerank_query = options.rerank_query.clone();
		let ranked =
			self.rank(ctx, &mut stages, rerank_query.as_deref(), candidates, &options).await;

		Ok(paginate(ctx, stages, Vec::new(), ranked, &options))
	}

	/// Original query first, then the expander's distinct variants. Expansion failures degrade to
	/// the original query alone.
	async fn expand_queries(
		&self,
		ctx: &SearchContext,
		stages: &mut StageRecorder<'_>,
		query: &str,
		options: &SearchOptions,
	) -> Vec<String> {
		let original = vec![query.to_string()];
		let Some(expander) =
			self.providers.expander.as_ref().filter(|_| options.use_query_expansion)
		else {
			stages.skip(Stage::Expand);

			return original;
		};
		let started = Instant::now();
		let expansion_options = ExpansionOptions {
			types: options.expansion_types.clone(),
			max_expansions: options.max_expansions as usize,
		};

		match ctx.run("expand", expander.expand(query, &expansion_options)).await {
			Ok(expansions) => {
				let variants =
					normalize_variants(query, expansions, expansion_options.max_expansions);

				stages.record(Stage::Expand, StageOutcome::Ok, started);

				variants
			},
			Err(err) => {
				tracing::warn!(
					tenant_id = %ctx.tenant_id,
					correlation_id = %ctx.correlation_id,
					query_hash = %query_hash(query),
					error = %err,
					"Query expansion failed; falling back to original query."
				);
				stages.record(Stage::Expand, StageOutcome::Degraded, started);

				original
			},
		}
	}

	/// Orders candidates, cuts them to the page window, and reranks when requested and a base
	/// text is available.
	async fn rank(
		&self,
		ctx: &SearchContext,
		stages: &mut StageRecorder<'_>,
		rerank_query: Option<&str>,
		mut candidates: Vec<SearchResult>,
		options: &SearchOptions,
	) -> Vec<SearchResult> {
		let window = options.window() as usize;

		sort_ranked(&mut candidates, |result| (result.score, result.content_id()));
		candidates.truncate(window);

		let Some(rerank_query) = rerank_query.filter(|_| options.use_reranking) else {
			stages.skip(Stage::Rerank);

			return candidates;
		};
		let started = Instant::now();

		match self.reranker.rerank(ctx, rerank_query, candidates, window).await {
			Ok(reranked) => {
				stages.record(Stage::Rerank, StageOutcome::Ok, started);

				reranked
			},
			Err(original) => {
				stages.record(Stage::Rerank, StageOutcome::Degraded, started);

				original
			},
		}
	}
}

fn paginate(
	ctx: &SearchContext,
	stages: StageRecorder<'_>,
	queries: Vec<String>,
	ranked: Vec<SearchResult>,
	options: &SearchOptions,
) -> SearchResults {
	let total = ranked.len();
	let results: Vec<SearchResult> =
		ranked.into_iter().skip(options.offset as usize).take(options.limit as usize).collect();

	SearchResults {
		results,
		total,
		queries,
		correlation_id: ctx.correlation_id,
		stages: stages.finish(),
	}
}
