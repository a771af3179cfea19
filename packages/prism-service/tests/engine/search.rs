use std::sync::Arc;

use uuid::Uuid;

use super::{
	FakeEmbedding, FakeRepository, FixedExpander, QUERY_MODEL, ReverseReranker, calls, coordinator,
	id, vector,
};
use prism_service::{
	Error, QueryExpander, SearchContext, SearchOptions, Stage, StageOutcome, StageTiming,
};

const QUERY: &str = "how does pgvector index vectors";

fn outcome_of(stages: &[StageTiming], stage: Stage) -> Option<StageOutcome> {
	stages.iter().find(|timing| timing.stage == stage).map(|timing| timing.outcome)
}

#[tokio::test]
async fn empty_text_is_rejected_without_touching_collaborators() {
	let tenant = Uuid::new_v4();
	let repository =
		FakeRepository::new().with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 1.0)]), "a");
	let repo_calls = repository.call_counter();
	let embedding = FakeEmbedding::new();
	let embed_calls = embedding.calls.clone();
	let service = coordinator(repository, embedding, Arc::new(ReverseReranker::default()), None);
	let ctx = SearchContext::new(tenant);

	for text in ["", "   "] {
		let err = service
			.search(&ctx, text, &SearchOptions::default())
			.await
			.expect_err("expected validation error");

		assert!(err.is_client_error());
		assert_eq!(err.to_string(), "Invalid request: search text cannot be empty");
	}

	assert_eq!(calls(&embed_calls), 0);
	assert_eq!(calls(&repo_calls), 0);
}

#[tokio::test]
async fn empty_vector_and_nil_content_id_are_rejected() {
	let service = coordinator(
		FakeRepository::new(),
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(Uuid::new_v4());
	let empty = service
		.search_by_vector(&ctx, &[], &SearchOptions::default())
		.await
		.expect_err("expected validation error");
	let non_finite = service
		.search_by_vector(&ctx, &[0.5, f32::NAN], &SearchOptions::default())
		.await
		.expect_err("expected validation error");
	let nil = service
		.search_by_content_id(&ctx, Uuid::nil(), &SearchOptions::default())
		.await
		.expect_err("expected validation error");

	assert!(matches!(
		empty,
		Error::InvalidRequest { ref message } if message == "search vector cannot be empty"
	));
	assert!(non_finite.is_client_error());
	assert!(matches!(
		nil,
		Error::InvalidRequest { ref message } if message == "content id cannot be empty"
	));
}

#[tokio::test]
async fn text_search_ranks_same_model_rows_above_threshold() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.8)]), "b")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(0, 0.9)]), "a")
		.with_row(tenant, id(3), QUERY_MODEL, vector(4, &[(0, 0.5)]), "below threshold")
		.with_row(tenant, id(4), "embed-english-v3.0", vector(4, &[(0, 0.95)]), "other model");
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let service = coordinator(repository, embedding, Arc::new(ReverseReranker::default()), None);
	let ctx = SearchContext::new(tenant);
	let out = service.search(&ctx, QUERY, &SearchOptions::default()).await.expect("search failed");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(ids, vec![id(2), id(1)]);
	assert_eq!(out.queries, vec![QUERY.to_string()]);
	assert_eq!(out.correlation_id, ctx.correlation_id);
	assert!(out.results.iter().all(|result| (0.0..=1.0).contains(&result.score)));
	assert_eq!(outcome_of(&out.stages, Stage::Validate), Some(StageOutcome::Ok));
	assert_eq!(outcome_of(&out.stages, Stage::Expand), Some(StageOutcome::Skipped));
	assert_eq!(outcome_of(&out.stages, Stage::Rerank), Some(StageOutcome::Skipped));
}

#[tokio::test]
async fn limit_and_offset_page_the_ranking() {
	let tenant = Uuid::new_v4();
	let mut repository = FakeRepository::new();

	for n in 0..150_u128 {
		let score = 0.99 - 0.003 * n as f32;

		repository =
			repository.with_row(tenant, id(n + 1), QUERY_MODEL, vector(4, &[(0, score)]), "row");
	}

	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let service = coordinator(repository, embedding, Arc::new(ReverseReranker::default()), None);
	let ctx = SearchContext::new(tenant);
	let page = service
		.search(
			&ctx,
			QUERY,
			&SearchOptions { limit: 5, offset: 5, min_similarity: 0.1, ..Default::default() },
		)
		.await
		.expect("search failed");
	let page_ids: Vec<Uuid> = page.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(page_ids, (6..=10).map(id).collect::<Vec<_>>());
	assert_eq!(page.total, 10);

	let capped = service
		.search(
			&ctx,
			QUERY,
			&SearchOptions { limit: 5_000, min_similarity: 0.1, ..Default::default() },
		)
		.await
		.expect("search failed");

	assert_eq!(capped.results.len(), 100);
}

#[tokio::test]
async fn expansion_variants_merge_by_weight() {
	let tenant = Uuid::new_v4();
	// Item 1 scores 0.9 for the original query and 0.6 for the second expansion.
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9), (2, 0.6)]), "both")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(0, 0.8)]), "original only")
		.with_row(tenant, id(3), QUERY_MODEL, vector(4, &[(1, 0.9)]), "first expansion only");
	let embedding = FakeEmbedding::new()
		.with_text(QUERY, vector(4, &[(0, 1.0)]))
		.with_text("pgvector ivfflat", vector(4, &[(1, 1.0)]))
		.with_text("pgvector hnsw", vector(4, &[(2, 1.0)]));
	let expander = FixedExpander::new(&["pgvector ivfflat", "pgvector hnsw"]);
	let expander_calls = expander.calls.clone();
	let expander: Arc<dyn QueryExpander> = Arc::new(expander);
	let service =
		coordinator(repository, embedding, Arc::new(ReverseReranker::default()), Some(expander));
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(
			&ctx,
			QUERY,
			&SearchOptions { use_query_expansion: true, min_similarity: 0.5, ..Default::default() },
		)
		.await
		.expect("search failed");

	assert_eq!(calls(&expander_calls), 1);
	assert_eq!(out.queries.len(), 3);
	assert_eq!(out.queries[0], QUERY);
	assert_eq!(out.results.len(), 3);
	assert_eq!(out.results[0].content_id(), id(1));
	// 0.9 * 1.0 + 0.6 * (1 / 3) = 1.1, clamped.
	assert_eq!(out.results[0].score, 1.0);
	assert_eq!(out.results[0].matches.get("variant_hits"), Some(&serde_json::json!(2)));
	assert_eq!(out.results[1].content_id(), id(2));
	assert!((out.results[1].score - 0.8).abs() < 1e-5);
	assert_eq!(out.results[2].content_id(), id(3));
	assert!((out.results[2].score - 0.45).abs() < 1e-5);
	assert_eq!(outcome_of(&out.stages, Stage::Fanout), Some(StageOutcome::Ok));
}

#[tokio::test]
async fn reranker_reorders_and_keeps_prior_score() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "first")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(0, 0.8)]), "second")
		.with_row(tenant, id(3), QUERY_MODEL, vector(4, &[(0, 0.75)]), "third");
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let reranker = Arc::new(ReverseReranker::default());
	let rerank_calls = reranker.calls.clone();
	let service = coordinator(repository, embedding, reranker, None);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_reranking: true, ..Default::default() })
		.await
		.expect("search failed");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(calls(&rerank_calls), 1);
	assert_eq!(ids, vec![id(3), id(2), id(1)]);
	assert_eq!(out.results[0].score, 1.0);
	assert!(out.results[0].matches.contains_key("pre_rerank_score"));
	assert_eq!(outcome_of(&out.stages, Stage::Rerank), Some(StageOutcome::Ok));
}

#[tokio::test]
async fn vector_search_without_base_text_skips_rerank() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "first")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(0, 0.8)]), "second");
	let reranker = Arc::new(ReverseReranker::default());
	let rerank_calls = reranker.calls.clone();
	let service = coordinator(repository, FakeEmbedding::new(), reranker, None);
	let ctx = SearchContext::new(tenant);
	let query = vector(4, &[(0, 1.0)]);
	let plain = service
		.search_by_vector(&ctx, &query, &SearchOptions { use_reranking: true, ..Default::default() })
		.await
		.expect("search failed");

	assert_eq!(calls(&rerank_calls), 0);
	assert_eq!(plain.results[0].content_id(), id(1));

	let reranked = service
		.search_by_vector(
			&ctx,
			&query,
			&SearchOptions {
				use_reranking: true,
				rerank_query: Some("second".to_string()),
				..Default::default()
			},
		)
		.await
		.expect("search failed");

	assert_eq!(calls(&rerank_calls), 1);
	assert_eq!(reranked.results[0].content_id(), id(2));
}

#[tokio::test]
async fn content_reference_search_excludes_the_reference() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 1.0)]), "reference")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(0, 0.9)]), "neighbour")
		.with_row(tenant, id(3), QUERY_MODEL, vector(4, &[(1, 1.0)]), "unrelated");
	let service = coordinator(
		repository,
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search_by_content_id(&ctx, id(1), &SearchOptions::default())
		.await
		.expect("search failed");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(ids, vec![id(2)]);

	let unknown = service
		.search_by_content_id(&ctx, id(99), &SearchOptions::default())
		.await
		.expect("search failed");

	assert!(unknown.results.is_empty());
	assert_eq!(unknown.total, 0);
}
