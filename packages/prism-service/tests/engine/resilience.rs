use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use tokio::time;
use uuid::Uuid;

use super::{
	FailingExpander, FailingReranker, FakeEmbedding, FakeRepository, FixedExpander,
	GaugedEmbedding, HangingEmbedding, QUERY_MODEL, ReverseReranker, StallingEmbedding, calls,
	coordinator, coordinator_with, id, test_config, vector,
};
use prism_service::{
	Error, Providers, QueryExpander, SearchContext, SearchCoordinator, SearchOptions, Stage,
	StageOutcome,
};

const QUERY: &str = "tenant isolation in postgres";

fn ten_rows(tenant: Uuid) -> FakeRepository {
	let mut repository = FakeRepository::new();

	for n in 0..10_u128 {
		let score = 0.95 - 0.02 * n as f32;

		repository =
			repository.with_row(tenant, id(n + 1), QUERY_MODEL, vector(4, &[(0, score)]), "row");
	}

	repository
}

#[tokio::test]
async fn expansion_failure_falls_back_to_the_original_query() {
	let tenant = Uuid::new_v4();
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let expander = FailingExpander::default();
	let expander_calls = expander.calls.clone();
	let expander: Arc<dyn QueryExpander> = Arc::new(expander);
	let service = coordinator(
		ten_rows(tenant),
		embedding,
		Arc::new(ReverseReranker::default()),
		Some(expander),
	);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_query_expansion: true, ..Default::default() })
		.await
		.expect("search failed");

	assert_eq!(calls(&expander_calls), 1);
	assert_eq!(out.queries, vec![QUERY.to_string()]);
	assert_eq!(out.results.len(), 10);
	assert!(out.stages.iter().any(|timing| {
		timing.stage == Stage::Expand && timing.outcome == StageOutcome::Degraded
	}));
}

#[tokio::test]
async fn partial_fanout_failure_keeps_surviving_variants() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "original")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(1, 0.9)]), "expansion");
	// The second expansion has no embedding and fails.
	let embedding = FakeEmbedding::new()
		.with_text(QUERY, vector(4, &[(0, 1.0)]))
		.with_text("row level security", vector(4, &[(1, 1.0)]));
	let expander: Arc<dyn QueryExpander> =
		Arc::new(FixedExpander::new(&["row level security", "schema per tenant"]));
	let service =
		coordinator(repository, embedding, Arc::new(ReverseReranker::default()), Some(expander));
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_query_expansion: true, ..Default::default() })
		.await
		.expect("search failed");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(out.queries.len(), 3);
	assert_eq!(ids, vec![id(1), id(2)]);
}

#[tokio::test]
async fn total_fanout_failure_reports_the_original_query_error() {
	let tenant = Uuid::new_v4();
	let expander: Arc<dyn QueryExpander> = Arc::new(FixedExpander::new(&["row level security"]));
	let service = coordinator(
		ten_rows(tenant),
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		Some(expander),
	);
	let ctx = SearchContext::new(tenant);
	let err = service
		.search(&ctx, QUERY, &SearchOptions { use_query_expansion: true, ..Default::default() })
		.await
		.expect_err("expected fan-out failure");

	assert!(!err.is_client_error());
	assert!(matches!(
		err,
		Error::Provider { ref message }
			if message.starts_with("generate embedding: ") && message.contains(QUERY)
	));
}

#[tokio::test]
async fn rerank_failure_keeps_pre_rerank_order() {
	let tenant = Uuid::new_v4();
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let reranker = Arc::new(FailingReranker::default());
	let rerank_calls = reranker.calls.clone();
	let service = coordinator(ten_rows(tenant), embedding, reranker, None);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_reranking: true, ..Default::default() })
		.await
		.expect("search failed");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(calls(&rerank_calls), 1);
	assert_eq!(ids, (1..=10).map(id).collect::<Vec<_>>());
	assert!(out.results.iter().all(|result| !result.matches.contains_key("rerank_score")));
	assert!(out.stages.iter().any(|timing| {
		timing.stage == Stage::Rerank && timing.outcome == StageOutcome::Degraded
	}));
}

#[tokio::test]
async fn repository_failure_propagates_with_operation_prefix() {
	let tenant = Uuid::new_v4();
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let service = coordinator(
		ten_rows(tenant).failing(),
		embedding,
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let err = service
		.search(&ctx, QUERY, &SearchOptions::default())
		.await
		.expect_err("expected storage failure");

	assert_eq!(err.to_string(), "Storage error: search by vector: connection refused");
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_an_in_flight_search() {
	let tenant = Uuid::new_v4();
	let providers = Providers::new(
		Arc::new(HangingEmbedding),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let service =
		SearchCoordinator::with_providers(test_config(), Arc::new(ten_rows(tenant)), providers);
	let ctx = SearchContext::new(tenant);
	let cancel = ctx.cancel.clone();

	tokio::spawn(async move {
		time::sleep(Duration::from_millis(10)).await;
		cancel.cancel();
	});

	let err = service
		.search(&ctx, QUERY, &SearchOptions::default())
		.await
		.expect_err("expected cancellation");

	assert!(matches!(err, Error::Cancelled { ref stage } if stage == "embed"));
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_a_slow_provider() {
	let tenant = Uuid::new_v4();
	let providers = Providers::new(
		Arc::new(HangingEmbedding),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let service =
		SearchCoordinator::with_providers(test_config(), Arc::new(ten_rows(tenant)), providers);
	let ctx = SearchContext::new(tenant).with_timeout(Duration::from_millis(250));
	let err = service
		.search(&ctx, QUERY, &SearchOptions::default())
		.await
		.expect_err("expected deadline");

	assert!(matches!(err, Error::DeadlineExceeded { ref stage } if stage == "embed"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_fanout_keeps_variants_that_already_finished() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "original")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(1, 0.9)]), "expansion");
	// Only the original query embeds; both expansions stall until cancelled.
	let embedding =
		StallingEmbedding(FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)])));
	let expander: Arc<dyn QueryExpander> =
		Arc::new(FixedExpander::new(&["row level security", "schema per tenant"]));
	let service = coordinator_with(
		test_config(),
		repository,
		Arc::new(embedding),
		Arc::new(ReverseReranker::default()),
		Some(expander),
	);
	let ctx = SearchContext::new(tenant);
	let cancel = ctx.cancel.clone();

	tokio::spawn(async move {
		time::sleep(Duration::from_millis(10)).await;
		cancel.cancel();
	});

	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_query_expansion: true, ..Default::default() })
		.await
		.expect("search failed");

	assert_eq!(out.queries.len(), 3);
	assert_eq!(out.results.len(), 1);
	assert_eq!(out.results[0].content_id(), id(1));
	assert!((out.results[0].score - 0.9).abs() < 1e-4);
}

#[tokio::test(start_paused = true)]
async fn fanout_respects_max_concurrency() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "original")
		.with_row(tenant, id(2), QUERY_MODEL, vector(4, &[(1, 0.9)]), "security")
		.with_row(tenant, id(3), QUERY_MODEL, vector(4, &[(2, 0.9)]), "schema");
	let embedding = GaugedEmbedding::new(
		FakeEmbedding::new()
			.with_text(QUERY, vector(4, &[(0, 1.0)]))
			.with_text("row level security", vector(4, &[(1, 1.0)]))
			.with_text("schema per tenant", vector(4, &[(2, 1.0)])),
		Duration::from_millis(50),
	);
	let embed_calls = embedding.calls();
	let peak = embedding.peak.clone();
	let expander: Arc<dyn QueryExpander> =
		Arc::new(FixedExpander::new(&["row level security", "schema per tenant"]));
	let mut cfg = test_config();

	cfg.search.fanout.max_concurrency = 1;

	let service = coordinator_with(
		cfg,
		repository,
		Arc::new(embedding),
		Arc::new(ReverseReranker::default()),
		Some(expander),
	);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search(&ctx, QUERY, &SearchOptions { use_query_expansion: true, ..Default::default() })
		.await
		.expect("search failed");

	assert_eq!(calls(&embed_calls), 3);
	assert_eq!(peak.load(Ordering::SeqCst), 1);
	assert_eq!(out.results.len(), 3);
}
