use std::sync::Arc;

use uuid::Uuid;

use super::{
	FakeEmbedding, FakeRepository, QUERY_MODEL, ReverseReranker, calls, coordinator,
	coordinator_with, id, test_config, vector,
};
use prism_domain::normalizer::TaskType;
use prism_service::{CrossModelSearchRequest, SearchContext};

const EPSILON: f32 = 1e-3;

fn approx(left: f32, right: f32) -> bool {
	(left - right).abs() < EPSILON
}

#[tokio::test]
async fn dimension_mismatch_is_penalized_and_blended_with_quality() {
	let tenant = Uuid::new_v4();
	// 768-dimension row, 1536-dimension query; cosine on the shared prefix is 0.90.
	let stored = vector(768, &[(0, 0.9), (1, 0.19_f32.sqrt())]);
	let repository = FakeRepository::new().with_row(tenant, id(1), QUERY_MODEL, stored, "row");
	let service = coordinator(
		repository,
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let request = CrossModelSearchRequest {
		query_embedding: Some(vector(1_536, &[(0, 1.0)])),
		query_model: Some(QUERY_MODEL.to_string()),
		..Default::default()
	};
	let results = service.cross_model_search(&ctx, &request).await.expect("search failed");

	assert_eq!(results.len(), 1);

	let result = &results[0];

	assert_eq!(result.model_dimensions, 768);
	assert!(approx(result.raw_similarity, 0.9));
	assert!(approx(result.model_quality, 0.85));
	// penalty 0.95, calibrated 0.855, final 0.8 * 0.855 + 0.2 * 0.85.
	assert!(approx(result.final_score, 0.854));
	assert!(approx(result.result.score, 0.854));
}

#[tokio::test]
async fn best_model_wins_for_content_stored_under_several_models() {
	let tenant = Uuid::new_v4();
	let repository = FakeRepository::new()
		.with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "small")
		.with_row(tenant, id(1), "text-embedding-3-large", vector(4, &[(0, 0.8)]), "large")
		.with_row(tenant, id(2), "embed-english-v3.0", vector(4, &[(0, 0.85)]), "cohere");
	let service = coordinator(
		repository,
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let request = CrossModelSearchRequest {
		query_embedding: Some(vector(4, &[(0, 1.0)])),
		..Default::default()
	};
	let results = service.cross_model_search(&ctx, &request).await.expect("search failed");

	assert_eq!(results.len(), 2);
	assert_eq!(results[0].content_id(), id(1));
	assert_eq!(results[0].model_name, QUERY_MODEL);
	// Same model: calibration 1.0, quality 0.85.
	assert!(approx(results[0].final_score, 0.8 * 0.9 + 0.2 * 0.85));
	assert_eq!(results[1].content_id(), id(2));
	// cohere -> openai calibration 0.91, quality 0.92.
	assert!(approx(results[1].final_score, 0.8 * 0.85 * 0.91 + 0.2 * 0.92));
	assert!(results.iter().all(|result| (0.0..=1.0).contains(&result.final_score)));
}

#[tokio::test]
async fn model_filters_and_limit_apply() {
	let tenant = Uuid::new_v4();
	let mut repository = FakeRepository::new();

	for n in 0..20_u128 {
		let score = 0.99 - 0.01 * n as f32;
		let model = if n % 2 == 0 { QUERY_MODEL } else { "voyage-3" };

		repository = repository.with_row(tenant, id(n + 1), model, vector(4, &[(0, score)]), "row");
	}

	let service = coordinator(
		repository,
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let request = CrossModelSearchRequest {
		query_embedding: Some(vector(4, &[(0, 1.0)])),
		exclude_models: vec!["voyage-3".to_string()],
		limit: 3,
		..Default::default()
	};
	let results = service.cross_model_search(&ctx, &request).await.expect("search failed");

	assert_eq!(results.len(), 3);
	assert!(results.iter().all(|result| result.model_name == QUERY_MODEL));

	let capped = CrossModelSearchRequest {
		query_embedding: Some(vector(4, &[(0, 1.0)])),
		limit: 1_000,
		min_similarity: 0.1,
		..Default::default()
	};

	assert_eq!(service.cross_model_search(&ctx, &capped).await.expect("search failed").len(), 20);
}

#[tokio::test]
async fn query_text_is_embedded_when_no_vector_is_given() {
	let tenant = Uuid::new_v4();
	let repository =
		FakeRepository::new().with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "row");
	let embedding = FakeEmbedding::new().with_text("vector calibration", vector(4, &[(0, 1.0)]));
	let embed_calls = embedding.calls.clone();
	let service = coordinator(repository, embedding, Arc::new(ReverseReranker::default()), None);
	let ctx = SearchContext::new(tenant);
	let default_task = CrossModelSearchRequest {
		query: Some("vector calibration".to_string()),
		..Default::default()
	};
	let research_task = CrossModelSearchRequest {
		task_type: Some(TaskType::Research),
		..default_task.clone()
	};
	let default_results =
		service.cross_model_search(&ctx, &default_task).await.expect("search failed");
	let research_results =
		service.cross_model_search(&ctx, &research_task).await.expect("search failed");

	assert_eq!(calls(&embed_calls), 2);
	assert!(approx(default_results[0].final_score, 0.8 * 0.9 + 0.2 * 0.85));
	assert!(approx(research_results[0].final_score, 0.6 * 0.9 + 0.4 * 0.85));
}

#[tokio::test]
async fn configured_task_type_applies_when_the_request_has_none() {
	let tenant = Uuid::new_v4();
	let repository =
		FakeRepository::new().with_row(tenant, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), "row");
	let mut cfg = test_config();

	cfg.cross_model.default_task_type = "research".to_string();

	let service = coordinator_with(
		cfg,
		repository,
		Arc::new(FakeEmbedding::new()),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(tenant);
	let request = CrossModelSearchRequest {
		query_embedding: Some(vector(4, &[(0, 1.0)])),
		..Default::default()
	};
	let results = service.cross_model_search(&ctx, &request).await.expect("search failed");

	assert_eq!(results.len(), 1);
	assert!(approx(results[0].final_score, 0.6 * 0.9 + 0.4 * 0.85));
}

#[tokio::test]
async fn missing_query_and_embedding_is_rejected() {
	let repository = FakeRepository::new();
	let repo_calls = repository.call_counter();
	let service = coordinator(
		repository,
		FakeEmbedding::new(),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let ctx = SearchContext::new(Uuid::new_v4());
	let blank = CrossModelSearchRequest {
		query: Some("  ".to_string()),
		query_embedding: Some(Vec::new()),
		..Default::default()
	};

	for request in [CrossModelSearchRequest::default(), blank] {
		let err = service
			.cross_model_search(&ctx, &request)
			.await
			.expect_err("expected validation error");

		assert!(err.is_client_error());
	}

	assert_eq!(calls(&repo_calls), 0);
}
