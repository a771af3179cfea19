use std::sync::Arc;

use uuid::Uuid;

use super::{
	FakeEmbedding, FakeRepository, QUERY_MODEL, ReverseReranker, coordinator, id, vector,
};
use prism_service::{CrossModelSearchRequest, HybridSearchRequest, SearchContext, SearchOptions};

const QUERY: &str = "quarterly revenue report";

/// Both tenants hold identical content; tenant B's copies score slightly higher.
fn seeded(tenant_a: Uuid, tenant_b: Uuid) -> FakeRepository {
	FakeRepository::new()
		.with_row(tenant_a, id(1), QUERY_MODEL, vector(4, &[(0, 0.9)]), QUERY)
		.with_row(tenant_a, id(2), QUERY_MODEL, vector(4, &[(0, 0.8)]), QUERY)
		.with_row(tenant_b, id(11), QUERY_MODEL, vector(4, &[(0, 0.95)]), QUERY)
		.with_row(tenant_b, id(12), QUERY_MODEL, vector(4, &[(0, 0.85)]), QUERY)
		.with_keyword(id(1), QUERY_MODEL, 1.0)
		.with_keyword(id(11), QUERY_MODEL, 3.0)
}

async fn assert_isolated(repository: FakeRepository, tenant_a: Uuid) {
	let embedding = FakeEmbedding::new().with_text(QUERY, vector(4, &[(0, 1.0)]));
	let service = coordinator(repository, embedding, Arc::new(ReverseReranker::default()), None);
	let ctx = SearchContext::new(tenant_a);
	let query_vector = vector(4, &[(0, 1.0)]);
	let mut seen = Vec::new();

	for out in [
		service.search(&ctx, QUERY, &SearchOptions::default()).await,
		service.search_by_vector(&ctx, &query_vector, &SearchOptions::default()).await,
		service.search_by_content_id(&ctx, id(1), &SearchOptions::default()).await,
	] {
		let out = out.expect("search failed");

		seen.extend(out.results.iter().map(|result| result.content.tenant_id));
	}

	let cross = service
		.cross_model_search(
			&ctx,
			&CrossModelSearchRequest {
				query_embedding: Some(query_vector.clone()),
				..Default::default()
			},
		)
		.await
		.expect("search failed");
	let hybrid = service
		.hybrid_search(
			&ctx,
			&HybridSearchRequest {
				query: QUERY.to_string(),
				query_embedding: Some(query_vector.clone()),
				..Default::default()
			},
		)
		.await
		.expect("search failed");

	seen.extend(cross.iter().map(|result| result.result.content.tenant_id));
	seen.extend(hybrid.iter().map(|result| result.cross_model.result.content.tenant_id));

	assert!(!seen.is_empty());
	assert!(seen.iter().all(|tenant| *tenant == tenant_a));
}

#[tokio::test]
async fn every_operation_stays_within_the_caller_tenant() {
	let tenant_a = Uuid::new_v4();
	let tenant_b = Uuid::new_v4();

	assert_isolated(seeded(tenant_a, tenant_b), tenant_a).await;
}

#[tokio::test]
async fn rows_leaked_by_the_repository_are_dropped() {
	let tenant_a = Uuid::new_v4();
	let tenant_b = Uuid::new_v4();

	assert_isolated(seeded(tenant_a, tenant_b).leaking(), tenant_a).await;
}
