use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::{FakeEmbedding, QUERY_MODEL, ReverseReranker, id, test_config};
use prism_config::Postgres;
use prism_service::{
	PgSearchRepository, Providers, SearchContext, SearchCoordinator, SearchOptions,
};
use prism_storage::{db::Db, models::NewEmbedding, queries};
use prism_testkit::TestDatabase;

fn embedding(tenant_id: Uuid, content_id: Uuid, vector: Vec<f32>, content: &str) -> NewEmbedding {
	NewEmbedding {
		embedding_id: Uuid::new_v4(),
		tenant_id,
		content_id,
		content_type: "document".to_string(),
		model_name: QUERY_MODEL.to_string(),
		embedding: vector,
		content: Some(content.to_string()),
		metadata: json!({ "source": "postgres" }),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set PRISM_PG_DSN to run."]
async fn postgres_repository_serves_content_reference_search() {
	let Some(base_dsn) = prism_testkit::env_dsn() else {
		eprintln!(
			"Skipping postgres_repository_serves_content_reference_search; set PRISM_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 })
		.await
		.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let tenant = Uuid::new_v4();
	let other_tenant = Uuid::new_v4();
	let rows = [
		embedding(tenant, id(1), vec![1.0, 0.0, 0.0], "reference passage"),
		embedding(tenant, id(2), vec![0.95, 0.05, 0.0], "close neighbour"),
		embedding(tenant, id(3), vec![0.0, 0.0, 1.0], "unrelated"),
		embedding(other_tenant, id(4), vec![1.0, 0.0, 0.0], "other tenant copy"),
	];

	for row in &rows {
		queries::upsert_embedding(&db, row).await.expect("Failed to insert embedding.");
	}

	let providers = Providers::new(
		Arc::new(FakeEmbedding::new()),
		Arc::new(ReverseReranker::default()),
		None,
	);
	let service = SearchCoordinator::with_providers(
		test_config(),
		Arc::new(PgSearchRepository::new(db.clone())),
		providers,
	);
	let ctx = SearchContext::new(tenant);
	let out = service
		.search_by_content_id(&ctx, id(1), &SearchOptions::default())
		.await
		.expect("Content reference search failed.");
	let ids: Vec<Uuid> = out.results.iter().map(|result| result.content_id()).collect();

	assert_eq!(ids, vec![id(2)]);
	assert_eq!(out.results[0].content.text(), Some("close neighbour"));

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
