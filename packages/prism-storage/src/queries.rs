use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{HitFilter, KeywordHit, NewEmbedding, StoredEmbedding, VectorHit},
	vector,
};

// Binds $1..$6 in the order of `bind_filter`.
macro_rules! hit_filter_sql {
	() => {
		"\
	e.tenant_id = $1
	AND (cardinality($2::text[]) = 0 OR e.content_type = ANY($2))
	AND ($3::jsonb IS NULL OR e.metadata @> $3)
	AND (cardinality($4::text[]) = 0 OR e.model_name = ANY($4))
	AND NOT (e.model_name = ANY($5))
	AND ($6::uuid IS NULL OR e.content_id <> $6)"
	};
}

macro_rules! record_columns_sql {
	() => {
		"\
	e.embedding_id,
	e.tenant_id,
	e.content_id,
	e.content_type,
	e.model_name,
	e.model_dimensions,
	e.content,
	e.metadata,
	e.created_at"
	};
}

type PgQueryAs<'q, T> =
	sqlx::query::QueryAs<'q, sqlx::Postgres, T, sqlx::postgres::PgArguments>;

fn bind_filter<'q, T>(query: PgQueryAs<'q, T>, filter: HitFilter<'q>) -> PgQueryAs<'q, T> {
	query
		.bind(filter.tenant_id)
		.bind(filter.content_types)
		.bind(filter.metadata)
		.bind(filter.include_models)
		.bind(filter.exclude_models)
		.bind(filter.exclude_content_id)
}

pub async fn upsert_embedding(db: &Db, embedding: &NewEmbedding) -> Result<()> {
	if embedding.embedding.is_empty() {
		return Err(Error::InvalidArgument("Embedding vector must be non-empty.".to_string()));
	}

	let vec_text = vector::vector_to_pg(&embedding.embedding);

	sqlx::query(
		"\
INSERT INTO content_embeddings (
	embedding_id,
	tenant_id,
	content_id,
	content_type,
	model_name,
	model_dimensions,
	embedding,
	content,
	metadata
)
VALUES ($1, $2, $3, $4, $5, $6, $7::text::vector, $8, $9)
ON CONFLICT (tenant_id, content_id, model_name) DO UPDATE
SET
	content_type = EXCLUDED.content_type,
	model_dimensions = EXCLUDED.model_dimensions,
	embedding = EXCLUDED.embedding,
	content = EXCLUDED.content,
	metadata = EXCLUDED.metadata,
	created_at = now()",
	)
	.bind(embedding.embedding_id)
	.bind(embedding.tenant_id)
	.bind(embedding.content_id)
	.bind(embedding.content_type.as_str())
	.bind(embedding.model_name.as_str())
	.bind(embedding.embedding.len() as i32)
	.bind(vec_text.as_str())
	.bind(embedding.content.as_deref())
	.bind(&embedding.metadata)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Loads the stored embedding for a content item. When `model_name` is `None` the most recently
/// written model wins.
pub async fn fetch_embedding(
	db: &Db,
	tenant_id: Uuid,
	content_id: Uuid,
	model_name: Option<&str>,
) -> Result<Option<StoredEmbedding>> {
	let row = sqlx::query_as::<_, StoredEmbedding>(concat!(
		"SELECT\n",
		record_columns_sql!(),
		",
	e.embedding::text AS embedding_text
FROM content_embeddings e
WHERE e.tenant_id = $1
	AND e.content_id = $2
	AND ($3::text IS NULL OR e.model_name = $3)
ORDER BY e.created_at DESC, e.model_name ASC
LIMIT 1"
	))
	.bind(tenant_id)
	.bind(content_id)
	.bind(model_name)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

/// Cosine search among embeddings with exactly `vector.len()` dimensions.
pub async fn search_by_vector(
	db: &Db,
	filter: HitFilter<'_>,
	vector: &[f32],
	min_similarity: f32,
	limit: i64,
) -> Result<Vec<VectorHit>> {
	if vector.is_empty() {
		return Err(Error::InvalidArgument("Query vector must be non-empty.".to_string()));
	}

	let vec_text = vector::vector_to_pg(vector);
	let query = sqlx::query_as::<_, VectorHit>(concat!(
		"\
WITH scored AS MATERIALIZED (
	SELECT\n",
		record_columns_sql!(),
		",
		(1 - (e.embedding <=> $7::text::vector))::real AS raw_similarity
	FROM content_embeddings e
	WHERE ",
		hit_filter_sql!(),
		"
		AND e.model_dimensions = $8
)
SELECT scored.*, scored.raw_similarity AS similarity
FROM scored
WHERE scored.raw_similarity >= $9
ORDER BY similarity DESC, content_id ASC
LIMIT $10"
	));
	let rows = bind_filter(query, filter)
		.bind(vec_text.as_str())
		.bind(vector.len() as i32)
		.bind(min_similarity)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Similarity search across every stored model. Spaces of different sizes are compared on their
/// shared leading dimensions, and the thresholded `similarity` is scaled by
/// `0.9 + 0.1 * min_dim / max_dim` so a truncated comparison never outranks a full one.
pub async fn cross_model_candidates(
	db: &Db,
	filter: HitFilter<'_>,
	vector: &[f32],
	min_similarity: f32,
	limit: i64,
) -> Result<Vec<VectorHit>> {
	if vector.is_empty() {
		return Err(Error::InvalidArgument("Query vector must be non-empty.".to_string()));
	}

	let vec_text = vector::vector_to_pg(vector);
	let query = sqlx::query_as::<_, VectorHit>(concat!(
		"\
WITH scored AS MATERIALIZED (
	SELECT\n",
		record_columns_sql!(),
		",
		(
			1 - (
				subvector(e.embedding, 1, LEAST(e.model_dimensions, $8))
				<=> subvector($7::text::vector, 1, LEAST(e.model_dimensions, $8))
			)
		)::real AS raw_similarity,
		(
			0.9 + 0.1 * LEAST(e.model_dimensions, $8)::real / GREATEST(e.model_dimensions, $8)::real
		)::real AS dimension_factor
	FROM content_embeddings e
	WHERE ",
		hit_filter_sql!(),
		"
)
SELECT
	scored.embedding_id,
	scored.tenant_id,
	scored.content_id,
	scored.content_type,
	scored.model_name,
	scored.model_dimensions,
	scored.content,
	scored.metadata,
	scored.created_at,
	scored.raw_similarity,
	(scored.raw_similarity * scored.dimension_factor)::real AS similarity
FROM scored
WHERE scored.raw_similarity * scored.dimension_factor >= $9
ORDER BY similarity DESC, content_id ASC, model_name ASC
LIMIT $10"
	));
	let rows = bind_filter(query, filter)
		.bind(vec_text.as_str())
		.bind(vector.len() as i32)
		.bind(min_similarity)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Full-text search over stored content using `plainto_tsquery`, ranked by `ts_rank_cd`.
pub async fn keyword_search(
	db: &Db,
	filter: HitFilter<'_>,
	query_text: &str,
	limit: i64,
) -> Result<Vec<KeywordHit>> {
	if query_text.trim().is_empty() {
		return Ok(Vec::new());
	}

	let query = sqlx::query_as::<_, KeywordHit>(concat!(
		"SELECT\n",
		record_columns_sql!(),
		",
	ts_rank_cd(e.search_tsv, q.query)::real AS rank
FROM content_embeddings e
CROSS JOIN plainto_tsquery('english', $7) AS q(query)
WHERE ",
		hit_filter_sql!(),
		"
	AND e.search_tsv @@ q.query
ORDER BY rank DESC, e.content_id ASC, e.model_name ASC
LIMIT $8"
	));
	let rows = bind_filter(query, filter).bind(query_text).bind(limit).fetch_all(&db.pool).await?;

	Ok(rows)
}
