use serde_json::{Map, Value};
use uuid::Uuid;

use prism_domain::model::EmbeddingVector;
use prism_storage::{
	db::Db,
	models::{EmbeddingRecord, HitFilter, KeywordHit, VectorHit},
	queries, vector,
};

use crate::{
	BoxFuture, KeywordMatch, RepositoryHit, RepositoryOptions, Result, SearchRepository,
};

/// `SearchRepository` over the `content_embeddings` table.
#[derive(Clone)]
pub struct PgSearchRepository {
	db: Db,
}
impl PgSearchRepository {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}
}
impl SearchRepository for PgSearchRepository {
	fn search_by_vector<'a>(
		&'a self,
		vector: &'a [f32],
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>> {
		Box::pin(async move {
			let metadata = metadata_filter(&options.metadata_filter);
			let filter = hit_filter(options, metadata.as_ref(), None);
			let hits = queries::search_by_vector(
				&self.db,
				filter,
				vector,
				options.min_similarity,
				options.limit as i64,
			)
			.await?;

			Ok(Some(hits.into_iter().map(to_hit).collect()))
		})
	}

	fn search_by_content_id<'a>(
		&'a self,
		content_id: Uuid,
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>> {
		Box::pin(async move {
			let model = options.include_models.first().map(String::as_str);
			let Some(stored) =
				queries::fetch_embedding(&self.db, options.tenant_id, content_id, model).await?
			else {
				return Ok(None);
			};
			let reference = vector::parse_pg_vector(&stored.embedding_text)?;
			let models = [stored.record.model_name.clone()];
			let metadata = metadata_filter(&options.metadata_filter);
			let mut filter = hit_filter(options, metadata.as_ref(), Some(content_id));

			filter.include_models = &models;

			let hits = queries::search_by_vector(
				&self.db,
				filter,
				&reference,
				options.min_similarity,
				options.limit as i64,
			)
			.await?;

			Ok(Some(hits.into_iter().map(to_hit).collect()))
		})
	}

	fn cross_model_candidates<'a>(
		&'a self,
		vector: &'a [f32],
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>> {
		Box::pin(async move {
			let metadata = metadata_filter(&options.metadata_filter);
			let filter = hit_filter(options, metadata.as_ref(), None);
			let hits = queries::cross_model_candidates(
				&self.db,
				filter,
				vector,
				options.min_similarity,
				options.limit as i64,
			)
			.await?;

			Ok(Some(hits.into_iter().map(to_hit).collect()))
		})
	}

	fn keyword_search<'a>(
		&'a self,
		query: &'a str,
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<KeywordMatch>>>> {
		Box::pin(async move {
			let metadata = metadata_filter(&options.metadata_filter);
			let filter = hit_filter(options, metadata.as_ref(), None);
			let hits =
				queries::keyword_search(&self.db, filter, query, options.limit as i64).await?;

			Ok(Some(hits.into_iter().map(to_keyword_match).collect()))
		})
	}
}

fn metadata_filter(filter: &Map<String, Value>) -> Option<Value> {
	if filter.is_empty() { None } else { Some(Value::Object(filter.clone())) }
}

fn hit_filter<'a>(
	options: &'a RepositoryOptions,
	metadata: Option<&'a Value>,
	exclude_content_id: Option<Uuid>,
) -> HitFilter<'a> {
	HitFilter {
		tenant_id: options.tenant_id,
		content_types: &options.content_types,
		metadata,
		include_models: &options.include_models,
		exclude_models: &options.exclude_models,
		exclude_content_id,
	}
}

fn to_hit(hit: VectorHit) -> RepositoryHit {
	let model_dimensions = hit.record.model_dimensions.max(0) as u32;

	RepositoryHit {
		content: to_content(hit.record),
		model_dimensions,
		raw_similarity: hit.raw_similarity,
		similarity: hit.similarity,
	}
}

fn to_keyword_match(hit: KeywordHit) -> KeywordMatch {
	let model_dimensions = hit.record.model_dimensions.max(0) as u32;

	KeywordMatch { content: to_content(hit.record), model_dimensions, rank: hit.rank }
}

/// Rows never carry the stored vector; the text column is exposed as `metadata["content"]` unless
/// the metadata already has one.
fn to_content(record: EmbeddingRecord) -> EmbeddingVector {
	let mut metadata = match record.metadata {
		Value::Object(map) => map,
		_ => Map::new(),
	};

	if let Some(content) = record.content
		&& !metadata.contains_key("content")
	{
		metadata.insert("content".to_string(), Value::String(content));
	}

	EmbeddingVector {
		content_id: record.content_id,
		tenant_id: record.tenant_id,
		content_type: record.content_type,
		model: record.model_name,
		vector: Vec::new(),
		metadata,
	}
}
