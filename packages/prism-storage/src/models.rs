use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Columns shared by every read from `content_embeddings`. The vector itself is never selected
/// here; see [`StoredEmbedding`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmbeddingRecord {
	pub embedding_id: Uuid,
	pub tenant_id: Uuid,
	pub content_id: Uuid,
	pub content_type: String,
	pub model_name: String,
	pub model_dimensions: i32,
	pub content: Option<String>,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEmbedding {
	#[sqlx(flatten)]
	pub record: EmbeddingRecord,
	pub embedding_text: String,
}

/// A semantic match. `similarity` is what thresholds and ordering used; `raw_similarity` is the
/// plain cosine similarity before any dimension adjustment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VectorHit {
	#[sqlx(flatten)]
	pub record: EmbeddingRecord,
	pub raw_similarity: f32,
	pub similarity: f32,
}

/// A full-text match carrying its raw `ts_rank_cd` value.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordHit {
	#[sqlx(flatten)]
	pub record: EmbeddingRecord,
	pub rank: f32,
}

#[derive(Debug, Clone)]
pub struct NewEmbedding {
	pub embedding_id: Uuid,
	pub tenant_id: Uuid,
	pub content_id: Uuid,
	pub content_type: String,
	pub model_name: String,
	pub embedding: Vec<f32>,
	pub content: Option<String>,
	pub metadata: Value,
}

/// Row filters shared by every search query. Empty slices and `None` mean "no restriction".
#[derive(Debug, Clone, Copy)]
pub struct HitFilter<'a> {
	pub tenant_id: Uuid,
	pub content_types: &'a [String],
	pub metadata: Option<&'a Value>,
	pub include_models: &'a [String],
	pub exclude_models: &'a [String],
	pub exclude_content_id: Option<Uuid>,
}
impl<'a> HitFilter<'a> {
	pub fn tenant(tenant_id: Uuid) -> Self {
		Self {
			tenant_id,
			content_types: &[],
			metadata: None,
			include_models: &[],
			exclude_models: &[],
			exclude_content_id: None,
		}
	}
}
