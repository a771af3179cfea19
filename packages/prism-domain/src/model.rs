use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata keys consulted, in order, for the text of a content item.
pub const TEXT_METADATA_KEYS: [&str; 2] = ["content", "text"];

/// A stored embedding as returned by retrieval. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
	pub content_id: Uuid,
	pub tenant_id: Uuid,
	pub content_type: String,
	pub model: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub vector: Vec<f32>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl EmbeddingVector {
	pub fn dimensions(&self) -> usize {
		self.vector.len()
	}

	pub fn text(&self) -> Option<&str> {
		TEXT_METADATA_KEYS
			.iter()
			.filter_map(|key| self.metadata.get(*key).and_then(Value::as_str))
			.find(|text| !text.trim().is_empty())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
	pub content: EmbeddingVector,
	pub score: f32,
	/// Diagnostic sub-scores keyed by stage, e.g. "similarity" or "pre_rerank_score". Entries
	/// named `*score` or `*similarity` lie in [0, 1]; counts, ranks and `unclamped_*` entries are
	/// not scores.
	#[serde(default)]
	pub matches: Map<String, Value>,
}
impl SearchResult {
	pub fn new(content: EmbeddingVector, score: f32) -> Self {
		Self { content, score: crate::score::clamp_score(score), matches: Map::new() }
	}

	pub fn content_id(&self) -> Uuid {
		self.content.content_id
	}

	pub fn record_match(&mut self, key: &str, value: impl Into<Value>) {
		self.matches.insert(key.to_string(), value.into());
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossModelSearchResult {
	#[serde(flatten)]
	pub result: SearchResult,
	pub model_name: String,
	pub model_dimensions: u32,
	pub raw_similarity: f32,
	pub model_quality: f32,
	pub final_score: f32,
}
impl CrossModelSearchResult {
	pub fn content_id(&self) -> Uuid {
		self.result.content_id()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSearchResult {
	#[serde(flatten)]
	pub cross_model: CrossModelSearchResult,
	pub semantic_score: f32,
	pub keyword_score: f32,
	pub hybrid_score: f32,
}
impl HybridSearchResult {
	pub fn content_id(&self) -> Uuid {
		self.cross_model.content_id()
	}
}
