use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use prism_domain::{
	model::{EmbeddingVector, SearchResult},
	normalizer::TaskType,
	score::clamp_score,
};

use crate::stage::StageTiming;

pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Per-call knobs for the same-model operations (`search`, `search_by_vector`,
/// `search_by_content_id`). Construct with `Default` and override fields; the coordinator
/// normalizes every value before use.
///
/// Task weighting and the hybrid weight only change scores where models or signals are blended,
/// so they live on [`CrossModelSearchRequest`] and [`HybridSearchRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
	pub limit: u32,
	pub offset: u32,
	pub min_similarity: f32,
	/// Containment filter on stored metadata (`metadata @> filter`).
	pub metadata_filter: Map<String, Value>,
	pub content_types: Vec<String>,
	pub use_query_expansion: bool,
	pub use_reranking: bool,
	/// Empty means the configured expansion types.
	pub expansion_types: Vec<String>,
	/// 0 means the configured maximum.
	pub max_expansions: u32,
	/// Base text for reranking vector and content-reference searches, which carry no query text.
	pub rerank_query: Option<String>,
	/// Embedding model to embed query text with and to restrict same-model retrieval to.
	pub model_hint: Option<String>,
}
impl Default for SearchOptions {
	fn default() -> Self {
		Self {
			limit: DEFAULT_LIMIT,
			offset: 0,
			min_similarity: DEFAULT_MIN_SIMILARITY,
			metadata_filter: Map::new(),
			content_types: Vec::new(),
			use_query_expansion: false,
			use_reranking: false,
			expansion_types: Vec::new(),
			max_expansions: 0,
			rerank_query: None,
			model_hint: None,
		}
	}
}
impl SearchOptions {
	pub fn normalized(&self, defaults: &SearchDefaults) -> Self {
		let mut out = self.clone();

		out.limit = normalize_limit(self.limit, defaults);
		out.min_similarity = normalize_min_similarity(self.min_similarity, defaults);
		out.max_expansions = if self.max_expansions == 0 {
			defaults.max_expansions
		} else {
			self.max_expansions.min(defaults.max_expansions)
		};

		if out.expansion_types.is_empty() {
			out.expansion_types = defaults.expansion_types.clone();
		}

		out.rerank_query = self
			.rerank_query
			.as_deref()
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.map(str::to_string);
		out.model_hint = self
			.model_hint
			.as_deref()
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.map(str::to_string);

		out
	}

	/// Number of ranked candidates needed to serve this page.
	pub fn window(&self) -> u32 {
		self.offset.saturating_add(self.limit)
	}
}

/// Configured fallbacks for option normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDefaults {
	pub default_limit: u32,
	pub max_limit: u32,
	pub min_similarity: f32,
	pub hybrid_weight: f32,
	pub max_expansions: u32,
	pub expansion_types: Vec<String>,
}
impl SearchDefaults {
	pub fn from_config(cfg: &prism_config::Search) -> Self {
		Self {
			default_limit: cfg.default_limit,
			max_limit: cfg.max_limit.min(prism_config::HARD_MAX_LIMIT),
			min_similarity: cfg.min_similarity,
			hybrid_weight: clamp_score(cfg.hybrid.default_weight),
			max_expansions: cfg.expansion.max_expansions,
			expansion_types: cfg.expansion.types.clone(),
		}
	}
}
impl Default for SearchDefaults {
	fn default() -> Self {
		Self::from_config(&prism_config::Search::default())
	}
}

/// `0` falls back to the default; anything else is capped to the configured maximum.
pub fn normalize_limit(limit: u32, defaults: &SearchDefaults) -> u32 {
	let max = defaults.max_limit.clamp(1, prism_config::HARD_MAX_LIMIT);

	if limit == 0 { defaults.default_limit.clamp(1, max) } else { limit.min(max) }
}

/// Non-positive or non-finite thresholds fall back to the default.
pub fn normalize_min_similarity(min_similarity: f32, defaults: &SearchDefaults) -> f32 {
	if !min_similarity.is_finite() || min_similarity <= 0.0 {
		return clamp_score(defaults.min_similarity);
	}

	clamp_score(min_similarity)
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
	pub results: Vec<SearchResult>,
	/// Ranked candidates before the page was cut.
	pub total: usize,
	/// Query variants actually searched; the original query first.
	pub queries: Vec<String>,
	pub correlation_id: Uuid,
	pub stages: Vec<StageTiming>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossModelSearchRequest {
	pub query: Option<String>,
	pub query_embedding: Option<Vec<f32>>,
	/// Model that produced `query_embedding`. Defaults to the configured embedding model.
	pub query_model: Option<String>,
	pub include_models: Vec<String>,
	pub exclude_models: Vec<String>,
	pub content_types: Vec<String>,
	pub metadata_filter: Map<String, Value>,
	pub limit: u32,
	pub min_similarity: f32,
	/// Weights similarity against model quality. Defaults to `cross_model.default_task_type`.
	pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchRequest {
	pub query: String,
	pub query_embedding: Option<Vec<f32>>,
	pub query_model: Option<String>,
	/// Semantic share of the blended score. Defaults to `search.hybrid.default_weight`.
	pub hybrid_weight: Option<f32>,
	pub include_models: Vec<String>,
	pub exclude_models: Vec<String>,
	pub content_types: Vec<String>,
	pub metadata_filter: Map<String, Value>,
	pub limit: u32,
	pub min_similarity: f32,
	pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingAlgorithm {
	Cosine,
	/// Cosine over the shared leading dimensions, scaled for dimension mismatch.
	CrossModelCosine,
	FullText,
}
impl RankingAlgorithm {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Cosine => "cosine",
			Self::CrossModelCosine => "cross_model_cosine",
			Self::FullText => "full_text",
		}
	}
}

/// Repository-level query options. Always tenant-scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryOptions {
	pub tenant_id: Uuid,
	/// Candidate window: the caller's offset plus limit.
	pub limit: u32,
	pub min_similarity: f32,
	pub metadata_filter: Map<String, Value>,
	pub content_types: Vec<String>,
	pub include_models: Vec<String>,
	pub exclude_models: Vec<String>,
	pub algorithm: RankingAlgorithm,
}

/// One row produced by the repository. `similarity` is the value thresholds and ordering used;
/// `raw_similarity` is the unadjusted cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryHit {
	pub content: EmbeddingVector,
	pub model_dimensions: u32,
	pub raw_similarity: f32,
	pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
	pub content: EmbeddingVector,
	pub model_dimensions: u32,
	pub rank: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpansionOptions {
	pub types: Vec<String>,
	pub max_expansions: usize,
}

/// The minimal projection a reranker sees.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
	pub id: Uuid,
	pub text: String,
	pub score: f32,
	pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RerankOptions {
	pub top_k: usize,
}

/// A reranker verdict. `id` may be absent for rerankers that only echo text; an identity is then
/// derived from `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedItem {
	pub id: Option<Uuid>,
	pub text: Option<String>,
	pub score: f32,
	pub metadata: Map<String, Value>,
}
