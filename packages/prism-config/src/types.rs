use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub cross_model: CrossModel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	/// Optional. Query expansion falls back to the built-in decomposition strategy when absent.
	pub expander: Option<LlmProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	#[serde(default = "max_limit")]
	pub max_limit: u32,
	#[serde(default = "default_min_similarity")]
	pub min_similarity: f32,
	#[serde(default)]
	pub expansion: SearchExpansion,
	#[serde(default)]
	pub fanout: SearchFanout,
	#[serde(default)]
	pub hybrid: SearchHybrid,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_limit: default_limit(),
			max_limit: max_limit(),
			min_similarity: default_min_similarity(),
			expansion: SearchExpansion::default(),
			fanout: SearchFanout::default(),
			hybrid: SearchHybrid::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchExpansion {
	#[serde(default = "default_max_expansions")]
	pub max_expansions: u32,
	/// Any of "synonyms", "decomposition", "hypothetical".
	#[serde(default = "default_expansion_types")]
	pub types: Vec<String>,
}
impl Default for SearchExpansion {
	fn default() -> Self {
		Self { max_expansions: default_max_expansions(), types: default_expansion_types() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFanout {
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: u32,
}
impl Default for SearchFanout {
	fn default() -> Self {
		Self { max_concurrency: default_max_concurrency() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHybrid {
	#[serde(default = "default_hybrid_weight")]
	pub default_weight: f32,
	/// Full-text ranks are divided by this value before clamping to 1.0.
	#[serde(default = "default_keyword_rank_scale")]
	pub keyword_rank_scale: f32,
	/// Keyword candidates fetched per requested result.
	#[serde(default = "default_keyword_candidate_multiplier")]
	pub keyword_candidate_multiplier: u32,
}
impl Default for SearchHybrid {
	fn default() -> Self {
		Self {
			default_weight: default_hybrid_weight(),
			keyword_rank_scale: default_keyword_rank_scale(),
			keyword_candidate_multiplier: default_keyword_candidate_multiplier(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossModel {
	/// One of "research", "code_analysis", "multilingual", "default".
	#[serde(default = "default_task_type")]
	pub default_task_type: String,
	/// Optional. Model name to quality score in the range 0.0-1.0.
	#[serde(default)]
	pub quality_overrides: HashMap<String, f32>,
	/// Optional. Model name to family label, e.g. "text-embedding-3-small" = "openai".
	#[serde(default)]
	pub model_families: HashMap<String, String>,
}
impl Default for CrossModel {
	fn default() -> Self {
		Self {
			default_task_type: default_task_type(),
			quality_overrides: HashMap::new(),
			model_families: HashMap::new(),
		}
	}
}

fn default_limit() -> u32 {
	10
}

fn max_limit() -> u32 {
	100
}

fn default_min_similarity() -> f32 {
	0.7
}

fn default_max_expansions() -> u32 {
	3
}

fn default_expansion_types() -> Vec<String> {
	vec!["synonyms".to_string(), "decomposition".to_string()]
}

fn default_max_concurrency() -> u32 {
	4
}

fn default_hybrid_weight() -> f32 {
	0.7
}

fn default_keyword_rank_scale() -> f32 {
	4.0
}

fn default_keyword_candidate_multiplier() -> u32 {
	2
}

fn default_task_type() -> String {
	"default".to_string()
}
