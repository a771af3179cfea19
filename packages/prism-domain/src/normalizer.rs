//! Calibration of similarity scores produced by different embedding models.
//!
//! Scores from two embedding spaces are not directly comparable: a 768-dimension model and a
//! 3072-dimension model assign systematically different cosine similarities to the same pair of
//! texts. The normalizer maps a raw similarity into a calibrated score in [0, 1] using a dimension
//! mismatch penalty, a family-to-family calibration multiplier, and a per-model quality prior.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::score::clamp_score;

pub const SAME_MODEL_CALIBRATION: f32 = 1.0;
pub const SAME_FAMILY_CALIBRATION: f32 = 0.95;
pub const UNKNOWN_PAIR_CALIBRATION: f32 = 0.85;
pub const UNKNOWN_MODEL_QUALITY: f32 = 0.80;
/// Largest fraction of a score the dimension mismatch penalty may remove.
pub const MAX_DIMENSION_PENALTY: f32 = 0.1;

const BUILTIN_MODEL_FAMILIES: &[(&str, &str)] = &[
	("text-embedding-3-small", "openai"),
	("text-embedding-3-large", "openai"),
	("text-embedding-ada-002", "openai"),
	("embed-english-v3.0", "cohere"),
	("embed-multilingual-v3.0", "cohere"),
	("embed-english-light-v3.0", "cohere"),
	("voyage-3", "voyage"),
	("voyage-code-3", "voyage"),
	("voyage-large-2", "voyage"),
	("text-embedding-004", "google"),
	("gemini-embedding-001", "google"),
	("bge-large-en-v1.5", "bge"),
	("bge-m3", "bge"),
	("e5-large-v2", "e5"),
	("multilingual-e5-large", "e5"),
	("all-minilm-l6-v2", "sentence-transformers"),
	("all-mpnet-base-v2", "sentence-transformers"),
	("nomic-embed-text-v1.5", "nomic"),
];

// Checked in order; the first matching prefix wins.
const BUILTIN_FAMILY_PREFIXES: &[(&str, &str)] = &[
	("text-embedding-3", "openai"),
	("text-embedding-ada", "openai"),
	("embed-", "cohere"),
	("voyage-", "voyage"),
	("gemini-embedding", "google"),
	("text-embedding-00", "google"),
	("bge-", "bge"),
	("multilingual-e5", "e5"),
	("e5-", "e5"),
	("all-minilm", "sentence-transformers"),
	("all-mpnet", "sentence-transformers"),
	("nomic-embed", "nomic"),
];

const BUILTIN_MODEL_QUALITY: &[(&str, f32)] = &[
	("text-embedding-3-large", 0.95),
	("text-embedding-3-small", 0.85),
	("text-embedding-ada-002", 0.82),
	("embed-english-v3.0", 0.92),
	("embed-multilingual-v3.0", 0.91),
	("embed-english-light-v3.0", 0.84),
	("voyage-3", 0.93),
	("voyage-code-3", 0.92),
	("voyage-large-2", 0.90),
	("text-embedding-004", 0.90),
	("gemini-embedding-001", 0.94),
	("bge-large-en-v1.5", 0.88),
	("bge-m3", 0.89),
	("e5-large-v2", 0.86),
	("multilingual-e5-large", 0.87),
	("all-minilm-l6-v2", 0.80),
	("all-mpnet-base-v2", 0.83),
	("nomic-embed-text-v1.5", 0.86),
];

// (source family, target family). Not symmetric; both directions are listed explicitly.
const BUILTIN_FAMILY_CALIBRATION: &[(&str, &str, f32)] = &[
	("openai", "cohere", 0.92),
	("cohere", "openai", 0.91),
	("openai", "voyage", 0.93),
	("voyage", "openai", 0.93),
	("openai", "google", 0.91),
	("google", "openai", 0.90),
	("openai", "bge", 0.89),
	("bge", "openai", 0.88),
	("openai", "e5", 0.88),
	("e5", "openai", 0.88),
	("openai", "sentence-transformers", 0.86),
	("sentence-transformers", "openai", 0.85),
	("openai", "nomic", 0.88),
	("nomic", "openai", 0.87),
	("cohere", "voyage", 0.91),
	("voyage", "cohere", 0.92),
	("cohere", "google", 0.90),
	("google", "cohere", 0.90),
	("bge", "e5", 0.90),
	("e5", "bge", 0.91),
	("bge", "sentence-transformers", 0.88),
	("sentence-transformers", "bge", 0.87),
	("e5", "sentence-transformers", 0.87),
	("sentence-transformers", "e5", 0.87),
	("bge", "nomic", 0.89),
	("nomic", "bge", 0.89),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
	Research,
	CodeAnalysis,
	Multilingual,
	#[default]
	Default,
}
impl TaskType {
	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_lowercase().as_str() {
			"research" => Some(Self::Research),
			"code_analysis" => Some(Self::CodeAnalysis),
			"multilingual" => Some(Self::Multilingual),
			"default" => Some(Self::Default),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Research => "research",
			Self::CodeAnalysis => "code_analysis",
			Self::Multilingual => "multilingual",
			Self::Default => "default",
		}
	}

	pub fn weights(self) -> ScoreWeights {
		match self {
			Self::Research => ScoreWeights { similarity: 0.6, quality: 0.4 },
			Self::CodeAnalysis => ScoreWeights { similarity: 0.7, quality: 0.3 },
			Self::Multilingual => ScoreWeights { similarity: 0.65, quality: 0.35 },
			Self::Default => ScoreWeights { similarity: 0.8, quality: 0.2 },
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
	pub similarity: f32,
	pub quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedScore {
	pub dimension_penalty: f32,
	pub calibration: f32,
	pub calibrated_similarity: f32,
	pub quality: f32,
	pub final_score: f32,
}

/// Immutable lookup data for a normalizer. Model names are canonicalized before lookup: lowercased,
/// trimmed, and stripped of any `org/` prefix such as `BAAI/`.
#[derive(Debug, Clone)]
pub struct CalibrationTables {
	families: HashMap<String, String>,
	family_prefixes: Vec<(String, String)>,
	calibration: HashMap<(String, String), f32>,
	quality: HashMap<String, f32>,
}
impl CalibrationTables {
	pub fn builtin() -> Self {
		Self {
			families: BUILTIN_MODEL_FAMILIES
				.iter()
				.map(|(model, family)| (model.to_string(), family.to_string()))
				.collect(),
			family_prefixes: BUILTIN_FAMILY_PREFIXES
				.iter()
				.map(|(prefix, family)| (prefix.to_string(), family.to_string()))
				.collect(),
			calibration: BUILTIN_FAMILY_CALIBRATION
				.iter()
				.map(|(source, target, value)| ((source.to_string(), target.to_string()), *value))
				.collect(),
			quality: BUILTIN_MODEL_QUALITY
				.iter()
				.map(|(model, value)| (model.to_string(), *value))
				.collect(),
		}
	}

	pub fn with_overrides(mut self, cfg: &prism_config::CrossModel) -> Self {
		for (model, family) in &cfg.model_families {
			self.families.insert(canonical_model(model), family.trim().to_lowercase());
		}
		for (model, quality) in &cfg.quality_overrides {
			self.quality.insert(canonical_model(model), clamp_score(*quality));
		}

		self
	}

	pub fn family_of(&self, model: &str) -> Option<&str> {
		let model = canonical_model(model);

		if let Some(family) = self.families.get(&model) {
			return Some(family.as_str());
		}

		self.family_prefixes
			.iter()
			.find(|(prefix, _)| model.starts_with(prefix.as_str()))
			.map(|(_, family)| family.as_str())
	}

	pub fn quality(&self, model: &str) -> f32 {
		self.quality.get(&canonical_model(model)).copied().unwrap_or(UNKNOWN_MODEL_QUALITY)
	}

	pub fn calibration(&self, source_model: &str, target_model: &str) -> f32 {
		if canonical_model(source_model) == canonical_model(target_model) {
			return SAME_MODEL_CALIBRATION;
		}

		let (Some(source), Some(target)) = (self.family_of(source_model), self.family_of(target_model))
		else {
			return UNKNOWN_PAIR_CALIBRATION;
		};

		if source == target {
			return SAME_FAMILY_CALIBRATION;
		}

		self.calibration
			.get(&(source.to_string(), target.to_string()))
			.copied()
			.unwrap_or(UNKNOWN_PAIR_CALIBRATION)
	}
}
impl Default for CalibrationTables {
	fn default() -> Self {
		Self::builtin()
	}
}

#[derive(Debug, Clone, Default)]
pub struct CrossModelNormalizer {
	tables: CalibrationTables,
}
impl CrossModelNormalizer {
	pub fn new(tables: CalibrationTables) -> Self {
		Self { tables }
	}

	pub fn tables(&self) -> &CalibrationTables {
		&self.tables
	}

	/// Calibrated similarity in [0, 1] for a raw score produced in `source_model`'s space, made
	/// comparable to scores in `target_model`'s space.
	pub fn normalize(
		&self,
		raw_similarity: f32,
		source_model: &str,
		target_model: &str,
		source_dim: u32,
		target_dim: u32,
	) -> f32 {
		let penalty = dimension_penalty(source_dim, target_dim);
		let calibration = self.tables.calibration(source_model, target_model);

		clamp_score(clamp_score(raw_similarity) * penalty * calibration)
	}

	pub fn score(
		&self,
		raw_similarity: f32,
		source_model: &str,
		target_model: &str,
		source_dim: u32,
		target_dim: u32,
		task: TaskType,
	) -> NormalizedScore {
		let dimension_penalty = dimension_penalty(source_dim, target_dim);
		let calibration = self.tables.calibration(source_model, target_model);
		let calibrated_similarity =
			clamp_score(clamp_score(raw_similarity) * dimension_penalty * calibration);
		let quality = self.tables.quality(source_model);
		let weights = task.weights();
		let final_score =
			clamp_score(weights.similarity * calibrated_similarity + weights.quality * quality);

		NormalizedScore { dimension_penalty, calibration, calibrated_similarity, quality, final_score }
	}
}

/// Multiplier in [0.9, 1.0]; 1.0 when dimensions match, shrinking as the spaces diverge.
pub fn dimension_penalty(source_dim: u32, target_dim: u32) -> f32 {
	if source_dim == target_dim {
		return 1.0;
	}

	let low = source_dim.min(target_dim) as f32;
	let high = source_dim.max(target_dim) as f32;

	if high <= 0.0 {
		return 1.0;
	}

	(1.0 - MAX_DIMENSION_PENALTY) + MAX_DIMENSION_PENALTY * (low / high)
}

pub fn canonical_model(model: &str) -> String {
	let trimmed = model.trim();
	let name = trimmed.rsplit('/').next().unwrap_or(trimmed);

	name.to_lowercase()
}
