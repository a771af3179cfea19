mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, CrossModel, EmbeddingProviderConfig, LlmProviderConfig, Postgres, ProviderConfig,
	Providers, Search, SearchExpansion, SearchFanout, SearchHybrid, Service, Storage,
};

use std::{fs, path::Path};

/// Upper bound for any page size a caller may request.
pub const HARD_MAX_LIMIT: u32 = 100;

pub const TASK_TYPES: [&str; 4] = ["research", "code_analysis", "multilingual", "default"];
pub const EXPANSION_TYPES: [&str; 3] = ["synonyms", "decomposition", "hypothetical"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	let search = &cfg.search;

	if search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if search.max_limit > HARD_MAX_LIMIT {
		return Err(Error::Validation {
			message: format!("search.max_limit must be {HARD_MAX_LIMIT} or less."),
		});
	}
	if search.default_limit > search.max_limit {
		return Err(Error::Validation {
			message: "search.default_limit must not exceed search.max_limit.".to_string(),
		});
	}
	if !search.min_similarity.is_finite() || !(0.0..=1.0).contains(&search.min_similarity) {
		return Err(Error::Validation {
			message: "search.min_similarity must be in the range 0.0-1.0.".to_string(),
		});
	}
	if search.fanout.max_concurrency == 0 {
		return Err(Error::Validation {
			message: "search.fanout.max_concurrency must be greater than zero.".to_string(),
		});
	}

	for kind in &search.expansion.types {
		if !EXPANSION_TYPES.contains(&kind.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"search.expansion.types entries must be one of synonyms, decomposition, or hypothetical; got {kind:?}."
				),
			});
		}
	}

	if !search.hybrid.default_weight.is_finite()
		|| !(0.0..=1.0).contains(&search.hybrid.default_weight)
	{
		return Err(Error::Validation {
			message: "search.hybrid.default_weight must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !search.hybrid.keyword_rank_scale.is_finite() || search.hybrid.keyword_rank_scale <= 0.0 {
		return Err(Error::Validation {
			message: "search.hybrid.keyword_rank_scale must be greater than zero.".to_string(),
		});
	}
	if search.hybrid.keyword_candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "search.hybrid.keyword_candidate_multiplier must be greater than zero."
				.to_string(),
		});
	}
	if !TASK_TYPES.contains(&cfg.cross_model.default_task_type.as_str()) {
		return Err(Error::Validation {
			message: "cross_model.default_task_type must be one of research, code_analysis, multilingual, or default."
				.to_string(),
		});
	}

	for (model, score) in &cfg.cross_model.quality_overrides {
		if !score.is_finite() || !(0.0..=1.0).contains(score) {
			return Err(Error::Validation {
				message: format!(
					"cross_model.quality_overrides.{model} must be in the range 0.0-1.0."
				),
			});
		}
	}
	for (model, family) in &cfg.cross_model.model_families {
		if family.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("cross_model.model_families.{model} must be non-empty."),
			});
		}
	}

	let mut keys = vec![
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
	];

	if let Some(expander) = cfg.providers.expander.as_ref() {
		keys.push(("expander", &expander.api_key));
	}

	for (label, key) in keys {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.providers.embedding.api_base =
		cfg.providers.embedding.api_base.trim_end_matches('/').to_string();
	cfg.providers.rerank.api_base = cfg.providers.rerank.api_base.trim_end_matches('/').to_string();

	if let Some(expander) = cfg.providers.expander.as_mut() {
		expander.api_base = expander.api_base.trim_end_matches('/').to_string();
	}

	cfg.cross_model.default_task_type = cfg.cross_model.default_task_type.trim().to_lowercase();
	cfg.search.expansion.types =
		cfg.search.expansion.types.iter().map(|kind| kind.trim().to_lowercase()).collect();
	cfg.cross_model.model_families = cfg
		.cross_model
		.model_families
		.drain()
		.map(|(model, family)| (model.trim().to_string(), family.trim().to_lowercase()))
		.collect();
}
