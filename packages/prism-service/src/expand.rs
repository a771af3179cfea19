use std::{collections::HashSet, sync::Arc};

use prism_config::LlmProviderConfig;
use prism_providers::expander;

use crate::{BoxFuture, ExpansionOptions, QueryExpander, Result};

const DECOMPOSITION: &str = "decomposition";

/// Asks the configured chat model for synonym, decomposition and hypothetical-document variants.
pub struct LlmQueryExpander {
	cfg: LlmProviderConfig,
}
impl LlmQueryExpander {
	pub fn new(cfg: LlmProviderConfig) -> Self {
		Self { cfg }
	}
}
impl QueryExpander for LlmQueryExpander {
	fn expand<'a>(
		&'a self,
		query: &'a str,
		options: &'a ExpansionOptions,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if options.max_expansions == 0 {
				return Ok(Vec::new());
			}

			let queries =
				expander::expand(&self.cfg, query, &options.types, options.max_expansions as u32)
					.await?;

			Ok(queries)
		})
	}
}

/// Splits compound queries ("a and b", "a, b") into their parts. Only active when
/// `"decomposition"` is among the requested types.
pub struct DecompositionExpander;
impl QueryExpander for DecompositionExpander {
	fn expand<'a>(
		&'a self,
		query: &'a str,
		options: &'a ExpansionOptions,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		let parts = if options.types.iter().any(|kind| kind == DECOMPOSITION) {
			prism_domain::query::decompose_query(query)
		} else {
			Vec::new()
		};

		Box::pin(async move { Ok(parts) })
	}
}

/// Runs expanders in order and keeps the first `max_expansions` distinct variants. A failing member
/// is skipped; the composite fails only when every member failed.
pub struct CompositeExpander {
	expanders: Vec<Arc<dyn QueryExpander>>,
}
impl CompositeExpander {
	pub fn new(expanders: Vec<Arc<dyn QueryExpander>>) -> Self {
		Self { expanders }
	}
}
impl QueryExpander for CompositeExpander {
	fn expand<'a>(
		&'a self,
		query: &'a str,
		options: &'a ExpansionOptions,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let mut out = Vec::new();
			let mut seen = HashSet::new();
			let mut first_err = None;
			let mut succeeded = 0_usize;

			seen.insert(query.trim().to_lowercase());

			for expander in &self.expanders {
				if out.len() >= options.max_expansions {
					break;
				}

				match expander.expand(query, options).await {
					Ok(variants) => {
						succeeded += 1;

						for variant in variants {
							let trimmed = variant.trim();

							if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
								continue;
							}
							if out.len() >= options.max_expansions {
								break;
							}

							out.push(trimmed.to_string());
						}
					},
					Err(err) => {
						tracing::warn!(error = %err, "Query expander failed; trying the next one.");

						first_err.get_or_insert(err);
					},
				}
			}

			if let Some(err) = first_err.filter(|_| succeeded == 0) {
				return Err(err);
			}

			Ok(out)
		})
	}
}
