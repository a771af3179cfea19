use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

static CONJUNCTION_SPLIT: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?i)\s*(?:[;,?]|\band\b|\bor\b|\bversus\b|\bvs\b\.?)\s*").ok()
});

const MIN_FRAGMENT_CHARS: usize = 3;

/// Builds the variant list for fan-out: the original query first, then unique expansions, capped
/// at `max_expansions` extra entries. Comparison is case-insensitive on trimmed text.
pub fn normalize_variants(
	original: &str,
	expansions: Vec<String>,
	max_expansions: usize,
) -> Vec<String> {
	let mut out = Vec::with_capacity(max_expansions + 1);
	let mut seen = HashSet::new();
	let original = original.trim();

	seen.insert(original.to_lowercase());
	out.push(original.to_string());

	for expansion in expansions {
		if out.len() > max_expansions {
			break;
		}

		let trimmed = expansion.trim();

		if trimmed.is_empty() {
			continue;
		}
		if seen.insert(trimmed.to_lowercase()) {
			out.push(trimmed.to_string());
		}
	}

	out
}

/// Splits a compound query into its standalone parts. Returns an empty list when the query has no
/// more than one meaningful part.
pub fn decompose_query(query: &str) -> Vec<String> {
	let Some(pattern) = CONJUNCTION_SPLIT.as_ref() else { return Vec::new() };
	let parts: Vec<String> = pattern
		.split(query.trim())
		.map(str::trim)
		.filter(|part| part.chars().count() >= MIN_FRAGMENT_CHARS)
		.map(str::to_string)
		.collect();

	if parts.len() < 2 {
		return Vec::new();
	}

	parts
}
