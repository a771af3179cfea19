use std::collections::{HashMap, hash_map::Entry};

use uuid::Uuid;

use crate::{
	model::SearchResult,
	score::{clamp_score, sort_ranked},
};

/// Weight of the query variant at `index`, where index 0 is the original query. The i-th expansion
/// (1-indexed) weighs `1 / (i + 1)`, so no expansion ever outweighs the original.
pub fn variant_weight(index: usize) -> f32 {
	1.0 / (index as f32 + 1.0)
}

/// Results reported by one query variant.
#[derive(Debug, Clone)]
pub struct VariantResults {
	pub index: usize,
	pub query: String,
	pub results: Vec<SearchResult>,
}

struct MergedEntry {
	result: SearchResult,
	weighted_sum: f32,
	variant_hits: u32,
	last_variant: usize,
	last_contribution: f32,
}

/// Sums weight-scaled scores by content id across variants, then ranks and truncates.
///
/// Variants are folded in index order regardless of the order they were collected in, so the same
/// set of variant results always yields the same ranking.
pub fn merge_weighted(mut variants: Vec<VariantResults>, limit: usize) -> Vec<SearchResult> {
	variants.sort_by_key(|variant| variant.index);

	let mut by_id: HashMap<Uuid, MergedEntry> = HashMap::new();

	for variant in variants {
		let weight = variant_weight(variant.index);

		for result in variant.results {
			let contribution = clamp_score(result.score) * weight;

			match by_id.entry(result.content_id()) {
				Entry::Occupied(mut occupied) => {
					let entry = occupied.get_mut();

					if entry.last_variant == variant.index {
						// Duplicate within one variant: keep its strongest contribution only.
						if contribution > entry.last_contribution {
							entry.weighted_sum += contribution - entry.last_contribution;
							entry.last_contribution = contribution;
						}
					} else {
						entry.weighted_sum += contribution;
						entry.variant_hits += 1;
						entry.last_variant = variant.index;
						entry.last_contribution = contribution;
					}
				},
				Entry::Vacant(vacant) => {
					vacant.insert(MergedEntry {
						result,
						weighted_sum: contribution,
						variant_hits: 1,
						last_variant: variant.index,
						last_contribution: contribution,
					});
				},
			}
		}
	}

	let mut merged: Vec<SearchResult> = by_id
		.into_values()
		.map(|entry| {
			let mut result = entry.result;

			// Pre-clamp diagnostic; it exceeds 1.0 when several variants agree.
			result.record_match("unclamped_weighted_sum", entry.weighted_sum);
			result.record_match("variant_hits", entry.variant_hits);

			result.score = clamp_score(entry.weighted_sum);

			result
		})
		.collect();

	sort_ranked(&mut merged, |result| (result.score, result.content_id()));
	merged.truncate(limit);

	merged
}
