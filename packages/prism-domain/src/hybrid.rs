use std::collections::HashMap;

use uuid::Uuid;

use crate::{
	model::{CrossModelSearchResult, HybridSearchResult},
	score::{clamp_score, cmp_f32_desc, sort_ranked},
};

pub const DEFAULT_KEYWORD_RANK_SCALE: f32 = 4.0;

/// A full-text match carried into the merge with its raw `ts_rank_cd` value.
#[derive(Debug, Clone)]
pub struct KeywordCandidate {
	pub result: CrossModelSearchResult,
	pub rank: f32,
}

/// Blends a semantic ranking and a keyword ranking for the same query. Items present in only one
/// list are kept; they simply lack the other list's contribution.
#[derive(Debug, Clone, Copy)]
pub struct HybridMerger {
	weight: f32,
	keyword_rank_scale: f32,
}
impl HybridMerger {
	pub fn new(weight: f32) -> Self {
		Self::with_rank_scale(weight, DEFAULT_KEYWORD_RANK_SCALE)
	}

	pub fn with_rank_scale(weight: f32, keyword_rank_scale: f32) -> Self {
		let keyword_rank_scale = if keyword_rank_scale.is_finite() && keyword_rank_scale > 0.0 {
			keyword_rank_scale
		} else {
			DEFAULT_KEYWORD_RANK_SCALE
		};

		Self { weight: clamp_score(weight), keyword_rank_scale }
	}

	pub fn weight(&self) -> f32 {
		self.weight
	}

	pub fn keyword_score(&self, rank: f32) -> f32 {
		clamp_score(rank / self.keyword_rank_scale)
	}

	pub fn merge(
		&self,
		semantic: Vec<CrossModelSearchResult>,
		keyword: Vec<KeywordCandidate>,
	) -> Vec<HybridSearchResult> {
		let w = self.weight;
		let mut by_id: HashMap<Uuid, HybridSearchResult> = HashMap::new();

		for result in semantic {
			let semantic_score = clamp_score(result.final_score);

			match by_id.get_mut(&result.content_id()) {
				// The same content can surface from several models; keep its best semantic evidence.
				Some(existing) =>
					if cmp_f32_desc(semantic_score, existing.semantic_score).is_lt() {
						existing.cross_model = result;
						existing.semantic_score = semantic_score;
					},
				None => {
					by_id.insert(
						result.content_id(),
						HybridSearchResult {
							cross_model: result,
							semantic_score,
							keyword_score: 0.0,
							hybrid_score: 0.0,
						},
					);
				},
			}
		}

		for candidate in keyword {
			let keyword_score = self.keyword_score(candidate.rank);
			let entry =
				by_id.entry(candidate.result.content_id()).or_insert_with(|| HybridSearchResult {
					cross_model: candidate.result,
					semantic_score: 0.0,
					keyword_score: 0.0,
					hybrid_score: 0.0,
				});

			entry.keyword_score = entry.keyword_score.max(keyword_score);
		}

		let mut merged: Vec<HybridSearchResult> = by_id
			.into_values()
			.map(|mut item| {
				item.hybrid_score =
					clamp_score(w * item.semantic_score + (1.0 - w) * item.keyword_score);
				item.cross_model.result.score = item.hybrid_score;
				item.cross_model.result.record_match("semantic_score", item.semantic_score);
				item.cross_model.result.record_match("keyword_score", item.keyword_score);

				item
			})
			.collect();

		sort_ranked(&mut merged, |item| (item.hybrid_score, item.content_id()));

		merged
	}
}
