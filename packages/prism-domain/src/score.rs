use std::cmp::Ordering;

use uuid::Uuid;

/// Clamps a score into [0, 1]. Non-finite values collapse to 0.
pub fn clamp_score(score: f32) -> f32 {
	if score.is_nan() {
		return 0.0;
	}

	score.clamp(0.0, 1.0)
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Descending by score, then ascending by content id so pages are reproducible.
pub fn cmp_ranked(left: (f32, Uuid), right: (f32, Uuid)) -> Ordering {
	cmp_f32_desc(left.0, right.0).then_with(|| left.1.cmp(&right.1))
}

pub fn sort_ranked<T>(items: &mut [T], key: impl Fn(&T) -> (f32, Uuid)) {
	items.sort_by(|left, right| cmp_ranked(key(left), key(right)));
}
