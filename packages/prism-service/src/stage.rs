use std::{future::Future, time::Instant};

use serde::Serialize;

use crate::{Result, SearchContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Validate,
	Expand,
	Fanout,
	Embed,
	Retrieve,
	Rerank,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Validate => "validate",
			Self::Expand => "expand",
			Self::Fanout => "fanout",
			Self::Embed => "embed",
			Self::Retrieve => "retrieve",
			Self::Rerank => "rerank",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
	Ok,
	/// Completed with reduced features, e.g. expansion fell back to the original query.
	Degraded,
	Skipped,
	Failed,
}
impl StageOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Degraded => "degraded",
			Self::Skipped => "skipped",
			Self::Failed => "failed",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
	pub stage: Stage,
	pub outcome: StageOutcome,
	pub duration_ms: u64,
}

/// Records the state transitions of one call. Owned by that call only.
pub struct StageRecorder<'a> {
	ctx: &'a SearchContext,
	operation: &'static str,
	timings: Vec<StageTiming>,
}
impl<'a> StageRecorder<'a> {
	pub fn new(ctx: &'a SearchContext, operation: &'static str) -> Self {
		Self { ctx, operation, timings: Vec::new() }
	}

	pub fn record(&mut self, stage: Stage, outcome: StageOutcome, started: Instant) {
		let duration_ms = started.elapsed().as_millis() as u64;

		tracing::debug!(
			tenant_id = %self.ctx.tenant_id,
			correlation_id = %self.ctx.correlation_id,
			operation = self.operation,
			stage = stage.as_str(),
			outcome = outcome.as_str(),
			duration_ms,
			"Search stage finished."
		);

		self.timings.push(StageTiming { stage, outcome, duration_ms });
	}

	pub fn skip(&mut self, stage: Stage) {
		self.record(stage, StageOutcome::Skipped, Instant::now());
	}

	/// Awaits `fut`, recording `Ok` or `Failed` depending on its result.
	pub async fn track<F, T>(&mut self, stage: Stage, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let started = Instant::now();
		let out = fut.await;
		let outcome = if out.is_ok() { StageOutcome::Ok } else { StageOutcome::Failed };

		self.record(stage, outcome, started);

		out
	}

	pub fn finish(self) -> Vec<StageTiming> {
		tracing::info!(
			tenant_id = %self.ctx.tenant_id,
			correlation_id = %self.ctx.correlation_id,
			operation = self.operation,
			stages = self.timings.len(),
			total_ms = self.timings.iter().map(|timing| timing.duration_ms).sum::<u64>(),
			"Search finished."
		);

		self.timings
	}
}
