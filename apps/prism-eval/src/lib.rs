use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	sync::Arc,
	time::Instant,
};

use clap::{Parser, ValueEnum};
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use prism_service::{
	CrossModelSearchRequest, HybridSearchRequest, PgSearchRepository, SearchContext,
	SearchCoordinator, SearchOptions,
};
use prism_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = prism_cli::VERSION,
	rename_all = "kebab",
	styles = prism_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	/// Results per query; overrides the dataset default.
	#[arg(long, value_name = "N")]
	pub limit: Option<u32>,
	#[arg(long, value_enum, default_value_t = Mode::Search)]
	pub mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
	Search,
	Hybrid,
	CrossModel,
}

#[derive(Debug, Deserialize)]
struct EvalDataset {
	name: Option<String>,
	#[serde(default)]
	defaults: EvalDefaults,
	queries: Vec<EvalQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct EvalDefaults {
	tenant_id: Option<Uuid>,
	limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EvalQuery {
	id: Option<String>,
	tenant_id: Option<Uuid>,
	query: String,
	expected_content_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct EvalOutput {
	dataset: EvalDatasetInfo,
	settings: EvalSettings,
	summary: EvalSummary,
	queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
struct EvalDatasetInfo {
	name: String,
	query_count: usize,
}

#[derive(Debug, Serialize)]
struct EvalSettings {
	config_path: String,
	mode: Mode,
	limit: u32,
}

#[derive(Debug, PartialEq, Serialize)]
struct EvalSummary {
	avg_recall_at_k: f64,
	avg_precision_at_k: f64,
	mean_rr: f64,
	mean_ndcg: f64,
	latency_ms_p50: f64,
	latency_ms_p95: f64,
}

#[derive(Debug, Serialize)]
struct QueryReport {
	id: String,
	tenant_id: Uuid,
	correlation_id: Uuid,
	expected_count: usize,
	retrieved_count: usize,
	relevant_count: usize,
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	latency_ms: f64,
	expected_content_ids: Vec<Uuid>,
	retrieved_content_ids: Vec<Uuid>,
}

#[derive(Debug, PartialEq)]
struct Metrics {
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	relevant_count: usize,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = prism_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let dataset = load_dataset(&args.dataset)?;
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let coordinator = SearchCoordinator::new(config, Arc::new(PgSearchRepository::new(db)));
	let limit = args
		.limit
		.or(dataset.defaults.limit)
		.unwrap_or(coordinator.defaults().default_limit)
		.max(1);
	let mut reports = Vec::with_capacity(dataset.queries.len());
	let mut latencies_ms = Vec::with_capacity(dataset.queries.len());

	for (index, query) in dataset.queries.iter().enumerate() {
		let Some(tenant_id) = query.tenant_id.or(dataset.defaults.tenant_id) else {
			return Err(eyre::eyre!(
				"Query {index} has no tenant_id and the dataset sets no default."
			));
		};
		let ctx = SearchContext::new(tenant_id);
		let started = Instant::now();
		let retrieved = run_query(&coordinator, &ctx, args.mode, &query.query, limit).await?;
		let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
		let retrieved = unique_ids(retrieved.into_iter());
		let expected: HashSet<Uuid> = query.expected_content_ids.iter().copied().collect();
		let metrics = compute_metrics(&retrieved, &expected);

		tracing::info!(
			tenant_id = %tenant_id,
			correlation_id = %ctx.correlation_id,
			query_index = index,
			recall_at_k = metrics.recall_at_k,
			latency_ms,
			"Evaluated query."
		);

		reports.push(QueryReport {
			id: query.id.clone().unwrap_or_else(|| format!("q{index}")),
			tenant_id,
			correlation_id: ctx.correlation_id,
			expected_count: expected.len(),
			retrieved_count: retrieved.len(),
			relevant_count: metrics.relevant_count,
			recall_at_k: metrics.recall_at_k,
			precision_at_k: metrics.precision_at_k,
			rr: metrics.rr,
			ndcg: metrics.ndcg,
			latency_ms,
			expected_content_ids: query.expected_content_ids.clone(),
			retrieved_content_ids: retrieved,
		});
		latencies_ms.push(latency_ms);
	}

	let output = EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "eval".to_string()),
			query_count: reports.len(),
		},
		settings: EvalSettings {
			config_path: args.config.display().to_string(),
			mode: args.mode,
			limit,
		},
		summary: summarize(&reports, &latencies_ms),
		queries: reports,
	};
	let json = serde_json::to_string_pretty(&output)?;

	println!("{json}");

	Ok(())
}

async fn run_query(
	coordinator: &SearchCoordinator,
	ctx: &SearchContext,
	mode: Mode,
	query: &str,
	limit: u32,
) -> color_eyre::Result<Vec<Uuid>> {
	let ids = match mode {
		Mode::Search => {
			let options = SearchOptions { limit, ..Default::default() };

			coordinator
				.search(ctx, query, &options)
				.await?
				.results
				.iter()
				.map(|result| result.content_id())
				.collect()
		},
		Mode::Hybrid => {
			let request =
				HybridSearchRequest { query: query.to_string(), limit, ..Default::default() };

			coordinator
				.hybrid_search(ctx, &request)
				.await?
				.iter()
				.map(|result| result.content_id())
				.collect()
		},
		Mode::CrossModel => {
			let request = CrossModelSearchRequest {
				query: Some(query.to_string()),
				limit,
				..Default::default()
			};

			coordinator
				.cross_model_search(ctx, &request)
				.await?
				.iter()
				.map(|result| result.content_id())
				.collect()
		},
	};

	Ok(ids)
}

fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;

	parse_dataset(&raw)
}

fn parse_dataset(raw: &str) -> color_eyre::Result<EvalDataset> {
	let dataset: EvalDataset = toml::from_str(raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}
	if let Some(index) = dataset.queries.iter().position(|query| query.query.trim().is_empty()) {
		return Err(eyre::eyre!("Query {index} has empty text."));
	}

	Ok(dataset)
}

fn unique_ids<I>(iter: I) -> Vec<Uuid>
where
	I: Iterator<Item = Uuid>,
{
	let mut seen = HashSet::new();

	iter.filter(|id| seen.insert(*id)).collect()
}

fn compute_metrics(retrieved: &[Uuid], expected: &HashSet<Uuid>) -> Metrics {
	let mut relevant_count = 0_usize;
	let mut dcg = 0.0_f64;
	let mut first_hit = None;

	for (index, id) in retrieved.iter().enumerate() {
		if !expected.contains(id) {
			continue;
		}

		let rank = index + 1;

		relevant_count += 1;
		dcg += 1.0 / (rank as f64 + 1.0).log2();
		first_hit.get_or_insert(rank);
	}

	let ideal_hits = expected.len().min(retrieved.len());
	let idcg: f64 = (1..=ideal_hits).map(|rank| 1.0 / (rank as f64 + 1.0).log2()).sum();

	Metrics {
		recall_at_k: if expected.is_empty() {
			0.0
		} else {
			relevant_count as f64 / expected.len() as f64
		},
		precision_at_k: if retrieved.is_empty() {
			0.0
		} else {
			relevant_count as f64 / retrieved.len() as f64
		},
		rr: first_hit.map(|rank| 1.0 / rank as f64).unwrap_or(0.0),
		ndcg: if idcg > 0.0 { dcg / idcg } else { 0.0 },
		relevant_count,
	}
}

fn summarize(reports: &[QueryReport], latencies_ms: &[f64]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let mut sorted = latencies_ms.to_vec();

	sorted.sort_by(f64::total_cmp);

	EvalSummary {
		avg_recall_at_k: reports.iter().map(|report| report.recall_at_k).sum::<f64>() / count,
		avg_precision_at_k: reports.iter().map(|report| report.precision_at_k).sum::<f64>() / count,
		mean_rr: reports.iter().map(|report| report.rr).sum::<f64>() / count,
		mean_ndcg: reports.iter().map(|report| report.ndcg).sum::<f64>() / count,
		latency_ms_p50: percentile(&sorted, 0.50),
		latency_ms_p95: percentile(&sorted, 0.95),
	}
}

/// Linear interpolation between closest ranks. `values` must be sorted.
fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let pos = percentile.clamp(0.0, 1.0) * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}
