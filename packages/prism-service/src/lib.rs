pub mod context;
pub mod cross_model;
pub mod executor;
pub mod expand;
pub mod fanout;
pub mod hybrid;
pub mod repository;
pub mod rerank;
pub mod search;
pub mod stage;
pub mod types;

mod error;

pub use context::SearchContext;
pub use error::{Error, Result};
pub use executor::VectorSearchExecutor;
pub use expand::{CompositeExpander, DecompositionExpander, LlmQueryExpander};
pub use fanout::MultiQueryFanout;
pub use repository::PgSearchRepository;
pub use rerank::RerankAdapter;
pub use stage::{Stage, StageOutcome, StageRecorder, StageTiming};
pub use types::{
	CrossModelSearchRequest, ExpansionOptions, HybridSearchRequest, KeywordMatch,
	RankingAlgorithm, RepositoryHit, RepositoryOptions, RerankCandidate, RerankOptions,
	RerankedItem, SearchDefaults, SearchOptions, SearchResults,
};

use std::{future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

use prism_config::{Config, EmbeddingProviderConfig, ProviderConfig};
use prism_domain::{
	model::EmbeddingVector,
	normalizer::{CalibrationTables, CrossModelNormalizer},
};
use prism_providers::{embedding, rerank as rerank_provider};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingService
where
	Self: Send + Sync,
{
	/// Embeds `text`. The returned vector names the model that produced it; its content and tenant
	/// ids are nil.
	fn generate_embedding<'a>(
		&'a self,
		text: &'a str,
		content_type: &'a str,
		model_hint: Option<&'a str>,
	) -> BoxFuture<'a, Result<EmbeddingVector>>;
}

/// Tenant-scoped retrieval. Every method must only return rows of `options.tenant_id`.
pub trait SearchRepository
where
	Self: Send + Sync,
{
	/// `Ok(None)` means no results.
	fn search_by_vector<'a>(
		&'a self,
		vector: &'a [f32],
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>>;

	/// Items similar to the stored embedding of `content_id`, excluding that item. `Ok(None)` when
	/// the reference item is unknown.
	fn search_by_content_id<'a>(
		&'a self,
		content_id: Uuid,
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>>;

	/// Candidates from every stored model, compared on shared leading dimensions.
	fn cross_model_candidates<'a>(
		&'a self,
		vector: &'a [f32],
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<RepositoryHit>>>>;

	fn keyword_search<'a>(
		&'a self,
		query: &'a str,
		options: &'a RepositoryOptions,
	) -> BoxFuture<'a, Result<Option<Vec<KeywordMatch>>>>;
}

pub trait QueryExpander
where
	Self: Send + Sync,
{
	/// Alternative phrasings of `query`, not including `query` itself.
	fn expand<'a>(
		&'a self,
		query: &'a str,
		options: &'a ExpansionOptions,
	) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub trait Reranker
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		query: &'a str,
		candidates: &'a [RerankCandidate],
		options: &'a RerankOptions,
	) -> BoxFuture<'a, Result<Vec<RerankedItem>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingService>,
	pub reranker: Arc<dyn Reranker>,
	pub expander: Option<Arc<dyn QueryExpander>>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingService>,
		reranker: Arc<dyn Reranker>,
		expander: Option<Arc<dyn QueryExpander>>,
	) -> Self {
		Self { embedding, reranker, expander }
	}

	/// HTTP-backed providers from `[providers]`. Expansion always includes the built-in
	/// decomposition strategy and adds the LLM expander when one is configured.
	pub fn from_config(cfg: &Config) -> Self {
		let mut expanders: Vec<Arc<dyn QueryExpander>> = Vec::new();

		if let Some(llm) = cfg.providers.expander.as_ref() {
			expanders.push(Arc::new(LlmQueryExpander::new(llm.clone())));
		}

		expanders.push(Arc::new(DecompositionExpander));

		let expander: Arc<dyn QueryExpander> = Arc::new(CompositeExpander::new(expanders));

		Self {
			embedding: Arc::new(ProviderEmbedding { cfg: cfg.providers.embedding.clone() }),
			reranker: Arc::new(ProviderReranker { cfg: cfg.providers.rerank.clone() }),
			expander: Some(expander),
		}
	}
}

/// The search engine. Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct SearchCoordinator {
	pub cfg: Arc<Config>,
	pub providers: Providers,
	pub repository: Arc<dyn SearchRepository>,
	pub normalizer: Arc<CrossModelNormalizer>,
	pub(crate) defaults: SearchDefaults,
	pub(crate) executor: VectorSearchExecutor,
	pub(crate) fanout: MultiQueryFanout,
	pub(crate) reranker: RerankAdapter,
}
impl SearchCoordinator {
	pub fn new(cfg: Config, repository: Arc<dyn SearchRepository>) -> Self {
		let providers = Providers::from_config(&cfg);

		Self::with_providers(cfg, repository, providers)
	}

	pub fn with_providers(
		cfg: Config,
		repository: Arc<dyn SearchRepository>,
		providers: Providers,
	) -> Self {
		let tables = CalibrationTables::builtin().with_overrides(&cfg.cross_model);

		Self::with_normalizer(cfg, repository, providers, CrossModelNormalizer::new(tables))
	}

	pub fn with_normalizer(
		cfg: Config,
		repository: Arc<dyn SearchRepository>,
		providers: Providers,
		normalizer: CrossModelNormalizer,
	) -> Self {
		let defaults = SearchDefaults::from_config(&cfg.search);
		let executor = VectorSearchExecutor::new(repository.clone());
		let fanout = MultiQueryFanout::new(
			executor.clone(),
			providers.embedding.clone(),
			cfg.search.fanout.max_concurrency as usize,
		);
		let reranker = RerankAdapter::new(providers.reranker.clone());

		Self {
			cfg: Arc::new(cfg),
			providers,
			repository,
			normalizer: Arc::new(normalizer),
			defaults,
			executor,
			fanout,
			reranker,
		}
	}

	pub fn defaults(&self) -> &SearchDefaults {
		&self.defaults
	}
}

struct ProviderEmbedding {
	cfg: EmbeddingProviderConfig,
}
impl EmbeddingService for ProviderEmbedding {
	fn generate_embedding<'a>(
		&'a self,
		text: &'a str,
		content_type: &'a str,
		model_hint: Option<&'a str>,
	) -> BoxFuture<'a, Result<EmbeddingVector>> {
		Box::pin(async move {
			let model = model_hint.unwrap_or(self.cfg.model.as_str());
			let vectors = embedding::embed(&self.cfg, model, &[text.to_string()]).await?;
			let Some(vector) = vectors.into_iter().next() else {
				return Err(Error::Provider {
					message: "Embedding provider returned no vectors.".to_string(),
				});
			};

			Ok(EmbeddingVector {
				content_id: Uuid::nil(),
				tenant_id: Uuid::nil(),
				content_type: content_type.to_string(),
				model: model.to_string(),
				vector,
				metadata: Default::default(),
			})
		})
	}
}

struct ProviderReranker {
	cfg: ProviderConfig,
}
impl Reranker for ProviderReranker {
	fn rerank<'a>(
		&'a self,
		query: &'a str,
		candidates: &'a [RerankCandidate],
		options: &'a RerankOptions,
	) -> BoxFuture<'a, Result<Vec<RerankedItem>>> {
		Box::pin(async move {
			let docs: Vec<String> =
				candidates.iter().map(|candidate| candidate.text.clone()).collect();
			let ranked = rerank_provider::rerank(&self.cfg, query, &docs, options.top_k).await?;
			let mut items: Vec<RerankedItem> = ranked
				.into_iter()
				.filter_map(|(index, score)| {
					candidates.get(index).map(|candidate| RerankedItem {
						id: Some(candidate.id),
						text: None,
						score,
						metadata: Default::default(),
					})
				})
				.collect();

			items.sort_by(|left, right| {
				prism_domain::score::cmp_f32_desc(left.score, right.score)
			});
			items.truncate(options.top_k);

			Ok(items)
		})
	}
}

/// Stable, non-reversible tag for query text in logs.
pub(crate) fn query_hash(query: &str) -> String {
	let hash = blake3::hash(query.as_bytes()).to_hex();

	hash.as_str()[..12].to_string()
}
