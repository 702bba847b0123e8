//! Query execution.
//!
//! The executor runs semantic retrieval and structured filtering as two
//! independent branches, merges their candidates, applies client-side
//! checks, ranks, caps, and finally runs the pipe chain.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kissql_core::{
    ArticleId, Error, ExecutionError, ExecutionStage, FilterOutcome, Metadata, MetadataSource,
    ScoredId, SearchHit, SearchResponse, SemanticRequest, SemanticRetriever, StoreError,
    StructuredStore, Warning,
};

use crate::ast::{Connective, StructuredQuery};
use crate::compiler::{compile_all, CompiledConstraint};
use crate::parser::QueryParser;
use crate::pipe::apply_pipes;
use crate::ranker::{sort_hits, Ranker, STRUCTURED_BASE_SCORE};

/// Executor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Result cap when the query has no `limit:`
    pub default_limit: usize,
    /// Upper bound on any cap, including an explicit `limit:`
    pub max_limit: usize,
    /// Semantic candidates requested per result slot
    pub overfetch_factor: usize,
    /// Fields searched by negated and boosted text terms
    pub text_fields: Vec<String>,
    /// Per-branch deadline
    pub branch_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
            overfetch_factor: 4,
            text_fields: vec!["title".into(), "summary".into(), "content".into()],
            branch_timeout: None,
        }
    }
}

/// Independent cancellation for the two retrieval branches.
#[derive(Debug, Clone, Default)]
pub struct BranchCancellation {
    pub semantic: CancellationToken,
    pub structured: CancellationToken,
}

impl BranchCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Branch tokens that are also cancelled when `parent` is.
    pub fn from_parent(parent: &CancellationToken) -> Self {
        Self {
            semantic: parent.child_token(),
            structured: parent.child_token(),
        }
    }

    pub fn cancel_all(&self) {
        self.semantic.cancel();
        self.structured.cancel();
    }
}

/// Hybrid query executor.
pub struct QueryExecutor {
    semantic: Arc<dyn SemanticRetriever>,
    structured: Arc<dyn StructuredStore>,
    metadata: Arc<dyn MetadataSource>,
    parser: QueryParser,
    config: ExecutorConfig,
    /// Randomness for `SAMPLE`
    rng: Mutex<StdRng>,
}

impl QueryExecutor {
    /// Create a new query executor.
    pub fn new(
        semantic: Arc<dyn SemanticRetriever>,
        structured: Arc<dyn StructuredStore>,
        metadata: Arc<dyn MetadataSource>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            semantic,
            structured,
            metadata,
            parser: QueryParser::default(),
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create an executor over a store that provides every capability.
    pub fn from_store<S>(store: Arc<S>, config: ExecutorConfig) -> Self
    where
        S: SemanticRetriever + StructuredStore + MetadataSource + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    /// Use a specific random generator for `SAMPLE`.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a query string.
    pub async fn execute(&self, query_str: &str) -> Result<SearchResponse, Error> {
        debug!("Executing query: {}", query_str);
        let parsed = self.parser.parse(query_str)?;
        self.execute_parsed(&parsed).await
    }

    /// Execute with a pre-parsed query.
    pub async fn execute_parsed(&self, query: &StructuredQuery) -> Result<SearchResponse, Error> {
        self.execute_with(query, &BranchCancellation::new()).await
    }

    /// Execute with caller-controlled branch cancellation.
    pub async fn execute_with(
        &self,
        query: &StructuredQuery,
        cancel: &BranchCancellation,
    ) -> Result<SearchResponse, Error> {
        let cap = query
            .meta
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        let (compiled, type_errors) = compile_all(&query.constraints);
        let mut warnings = Vec::new();
        for err in type_errors {
            warn!("Dropping constraint: {}", err);
            warnings.push(Warning::Type(err));
        }

        if cap == 0 {
            return Ok(SearchResponse {
                hits: Vec::new(),
                warnings,
            });
        }

        let filters: Vec<&CompiledConstraint> = compiled.iter().filter(|c| c.is_filter()).collect();
        let ranker = Ranker::new(query, &compiled, &self.config.text_fields);
        let request = semantic_request(query);
        let fetch = cap.saturating_mul(self.config.overfetch_factor.max(1));

        let semantic_branch = async {
            match &request {
                Some(request) => Some(
                    self.guarded(&cancel.semantic, self.semantic.retrieve(request, fetch))
                        .await,
                ),
                None => None,
            }
        };
        let structured_branch = async {
            if filters.is_empty() {
                None
            } else {
                Some(
                    self.guarded(&cancel.structured, self.push_down(&filters))
                        .await,
                )
            }
        };
        let (semantic, structured) = tokio::join!(semantic_branch, structured_branch);

        let pushed: Vec<Option<HashSet<ArticleId>>> = match structured {
            Some(Ok(outcomes)) => outcomes
                .into_iter()
                .map(|o| match o {
                    FilterOutcome::Matched(ids) => Some(ids),
                    FilterOutcome::Unsupported => None,
                })
                .collect(),
            Some(Err(e)) => {
                if semantic.as_ref().is_some_and(Result::is_ok) {
                    warn!("Structured filtering failed, checking constraints client-side: {}", e);
                    warnings.push(Warning::PartialResult {
                        stage: ExecutionStage::StructuredFilter,
                        message: e.to_string(),
                    });
                    vec![None; filters.len()]
                } else {
                    return Err(branch_failure(ExecutionStage::StructuredFilter, &e, &semantic));
                }
            }
            None => vec![None; filters.len()],
        };

        let candidates: Vec<ScoredId> = match semantic {
            Some(Ok(hits)) => dedup(hits),
            Some(Err(e)) => {
                if filters.is_empty() {
                    return Err(ExecutionError::new(ExecutionStage::SemanticRetrieval, e.to_string()).into());
                }
                warn!("Semantic retrieval failed, using structured candidates: {}", e);
                warnings.push(Warning::PartialResult {
                    stage: ExecutionStage::SemanticRetrieval,
                    message: e.to_string(),
                });
                self.structured_candidates(&filters, &pushed, None).await?
            }
            None => {
                let needs_all = query.meta.sort_field.is_some() || ranker.needs_metadata();
                let scan_limit = (!needs_all).then_some(cap);
                self.structured_candidates(&filters, &pushed, scan_limit).await?
            }
        };
        debug!("Merged {} candidates", candidates.len());

        let client_side = filters.iter().zip(&pushed).any(|(_, p)| p.is_none());
        let needs_metadata =
            client_side || ranker.needs_metadata() || query.meta.sort_field.is_some();
        let metadata = if needs_metadata && !candidates.is_empty() {
            self.fetch_metadata(&candidates).await?
        } else {
            HashMap::new()
        };

        let empty = Metadata::new();
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|c| {
                let meta = metadata.get(&c.id).unwrap_or(&empty);
                if !passes(&filters, &pushed, &c.id, meta) {
                    return None;
                }
                ranker
                    .score(c.score, meta)
                    .map(|score| SearchHit { id: c.id, score })
            })
            .collect();

        sort_hits(&mut hits, &query.meta, &metadata);
        hits.truncate(cap);

        let hits = {
            let mut rng = self.rng.lock().await;
            apply_pipes(hits, &query.pipe_chain, &mut *rng)
        };
        debug!("Returning {} results", hits.len());

        Ok(SearchResponse { hits, warnings })
    }

    /// Run `fut` unless the branch is cancelled or times out first.
    async fn guarded<T>(
        &self,
        token: &CancellationToken,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let timed = async {
            match self.config.branch_timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| timeout_error(timeout))?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            () = token.cancelled() => Err(StoreError::Cancelled),
            result = timed => result,
        }
    }

    async fn push_down(
        &self,
        filters: &[&CompiledConstraint],
    ) -> Result<Vec<FilterOutcome>, StoreError> {
        let outcomes = join_all(
            filters
                .iter()
                .map(|c| self.structured.filter(&c.predicate)),
        )
        .await;
        outcomes.into_iter().collect()
    }

    /// Candidates when there is no semantic result set.
    ///
    /// Uses set algebra over pushed-down results when every filter was
    /// evaluated natively, otherwise a scan that is checked client-side.
    async fn structured_candidates(
        &self,
        filters: &[&CompiledConstraint],
        pushed: &[Option<HashSet<ArticleId>>],
        scan_limit: Option<usize>,
    ) -> Result<Vec<ScoredId>, Error> {
        let all_pushed: Option<Vec<&HashSet<ArticleId>>> = pushed.iter().map(Option::as_ref).collect();

        let ids = match all_pushed {
            Some(sets) if !sets.is_empty() => {
                let mut ids: Vec<ArticleId> = combine_sets(filters, &sets).into_iter().collect();
                ids.sort();
                ids
            }
            _ => {
                let limit = if filters.is_empty() { scan_limit } else { None };
                self.structured.scan(limit).await.map_err(|e| {
                    ExecutionError::new(ExecutionStage::StructuredFilter, e.to_string())
                })?
            }
        };

        Ok(ids
            .into_iter()
            .map(|id| ScoredId::new(id, STRUCTURED_BASE_SCORE))
            .collect())
    }

    async fn fetch_metadata(
        &self,
        candidates: &[ScoredId],
    ) -> Result<HashMap<ArticleId, Metadata>, Error> {
        let ids: Vec<ArticleId> = candidates.iter().map(|c| c.id.clone()).collect();
        self.metadata
            .metadata(&ids)
            .await
            .map_err(|e| ExecutionError::new(ExecutionStage::MetadataLookup, e.to_string()).into())
    }
}

/// `similar:` takes precedence over `cluster=`, and both over free text.
fn semantic_request(query: &StructuredQuery) -> Option<SemanticRequest> {
    if let Some(id) = &query.meta.similar_id {
        return Some(SemanticRequest::SimilarTo(ArticleId::new(id.clone())));
    }
    if let Some(cluster) = query.meta.cluster_id {
        return Some(SemanticRequest::Cluster(cluster));
    }
    query.semantic_text().map(SemanticRequest::Text)
}

fn branch_failure(
    stage: ExecutionStage,
    err: &StoreError,
    other: &Option<Result<Vec<ScoredId>, StoreError>>,
) -> Error {
    match other {
        Some(Err(other)) => ExecutionError::new(
            ExecutionStage::Retrieval,
            format!("all retrieval branches failed: {err}; {other}"),
        )
        .into(),
        _ => ExecutionError::new(stage, err.to_string()).into(),
    }
}

fn timeout_error(timeout: Duration) -> StoreError {
    StoreError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
}

/// Keep the best score per article, preserving first-seen order.
fn dedup(hits: Vec<ScoredId>) -> Vec<ScoredId> {
    let mut index: HashMap<ArticleId, usize> = HashMap::new();
    let mut out: Vec<ScoredId> = Vec::with_capacity(hits.len());
    for hit in hits {
        match index.get(&hit.id) {
            Some(&i) => {
                if hit.score > out[i].score {
                    out[i].score = hit.score;
                }
            }
            None => {
                index.insert(hit.id.clone(), out.len());
                out.push(hit);
            }
        }
    }
    out
}

/// Left-to-right combination of per-filter results.
fn fold_connectives(results: impl Iterator<Item = (Connective, bool)>) -> bool {
    let mut acc: Option<bool> = None;
    for (connective, matched) in results {
        acc = Some(match (acc, connective) {
            (None, _) => matched,
            (Some(prev), Connective::And) => prev && matched,
            (Some(prev), Connective::Or) => prev || matched,
        });
    }
    acc.unwrap_or(true)
}

fn passes(
    filters: &[&CompiledConstraint],
    pushed: &[Option<HashSet<ArticleId>>],
    id: &ArticleId,
    metadata: &Metadata,
) -> bool {
    fold_connectives(filters.iter().zip(pushed).map(|(c, set)| {
        let matched = match set {
            Some(ids) => ids.contains(id),
            None => c.predicate.matches(metadata),
        };
        (c.connective, matched)
    }))
}

fn combine_sets(
    filters: &[&CompiledConstraint],
    sets: &[&HashSet<ArticleId>],
) -> HashSet<ArticleId> {
    let mut acc: Option<HashSet<ArticleId>> = None;
    for (c, set) in filters.iter().zip(sets) {
        acc = Some(match acc {
            None => (*set).clone(),
            Some(prev) => match c.connective {
                Connective::And => prev.intersection(set).cloned().collect(),
                Connective::Or => prev.union(set).cloned().collect(),
            },
        });
    }
    acc.unwrap_or_default()
}
