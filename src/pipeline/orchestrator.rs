//! Reference query pipeline.
//!
//! Threads one query through the joints:
//! extract → search titles → (expand) → score → verify coverage →
//! (search suggestions, score new titles)* → fetch chunks → filter.
//!
//! Joints never fail; corpus failures degrade to empty results. The only
//! error a run can return is cancellation, checked before every joint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::joints::{
    verify_coverage, ArticleScorerJoint, Chunk, ChunkFilterJoint, CoverageResult,
    EntityExtractorJoint, EntityInfo, FactRefinementJoint, FilterOptions, ScoredArticle,
};
use super::retrieval::Corpus;
use crate::config::{HermitConfig, PipelineBudget};
use crate::inference_service::InferenceService;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Query was cancelled")]
    Cancelled,
}

/// Cooperative cancellation signal shared between a caller and a running query.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &str) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            tracing::info!(stage, "Query cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Everything one run produced, handed to answer synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub query: String,
    pub entity_info: EntityInfo,
    /// Best first; exact entity matches lead.
    pub articles: Vec<ScoredArticle>,
    pub coverage: CoverageResult,
    pub chunks: Vec<Chunk>,
    /// Coverage verification rounds performed, including the first.
    pub coverage_attempts: u32,
}

/// Run fact refinement over `chunks` on up to `workers` threads.
///
/// Results are in `chunks` order whatever the worker count.
pub fn refine_facts_parallel(
    joint: &FactRefinementJoint<'_>,
    query: &str,
    chunks: &[Chunk],
    workers: usize,
) -> Vec<Vec<String>> {
    if chunks.is_empty() {
        return Vec::new();
    }
    let per_worker = chunks.len().div_ceil(workers.max(1));

    std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .chunks(per_worker)
            .map(|batch| {
                scope.spawn(move || {
                    batch
                        .iter()
                        .map(|chunk| joint.refine_facts(query, &chunk.text))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(facts) => facts,
                Err(_) => {
                    tracing::error!("Fact refinement worker panicked");
                    Vec::new()
                }
            })
            .collect()
    })
}

// ═══════════════════════════════════════════════════════════
// QueryPipeline
// ═══════════════════════════════════════════════════════════

pub struct QueryPipeline<'a, C: Corpus> {
    corpus: &'a C,
    entity: EntityExtractorJoint<'a>,
    scorer: ArticleScorerJoint<'a>,
    filter: ChunkFilterJoint<'a>,
    refinement: FactRefinementJoint<'a>,
    budget: PipelineBudget,
}

impl<'a, C: Corpus> QueryPipeline<'a, C> {
    pub fn new(service: &'a InferenceService, corpus: &'a C, config: &HermitConfig) -> Self {
        Self {
            corpus,
            entity: EntityExtractorJoint::new(service, config.entity.clone())
                .with_expansion_temperature(config.expansion_temperature),
            scorer: ArticleScorerJoint::new(service, config.scorer.clone()),
            filter: ChunkFilterJoint::new(service, config.filter.clone()),
            refinement: FactRefinementJoint::new(service, config.refinement.clone()),
            budget: config.budget.clone(),
        }
    }

    pub fn budget(&self) -> &PipelineBudget {
        &self.budget
    }

    /// Answer-ready evidence for `query`.
    pub fn run(&self, query: &str, cancel: &CancelFlag) -> Result<PipelineOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%run_id, query_len = query.len(), "Pipeline started");

        cancel.check("entity_extraction")?;
        let entity_info = self.entity.extract(query);

        let terms = entity_info.lookup_names();
        let mut titles = self.search_all(&terms, &[]);
        if titles.is_empty() {
            cancel.check("query_expansion")?;
            let expansions = self.entity.suggest_expansion(query, &terms);
            titles = self.search_all(&expansions, &[]);
        }

        cancel.check("article_scoring")?;
        let mut articles =
            self.scorer
                .score(query, &entity_info, &titles, self.budget.article_top_k);
        let mut coverage = verify_coverage(&entity_info, &articles);
        let mut coverage_attempts = 1;

        while !coverage.complete && coverage_attempts < self.budget.coverage_attempts {
            let fresh = self.search_all(&coverage.suggested_searches, &titles);
            if fresh.is_empty() {
                tracing::debug!(missing = ?coverage.missing, "No new titles for missing entities");
                break;
            }

            cancel.check("coverage_expansion")?;
            let extra = self
                .scorer
                .score(query, &entity_info, &fresh, self.budget.article_top_k);
            titles.extend(fresh);
            merge_articles(&mut articles, extra);

            coverage = verify_coverage(&entity_info, &articles);
            coverage_attempts += 1;
        }

        let selected: Vec<String> = articles.iter().map(|a| a.title.clone()).collect();
        let fetched = if selected.is_empty() {
            Vec::new()
        } else {
            self.corpus.fetch_chunks(&selected).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Chunk fetch failed");
                Vec::new()
            })
        };

        cancel.check("chunk_filtering")?;
        let chunks = self.filter.filter(
            query,
            &fetched,
            self.budget.chunk_top_k,
            &FilterOptions::for_entities(&entity_info),
        );

        tracing::info!(
            %run_id,
            articles = articles.len(),
            complete = coverage.complete,
            coverage_attempts,
            chunks = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(PipelineOutcome {
            run_id,
            query: query.to_string(),
            entity_info,
            articles,
            coverage,
            chunks,
            coverage_attempts,
        })
    }

    /// Fact refinement over the outcome's chunks, in chunk order.
    pub fn refine_facts(
        &self,
        outcome: &PipelineOutcome,
        cancel: &CancelFlag,
    ) -> Result<Vec<Vec<String>>, PipelineError> {
        cancel.check("fact_refinement")?;
        Ok(refine_facts_parallel(
            &self.refinement,
            &outcome.query,
            &outcome.chunks,
            self.budget.workers,
        ))
    }

    /// Titles for every term, deduplicated, skipping any in `known`.
    fn search_all(&self, terms: &[String], known: &[String]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for term in terms {
            match self.corpus.search_titles(term) {
                Ok(titles) => {
                    for title in titles {
                        if !known.contains(&title) && !found.contains(&title) {
                            found.push(title);
                        }
                    }
                }
                Err(e) => tracing::warn!(term = %term, error = %e, "Title search failed"),
            }
        }
        found
    }
}

/// Merge newly scored articles, keeping the first occurrence of each title,
/// then order by score (stable, so earlier rounds win ties).
fn merge_articles(articles: &mut Vec<ScoredArticle>, extra: Vec<ScoredArticle>) {
    for article in extra {
        if !articles.iter().any(|a| a.title == article.title) {
            articles.push(article);
        }
    }
    articles.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
