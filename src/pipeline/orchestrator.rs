// End-to-end analysis: normalize -> classify in batches -> summarize.
//
//   Load -> Normalize -> ClassifyLoop(batch 1..N) -> Summarize -> Done
//
// Loading and an empty topic set are fatal. Inside the loop a failed batch
// (topic assignment or classification) is logged and contributes nothing;
// the remaining batches still run. Batches run one at a time so only one
// batch's working set is ever resident. Nothing is retried.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::traits::ZeroShotClassifier;
use crate::classify::RoleClassifier;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{PipelineError, StageError};
use crate::models::{AnalysisReport, ClassifiedComment};
use crate::output::{csv, progress_bar};
use crate::resources::ResourceScope;
use crate::summarize::{ConclusionGenerator, Summarizer};
use crate::text::TextNormalizer;
use crate::topics::traits::Embedder;
use crate::topics::TopicAssigner;

/// Pipeline states, for logging. `Fatal` is reached only through an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Normalize,
    ClassifyLoop,
    Summarize,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::ClassifyLoop => "classify",
            Stage::Summarize => "summarize",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Number of batches `total` items split into.
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// Owns every stage of one analysis and runs them in order. Holds no
/// per-invocation state, so one orchestrator can serve concurrent runs.
pub struct PipelineOrchestrator {
    normalizer: TextNormalizer,
    assigner: TopicAssigner,
    classifier: RoleClassifier,
    conclusions: ConclusionGenerator,
    scope: ResourceScope,
    batch_size: usize,
    show_progress: bool,
}

impl PipelineOrchestrator {
    /// Wire the stages around shared collaborators. All stages report to the
    /// same resource scope.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        classifier: Arc<dyn ZeroShotClassifier>,
        summarizer: Arc<dyn Summarizer>,
        scope: ResourceScope,
    ) -> Self {
        Self {
            normalizer: TextNormalizer::default(),
            assigner: TopicAssigner::new(embedder, scope.clone()),
            classifier: RoleClassifier::new(classifier, scope.clone()),
            conclusions: ConclusionGenerator::new(summarizer, scope.clone()),
            scope,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_summary_batch_size(mut self, batch_size: usize) -> Self {
        self.conclusions = self.conclusions.with_batch_size(batch_size);
        self
    }

    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Draw progress bars for the batch loops (CLI only).
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self.conclusions = self.conclusions.with_progress(show);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    /// File mode: read the `text` column of both CSVs, then run.
    pub async fn run_files(
        &self,
        topics_path: &Path,
        opinions_path: &Path,
    ) -> Result<AnalysisReport, PipelineError> {
        debug!(stage = %Stage::Load, "Entering stage");
        let topics = csv::read_text_column(topics_path)?;
        let opinions = csv::read_text_column(opinions_path)?;
        self.run(&topics, &opinions).await
    }

    /// Run the whole pipeline over raw topic and opinion texts.
    pub async fn run<S: AsRef<str>>(
        &self,
        topics_raw: &[S],
        opinions_raw: &[S],
    ) -> Result<AnalysisReport, PipelineError> {
        debug!(stage = %Stage::Normalize, "Entering stage");
        let topics = self.normalizer.normalize_all(topics_raw);
        let opinions = self.normalizer.normalize_all(opinions_raw);
        info!(
            topics = topics.len(),
            topics_dropped = topics_raw.len() - topics.len(),
            opinions = opinions.len(),
            opinions_dropped = opinions_raw.len() - opinions.len(),
            "Normalized input"
        );

        if topics.is_empty() {
            return Err(PipelineError::NoTopics);
        }

        debug!(stage = %Stage::ClassifyLoop, "Entering stage");
        let total_batches = batch_count(opinions.len(), self.batch_size);
        let mut comments: Vec<ClassifiedComment> = Vec::with_capacity(opinions.len());
        let mut failed_batches = 0;

        let pb = progress_bar(total_batches as u64, "Classifying", self.show_progress);
        for (i, batch) in opinions.chunks(self.batch_size).enumerate() {
            let batch_number = i + 1;
            info!(batch = batch_number, total_batches, size = batch.len(), "Processing batch");

            match self.classify_batch(batch, &topics).await {
                Ok(records) => comments.extend(records),
                Err(e) => {
                    failed_batches += 1;
                    warn!(
                        batch = batch_number,
                        total_batches,
                        error = %e,
                        "Batch failed, continuing with the next one"
                    );
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        debug!(stage = %Stage::Summarize, "Entering stage");
        let summary = self.conclusions.generate(&comments).await?;

        debug!(stage = %Stage::Done, "Entering stage");
        info!(
            comments = comments.len(),
            conclusions = summary.conclusions.len(),
            failed_batches,
            failed_summary_batches = summary.failed_batches,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            comments,
            conclusions: summary.conclusions,
            failed_batches,
            failed_summary_batches: summary.failed_batches,
        })
    }

    /// Assign topics, then roles, and zip them by position.
    async fn classify_batch(
        &self,
        batch: &[String],
        topics: &[String],
    ) -> Result<Vec<ClassifiedComment>, StageError> {
        let assigned = self.assigner.assign_topics(batch, topics).await?;
        let roles = self.classifier.try_classify(batch).await?;

        if assigned.len() != batch.len() || roles.len() != batch.len() {
            return Err(StageError::MisalignedBatch {
                expected: batch.len(),
                got: assigned.len().min(roles.len()),
            });
        }

        Ok(batch
            .iter()
            .zip(assigned)
            .zip(roles)
            .map(|((text, topic), role)| ClassifiedComment {
                text: text.clone(),
                topic,
                role,
            })
            .collect())
    }
}
