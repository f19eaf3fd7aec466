// Topic conclusions: group, summarize, score.
//
// Comments are grouped by topic in first-appearance order, then every
// (topic, comment) pair is flattened into one sequence and summarized in
// fixed-size batches. Each summary is routed back to its topic by pair
// position, never by matching text, so duplicate comments under different
// topics can't collide. A topic's summaries are space-joined.
//
// A failed summarization batch is logged and dropped; the topics it touched
// still get a Conclusion from whatever the other batches produced.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::traits::{GenerationConfig, Summarizer};
use crate::error::{PipelineError, StageError};
use crate::models::{ClassifiedComment, Conclusion};
use crate::output::progress_bar;
use crate::resources::ResourceScope;
use crate::scoring;

/// Default number of comments per summarization call.
pub const DEFAULT_SUMMARY_BATCH_SIZE: usize = 64;

/// Conclusions plus how many summarization batches were lost.
#[derive(Debug, Default)]
pub struct ConclusionSet {
    pub conclusions: Vec<Conclusion>,
    pub failed_batches: usize,
}

pub struct ConclusionGenerator {
    summarizer: Arc<dyn Summarizer>,
    scope: ResourceScope,
    batch_size: usize,
    config: GenerationConfig,
    show_progress: bool,
}

/// Comments sharing one topic, in the order they were classified.
struct TopicGroup<'a> {
    topic: &'a str,
    members: Vec<&'a ClassifiedComment>,
}

impl ConclusionGenerator {
    pub fn new(summarizer: Arc<dyn Summarizer>, scope: ResourceScope) -> Self {
        Self {
            summarizer,
            scope,
            batch_size: DEFAULT_SUMMARY_BATCH_SIZE,
            config: GenerationConfig::default(),
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One Conclusion per topic that has at least one comment, in
    /// first-appearance order. Errors only when effectiveness scoring rejects
    /// a group.
    pub async fn generate(
        &self,
        classified: &[ClassifiedComment],
    ) -> Result<ConclusionSet, PipelineError> {
        // Held across every batch; memory is released once at the end.
        let _lease = self.scope.acquire("summarization");

        let groups = group_by_topic(classified);
        if groups.is_empty() {
            info!("No classified comments, no conclusions to generate");
            return Ok(ConclusionSet::default());
        }

        // (group index, text) in group order.
        let pairs: Vec<(usize, &str)> = groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| group.members.iter().map(move |c| (g, c.text.as_str())))
            .collect();

        let total_batches = pairs.len().div_ceil(self.batch_size);
        info!(
            topics = groups.len(),
            comments = pairs.len(),
            total_batches,
            "Generating topic summaries"
        );

        let mut summaries: Vec<Vec<String>> = vec![Vec::new(); groups.len()];
        let mut failed_batches = 0;

        let pb = progress_bar(total_batches as u64, "Summarizing", self.show_progress);
        for (batch, chunk) in pairs.chunks(self.batch_size).enumerate() {
            match self.summarize_chunk(chunk).await {
                Ok(texts) => {
                    for ((group, _), summary) in chunk.iter().zip(texts) {
                        summaries[*group].push(summary);
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!(
                        batch = batch + 1,
                        total_batches,
                        error = %e,
                        "Summarization batch failed, skipping"
                    );
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let mut conclusions = Vec::with_capacity(groups.len());
        for (group, parts) in groups.iter().zip(summaries) {
            let effectiveness = scoring::score(&group.members)?;
            conclusions.push(Conclusion {
                topic: group.topic.to_string(),
                effectiveness,
                summary: join_summaries(&parts),
            });
        }

        info!(
            conclusions = conclusions.len(),
            failed_batches,
            "Topic summaries completed"
        );
        Ok(ConclusionSet {
            conclusions,
            failed_batches,
        })
    }

    async fn summarize_chunk(&self, chunk: &[(usize, &str)]) -> Result<Vec<String>, StageError> {
        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.to_string()).collect();
        let summaries = self
            .summarizer
            .summarize(&texts, &self.config)
            .await
            .map_err(StageError::Summarization)?;

        if summaries.len() != texts.len() {
            return Err(StageError::MisalignedBatch {
                expected: texts.len(),
                got: summaries.len(),
            });
        }
        Ok(summaries)
    }
}

/// Partition comments by topic. Groups keep first-appearance order and
/// members keep input order.
fn group_by_topic(classified: &[ClassifiedComment]) -> Vec<TopicGroup<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<TopicGroup<'_>> = Vec::new();

    for comment in classified {
        let slot = *index.entry(comment.topic.as_str()).or_insert_with(|| {
            groups.push(TopicGroup {
                topic: comment.topic.as_str(),
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(comment);
    }

    groups
}

fn join_summaries(parts: &[String]) -> String {
    parts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
