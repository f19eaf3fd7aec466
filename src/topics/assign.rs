// Topic assignment by semantic similarity.
//
// Comments and topics are embedded, L2-normalized, and compared with one
// matrix product (comments × topics). Each comment takes the topic with the
// highest cosine similarity; ties go to the topic listed first.

use std::sync::Arc;

use ndarray::{Array2, ArrayView1, Axis};
use tracing::{debug, info};

use super::traits::Embedder;
use crate::error::StageError;
use crate::resources::ResourceScope;

/// Assigns each comment to its most similar topic.
pub struct TopicAssigner {
    embedder: Arc<dyn Embedder>,
    scope: ResourceScope,
}

impl TopicAssigner {
    pub fn new(embedder: Arc<dyn Embedder>, scope: ResourceScope) -> Self {
        Self { embedder, scope }
    }

    /// Return one topic (by text) per comment, in comment order.
    ///
    /// `topics` must be non-empty; the orchestrator rejects an empty topic set
    /// before any batch runs. Device memory is released on every exit path.
    pub async fn assign_topics(
        &self,
        comments: &[String],
        topics: &[String],
    ) -> Result<Vec<String>, StageError> {
        let _lease = self.scope.acquire("topic-assignment");

        if topics.is_empty() {
            return Err(StageError::InvalidInput(
                "topic assignment needs at least one topic".to_string(),
            ));
        }
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            comments = comments.len(),
            topics = topics.len(),
            "Calculating topic similarity"
        );

        let comment_vectors = self
            .embedder
            .embed_batch(comments)
            .await
            .map_err(StageError::Embedding)?;
        let topic_vectors = self
            .embedder
            .embed_batch(topics)
            .await
            .map_err(StageError::Embedding)?;

        check_aligned(comments.len(), comment_vectors.len())?;
        check_aligned(topics.len(), topic_vectors.len())?;

        let dim = self.embedder.dimension();
        let comment_matrix = normalized_matrix(&comment_vectors, dim)?;
        let topic_matrix = normalized_matrix(&topic_vectors, dim)?;

        let similarities = similarity_matrix(&comment_matrix, &topic_matrix);
        let assigned: Vec<String> = similarities
            .axis_iter(Axis(0))
            .map(|row| topics[argmax_first(row)].clone())
            .collect();

        debug!(assigned = assigned.len(), "Topic similarity calculation completed");
        Ok(assigned)
    }
}

fn check_aligned(expected: usize, got: usize) -> Result<(), StageError> {
    if expected != got {
        return Err(StageError::MisalignedBatch { expected, got });
    }
    Ok(())
}

/// Stack vectors into a row matrix and L2-normalize every row. Zero vectors
/// stay zero so they score 0.0 against everything.
pub fn normalized_matrix(vectors: &[Vec<f32>], dim: usize) -> Result<Array2<f32>, StageError> {
    let mut matrix = Array2::<f32>::zeros((vectors.len(), dim));

    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dim {
            return Err(StageError::Embedding(anyhow::anyhow!(
                "embedding {i} has dimension {}, expected {dim}",
                v.len()
            )));
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mut row = matrix.row_mut(i);
        if norm > f32::EPSILON {
            for (dst, src) in row.iter_mut().zip(v) {
                *dst = src / norm;
            }
        }
    }

    Ok(matrix)
}

/// Cosine similarity of every comment row against every topic row.
pub fn similarity_matrix(comments: &Array2<f32>, topics: &Array2<f32>) -> Array2<f32> {
    comments.dot(&topics.t())
}

/// Index of the maximum value; the lowest index wins a tie.
fn argmax_first(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &val) in row.iter().enumerate() {
        if val > best_val {
            best = i;
            best_val = val;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use ndarray::array;

    /// Embeds by keyword: axis 0 = weather words, axis 1 = money words.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let weather = ["climate", "temperature", "rain"]
                        .iter()
                        .filter(|w| t.contains(*w))
                        .count() as f32;
                    let money = ["tax", "budget", "price"]
                        .iter()
                        .filter(|w| t.contains(*w))
                        .count() as f32;
                    vec![weather, money]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("CUDA out of memory")
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_assigns_most_similar_topic() {
        let scope = ResourceScope::default();
        let assigner = TopicAssigner::new(Arc::new(KeywordEmbedder), scope.clone());
        let topics = strings(&["climate change", "tax budget"]);
        let comments = strings(&["rising temperature", "price of budget", "rain rain"]);

        let assigned = assigner.assign_topics(&comments, &topics).await.unwrap();
        assert_eq!(assigned, strings(&["climate change", "tax budget", "climate change"]));
        assert_eq!(scope.stats().flushes, 1);
    }

    #[tokio::test]
    async fn test_tie_goes_to_first_topic() {
        let assigner = TopicAssigner::new(Arc::new(KeywordEmbedder), ResourceScope::default());
        let topics = strings(&["climate one", "climate two"]);
        let comments = strings(&["temperature"]);
        let assigned = assigner.assign_topics(&comments, &topics).await.unwrap();
        assert_eq!(assigned, strings(&["climate one"]));
    }

    #[tokio::test]
    async fn test_unrelated_comment_still_gets_a_listed_topic() {
        let assigner = TopicAssigner::new(Arc::new(KeywordEmbedder), ResourceScope::default());
        let topics = strings(&["climate change", "tax budget"]);
        let comments = strings(&["completely unrelated words"]);
        let assigned = assigner.assign_topics(&comments, &topics).await.unwrap();
        assert!(topics.contains(&assigned[0]));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates_and_releases() {
        let scope = ResourceScope::default();
        let assigner = TopicAssigner::new(Arc::new(FailingEmbedder), scope.clone());
        let result = assigner
            .assign_topics(&strings(&["anything"]), &strings(&["topic"]))
            .await;
        assert!(matches!(result, Err(StageError::Embedding(_))));
        assert_eq!(scope.stats().flushes, 1);
        assert_eq!(scope.stats().active_leases, 0);
    }

    #[tokio::test]
    async fn test_empty_topics_rejected() {
        let assigner = TopicAssigner::new(Arc::new(KeywordEmbedder), ResourceScope::default());
        let result = assigner.assign_topics(&strings(&["text"]), &[]).await;
        assert!(matches!(result, Err(StageError::InvalidInput(_))));
    }

    #[test]
    fn test_normalized_rows_have_unit_length() {
        let m = normalized_matrix(&[vec![3.0, 4.0], vec![0.0, 0.0]], 2).unwrap();
        assert!((m[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((m[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(m[[1, 0]], 0.0);
    }

    #[test]
    fn test_normalized_matrix_rejects_wrong_dimension() {
        assert!(normalized_matrix(&[vec![1.0, 2.0, 3.0]], 2).is_err());
    }

    #[test]
    fn test_similarity_matrix_shape_and_values() {
        let comments = array![[1.0_f32, 0.0], [0.0, 1.0], [0.6, 0.8]];
        let topics = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let sim = similarity_matrix(&comments, &topics);
        assert_eq!(sim.dim(), (3, 2));
        assert!((sim[[2, 1]] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_first_prefers_lowest_index() {
        let row = array![0.5_f32, 0.9, 0.9];
        assert_eq!(argmax_first(row.view()), 1);
    }
}
